//! Interface-adapter abstraction.
//!
//! Two structurally different adapter families sit between the engine and
//! the bus: text-command chips driven by AT-style lines ([`elm`]) and
//! vendor pass-through drivers spoken to through structured calls
//! ([`passthru`]). Both present the same message-channel contract
//! ([`Adapter`]) to the orchestrator, selected once at session start.

pub mod elm;
pub mod passthru;

use crate::error::Result;
use crate::message::VpwMessage;

/// Payload limits and speed support probed during initialization.
///
/// Read-only after `initialize`; the orchestrator sizes block-transfer
/// chunks from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceCapabilities {
    /// Largest payload the adapter can transmit in one message.
    pub max_send_size: usize,
    /// Largest payload the adapter can receive in one message.
    pub max_receive_size: usize,
    /// Whether the adapter can follow the bus into 4x speed.
    pub supports_4x: bool,
}

/// Bus speed modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VpwSpeed {
    /// 10.4 kbit/s, the mode every node powers up in.
    #[default]
    Standard,
    /// 41.6 kbit/s burst mode used during block transfer.
    FourX,
}

/// Usage contexts mapped to concrete response-timeout budgets.
///
/// Reprogramming the adapter's timeout register costs a round trip, so the
/// adapter skips it when the scenario has not changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutScenario {
    /// Sentinel before the first negotiation; forces the first reprogram.
    #[default]
    Undefined,
    /// Adapter configuration dialogue.
    Initialization,
    /// Ordinary property reads and short requests.
    DataProperty,
    /// Kernel fragment writes, which the target must flash-buffer.
    KernelUpload,
    /// Checksummed block transfer.
    BlockTransfer,
    /// The largest budget the adapter register can express.
    Maximum,
}

impl TimeoutScenario {
    /// Response budget for this scenario in milliseconds.
    pub fn milliseconds(self) -> u64 {
        match self {
            // Sentinel; never negotiated, but keep a sane value.
            Self::Undefined | Self::DataProperty => 250,
            Self::Initialization => 500,
            Self::KernelUpload => 2000,
            Self::BlockTransfer => 2500,
            Self::Maximum => 1020,
        }
    }
}

/// Negotiated per-session state owned by the adapter.
///
/// Mutated only by the adapter on successful negotiation; the orchestrator
/// never touches it directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    /// Last header sent to the bus; `None` forces a set-header command
    /// before the next payload.
    pub header: Option<[u8; 3]>,
    /// Currently programmed timeout scenario.
    pub scenario: TimeoutScenario,
    /// Current bus speed mode.
    pub speed: VpwSpeed,
}

/// Generic message channel over one interface adapter.
///
/// Single-flight: one request may be outstanding at a time; the bus is
/// half-duplex and the session has exactly one cached header and timeout.
pub trait Adapter: Send {
    /// Bring the adapter from power-on to a configured VPW session.
    ///
    /// Failures surface as [`crate::Error::DeviceFailure`]; nothing
    /// panics or escapes past this boundary.
    fn initialize(&mut self) -> Result<()>;

    /// Negotiated capability limits. Valid after `initialize`.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Program the response timeout for a usage scenario.
    ///
    /// A repeated call with the unchanged scenario issues no commands.
    fn set_timeout(&mut self, scenario: TimeoutScenario) -> Result<()>;

    /// Put one message on the bus.
    fn send_message(&mut self, msg: &VpwMessage) -> Result<()>;

    /// Take the next received message, waiting up to the negotiated
    /// timeout.
    fn receive_message(&mut self) -> Result<VpwMessage>;

    /// Drop buffered frames and bytes between protocol phases.
    fn clear_message_buffer(&mut self) -> Result<()>;

    /// Switch the adapter's own bus speed. The caller is responsible for
    /// commanding the target to change speed in lockstep.
    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<()>;
}
