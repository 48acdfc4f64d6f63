//! Vendor pass-through adapter family.
//!
//! These interfaces are driven through a structured call surface instead of
//! text commands: a channel is opened for a protocol and speed, filters and
//! timeouts are configured through parameter calls, and frames move as raw
//! bytes with no ASCII framing. The concrete vendor driver (FFI into a
//! manufacturer library) lives outside this crate; [`PassThruInterface`] is
//! the boundary it must satisfy.

use std::time::Duration;

use log::debug;

use crate::adapter::{Adapter, DeviceCapabilities, SessionState, TimeoutScenario, VpwSpeed};
use crate::error::{Error, Result};
use crate::message::VpwMessage;
use crate::protocol::NODE_TOOL;

/// Configuration parameters applied through the structured interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParam {
    /// Receive timeout in milliseconds.
    ReadTimeout,
    /// Transmit timeout in milliseconds.
    WriteTimeout,
}

/// Structured call surface a vendor driver must provide.
///
/// Frames cross this boundary without the trailing bus checksum; the
/// device computes and validates it in hardware.
pub trait PassThruInterface: Send {
    /// Open a VPW channel at the given speed.
    fn connect(&mut self, speed: VpwSpeed) -> Result<()>;

    /// Close the channel.
    fn disconnect(&mut self) -> Result<()>;

    /// Apply one configuration parameter.
    fn apply_config(&mut self, param: ConfigParam, value: u32) -> Result<()>;

    /// Pass frames addressed to `destination`, discard the rest.
    fn start_message_filter(&mut self, destination: u8) -> Result<()>;

    /// Transmit one frame (header + payload, no checksum).
    fn write(&mut self, frame: &[u8]) -> Result<()>;

    /// Receive one frame, waiting up to `timeout`.
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Drop any buffered frames.
    fn clear_buffers(&mut self) -> Result<()>;
}

/// Timeout margin over the device-reported budget, matching the text
/// family's contract.
const TIMEOUT_MARGIN: Duration = Duration::from_millis(500);

/// Adapter driver over a vendor pass-through interface.
pub struct PassThruAdapter<I: PassThruInterface> {
    interface: I,
    session: SessionState,
    capabilities: DeviceCapabilities,
    read_timeout: Duration,
}

impl<I: PassThruInterface> PassThruAdapter<I> {
    /// Wrap a vendor interface. The adapter is unusable until `initialize`.
    pub fn new(interface: I) -> Self {
        Self {
            interface,
            session: SessionState::default(),
            capabilities: DeviceCapabilities {
                max_send_size: 4096,
                max_receive_size: 4096,
                supports_4x: true,
            },
            read_timeout: Duration::from_millis(1000),
        }
    }

    fn try_initialize(&mut self) -> Result<()> {
        self.session = SessionState::default();
        self.interface.connect(VpwSpeed::Standard)?;
        self.interface.start_message_filter(NODE_TOOL)?;
        self.interface.clear_buffers()?;
        self.set_timeout(TimeoutScenario::Initialization)?;
        debug!("pass-through channel configured");
        Ok(())
    }
}

impl<I: PassThruInterface> Adapter for PassThruAdapter<I> {
    fn initialize(&mut self) -> Result<()> {
        self.try_initialize().map_err(|e| match e {
            Error::DeviceFailure(_) => e,
            other => Error::DeviceFailure(format!("pass-through initialization failed: {other}")),
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn set_timeout(&mut self, scenario: TimeoutScenario) -> Result<()> {
        if self.session.scenario == scenario {
            return Ok(());
        }
        let ms = scenario.milliseconds();
        let register = u32::try_from(ms).unwrap_or(u32::MAX);
        self.interface
            .apply_config(ConfigParam::ReadTimeout, register)?;
        self.interface
            .apply_config(ConfigParam::WriteTimeout, register)?;
        self.read_timeout = Duration::from_millis(ms) + TIMEOUT_MARGIN;
        self.session.scenario = scenario;
        Ok(())
    }

    fn send_message(&mut self, msg: &VpwMessage) -> Result<()> {
        // No set-header dialogue here, but the cache keeps the session
        // shape identical across both families.
        self.session.header = Some(msg.header());
        self.interface.write(msg.as_bytes())
    }

    fn receive_message(&mut self) -> Result<VpwMessage> {
        let frame = self.interface.read(self.read_timeout)?;
        VpwMessage::from_bytes(frame)
    }

    fn clear_message_buffer(&mut self) -> Result<()> {
        self.interface.clear_buffers()
    }

    fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<()> {
        if self.session.speed == speed {
            return Ok(());
        }
        // Speed is a channel property: reconnect at the new rate.
        self.interface.disconnect()?;
        self.interface.connect(speed)?;
        self.interface.start_message_filter(NODE_TOOL)?;
        self.session.speed = speed;
        self.session.header = None;
        Ok(())
    }
}
