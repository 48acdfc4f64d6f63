//! Session orchestrator.
//!
//! A [`Vehicle`] composes one adapter with the message factory and parser
//! to run the actual protocol: identification queries, the seed/key unlock
//! handshake, kernel upload, and the block-transfer state machines. It is
//! strictly single-flight; a second top-level operation started while one
//! is in progress is refused with [`Error::Busy`].

pub mod kernel;
pub mod transfer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::adapter::{Adapter, TimeoutScenario, VpwSpeed};
use crate::error::{Error, Result};
use crate::message::VpwMessage;
use crate::pcm::PcmInfo;
use crate::protocol::{BlockId, factory, mode, parser};
use crate::report::Reporter;

/// Frames to inspect for a matching reply before giving up; unrelated bus
/// chatter in between is skipped.
const RESPONSE_ATTEMPTS: usize = 5;

/// Unlock handshake state. Failure paths always land back on `Locked`,
/// never in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Locked,
    Unlocked,
}

/// Clears the single-flight flag when the operation ends.
struct OperationGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Protocol session over one interface adapter.
pub struct Vehicle<A: Adapter> {
    adapter: A,
    reporter: Reporter,
    in_flight: Arc<AtomicBool>,
    lock_state: LockState,
}

impl<A: Adapter> Vehicle<A> {
    /// Compose a session over an adapter.
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            reporter: Reporter::sink(),
            in_flight: Arc::new(AtomicBool::new(false)),
            lock_state: LockState::Locked,
        }
    }

    /// Attach a reporter for status and progress events.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Whether the last unlock handshake ended in `Unlocked`.
    pub fn is_unlocked(&self) -> bool {
        self.lock_state == LockState::Unlocked
    }

    /// Privileges do not survive leaving kernel mode.
    pub(crate) fn relock(&mut self) {
        self.lock_state = LockState::Locked;
    }

    /// Bring the adapter to a configured VPW session.
    pub fn initialize(&mut self) -> Result<()> {
        self.reporter.status("Initializing interface adapter");
        self.adapter.initialize()
    }

    /// Drop stale frames and bytes between protocol phases.
    pub fn clear_receive_buffer(&mut self) -> Result<()> {
        self.adapter.clear_message_buffer()
    }

    /// Acquire the single-flight guard for a top-level operation.
    fn begin_operation(&self) -> Result<OperationGuard> {
        if self.in_flight.swap(true, Ordering::Acquire) {
            return Err(Error::Busy("another operation is in progress"));
        }
        Ok(OperationGuard {
            flag: Arc::clone(&self.in_flight),
        })
    }

    /// Send a request and take the matching reply, skipping unrelated
    /// frames.
    pub(crate) fn request(&mut self, msg: &VpwMessage, request_mode: u8) -> Result<VpwMessage> {
        self.adapter.send_message(msg)?;
        for _ in 0..RESPONSE_ATTEMPTS {
            let reply = self.adapter.receive_message()?;
            if parser::is_reply_to(&reply, request_mode) {
                return Ok(reply);
            }
            debug!("skipping unrelated frame: {reply}");
        }
        Err(Error::UnexpectedResponse(format!(
            "no reply to mode {request_mode:02X} within {RESPONSE_ATTEMPTS} frames"
        )))
    }

    fn query_property(&mut self, block: BlockId) -> Result<Vec<u8>> {
        self.adapter.set_timeout(TimeoutScenario::DataProperty)?;
        let reply = self.request(&factory::read_property(block), mode::READ_PROPERTY)?;
        parser::parse_property(&reply, block)
    }

    fn query_property_u32(&mut self, block: BlockId) -> Result<u32> {
        let data = self.query_property(block)?;
        if data.len() < 4 {
            return Err(Error::UnexpectedResponse(format!(
                "property {block:?} reply only {} bytes long",
                data.len()
            )));
        }
        Ok(BigEndian::read_u32(&data))
    }

    fn ascii(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes)
            .trim_matches(['\0', ' '])
            .to_string()
    }

    /// Read the 17-character vehicle identification number.
    pub fn query_vin(&mut self) -> Result<String> {
        let first = self.query_property(BlockId::Vin1)?;
        let mut vin = Vec::new();
        // The first block carries a pad byte ahead of the characters.
        vin.extend(first.iter().skip(1));
        vin.extend(self.query_property(BlockId::Vin2)?);
        vin.extend(self.query_property(BlockId::Vin3)?);
        Ok(Self::ascii(&vin))
    }

    /// Read the 12-character serial number.
    pub fn query_serial_number(&mut self) -> Result<String> {
        let mut serial = self.query_property(BlockId::Serial1)?;
        serial.extend(self.query_property(BlockId::Serial2)?);
        serial.extend(self.query_property(BlockId::Serial3)?);
        Ok(Self::ascii(&serial))
    }

    /// Read the operating system id.
    pub fn query_os_id(&mut self) -> Result<u32> {
        self.query_property_u32(BlockId::OperatingSystemId)
    }

    /// Read the calibration id.
    pub fn query_calibration_id(&mut self) -> Result<u32> {
        self.query_property_u32(BlockId::CalibrationId)
    }

    /// Read the hardware id.
    pub fn query_hardware_id(&mut self) -> Result<u32> {
        self.query_property_u32(BlockId::HardwareId)
    }

    /// Read the 4-character broadcast code.
    pub fn query_broadcast_code(&mut self) -> Result<String> {
        let data = self.query_property(BlockId::BroadcastCode)?;
        Ok(Self::ascii(&data))
    }

    /// Read the manufacturer's enablement counter.
    pub fn query_mec_id(&mut self) -> Result<u8> {
        let data = self.query_property(BlockId::MecId)?;
        data.first().copied().ok_or_else(|| {
            Error::UnexpectedResponse("empty MEC reply".into())
        })
    }

    /// Query the operating system id and derive the session parameters.
    pub fn query_pcm_info(&mut self) -> Result<PcmInfo> {
        let os_id = self.query_os_id()?;
        let info = PcmInfo::from_os_id(os_id)?;
        self.reporter.status(format!(
            "Operating system {os_id}, hardware {}",
            info.hardware
        ));
        Ok(info)
    }

    /// Run the seed/key unlock handshake.
    ///
    /// Exactly one seed/key round trip; a rejected key surfaces as
    /// [`Error::DeviceFailure`] and the session stays locked. Re-attempting
    /// is the caller's decision.
    pub fn unlock(&mut self, info: &PcmInfo) -> Result<()> {
        let _guard = self.begin_operation()?;
        self.unlock_inner(info)
    }

    pub(crate) fn unlock_inner(&mut self, info: &PcmInfo) -> Result<()> {
        self.lock_state = LockState::Locked;
        self.adapter.set_timeout(TimeoutScenario::DataProperty)?;

        self.reporter.status("Requesting seed");
        let reply = self.request(&factory::seed_request(), mode::SECURITY_ACCESS)?;
        let seed = parser::parse_seed(&reply)?;
        if seed == 0 {
            self.reporter.status("PCM is already unlocked");
            self.lock_state = LockState::Unlocked;
            return Ok(());
        }

        let key = info.key_algorithm.compute_key(seed);
        debug!("seed {seed:04X} -> key {key:04X}");
        let reply = self.request(&factory::unlock_key(key), mode::SECURITY_ACCESS)?;
        match parser::parse_unlock(&reply)? {
            parser::UnlockResponse::Accepted => {
                self.reporter.status("PCM unlocked");
                self.lock_state = LockState::Unlocked;
                Ok(())
            },
            parser::UnlockResponse::Rejected(code) => {
                self.reporter.status("PCM rejected the key");
                Err(Error::DeviceFailure(format!(
                    "key rejected, code {code:02X}"
                )))
            },
        }
    }

    /// Whether the target is in recovery mode (no valid resident program).
    ///
    /// A target with normal firmware ignores the probe, so a timeout means
    /// "not in recovery". In recovery mode the unlock handshake must be
    /// skipped; the restricted command set does not include it.
    pub fn check_recovery_mode(&mut self) -> Result<bool> {
        self.adapter.set_timeout(TimeoutScenario::DataProperty)?;
        self.adapter.clear_message_buffer()?;
        self.adapter.send_message(&factory::recovery_probe())?;

        for _ in 0..RESPONSE_ATTEMPTS {
            match self.adapter.receive_message() {
                Ok(reply) if parser::is_recovery_reply(&reply) => {
                    self.reporter.status("PCM is in recovery mode");
                    return Ok(true);
                },
                Ok(other) => debug!("skipping unrelated frame: {other}"),
                Err(Error::Timeout(_)) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Switch the bus speed, keeping the adapter and the target in
    /// lockstep.
    ///
    /// Entering 4x asks the target for permission first; the commit frame
    /// is the last thing sent at standard speed. Returning to standard only
    /// switches the adapter, since the target drops back on its own when it
    /// leaves kernel mode.
    pub fn set_vpw_speed(&mut self, speed: VpwSpeed) -> Result<()> {
        match speed {
            VpwSpeed::FourX => {
                self.reporter.status("Switching bus to 4x speed");
                let reply =
                    self.request(&factory::high_speed_request(), mode::HIGH_SPEED_REQUEST)?;
                parser::parse_high_speed_grant(&reply)?;
                self.adapter.send_message(&factory::high_speed_begin())?;
                self.adapter.set_vpw_speed(VpwSpeed::FourX)?;
                self.adapter.clear_message_buffer()
            },
            VpwSpeed::Standard => {
                self.reporter.status("Returning bus to standard speed");
                self.adapter.set_vpw_speed(VpwSpeed::Standard)
            },
        }
    }
}
