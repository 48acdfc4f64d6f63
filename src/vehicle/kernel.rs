//! Kernel upload, readiness polling, and exit.
//!
//! In its normal operating mode the target cannot do checksummed
//! high-speed block transfer; a small resident program is written into its
//! working RAM and started first. The upload is strictly sequential: the
//! bus is half-duplex and the session can have only one request in flight,
//! so every fragment's acknowledgment is verified before the next goes
//! out. A botched partial upload can leave the target unrecoverable, which
//! is why fragments get a small fixed retry ceiling instead of an
//! optimistic unbounded one.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::adapter::{Adapter, TimeoutScenario};
use crate::error::{Error, Result};
use crate::pcm::PcmInfo;
use crate::protocol::{factory, mode, parser, transfer};
use crate::vehicle::Vehicle;

/// Retry ceiling per kernel fragment.
const MAX_FRAGMENT_ATTEMPTS: usize = 3;

/// Polls for the kernel-ready signal after the execute command.
const KERNEL_READY_ATTEMPTS: usize = 10;

/// Delay between readiness polls.
const KERNEL_READY_DELAY: Duration = Duration::from_millis(200);

/// Header, mode, submode, length, address, and trailing sum around the
/// data of one write-to-memory message.
pub(crate) const WRITE_OVERHEAD: usize = 12;

impl<A: Adapter> Vehicle<A> {
    /// Upload the kernel image into target RAM and start it.
    ///
    /// Returns the running kernel's version. Any fragment exhausting its
    /// retry ceiling aborts the upload as [`Error::DeviceFailure`].
    pub fn upload_kernel(&mut self, info: &PcmInfo, image: &[u8]) -> Result<[u8; 4]> {
        let _guard = self.begin_operation()?;
        self.upload_kernel_inner(info, image)
    }

    #[allow(clippy::cast_possible_truncation)] // fragment sizes bounded by negotiated max
    pub(crate) fn upload_kernel_inner(
        &mut self,
        info: &PcmInfo,
        image: &[u8],
    ) -> Result<[u8; 4]> {
        let length = u16::try_from(image.len()).map_err(|_| {
            Error::DeviceFailure(format!("kernel image too large: {} bytes", image.len()))
        })?;
        self.reporter
            .status(format!("Uploading kernel ({length} bytes)"));

        self.adapter.set_timeout(TimeoutScenario::KernelUpload)?;
        self.adapter.clear_message_buffer()?;

        let reply = self.request(
            &factory::upload_permission(length, info.kernel_address),
            mode::UPLOAD_REQUEST,
        )?;
        parser::parse_upload_grant(&reply)?;

        let max_fragment = self
            .adapter
            .capabilities()
            .max_send_size
            .saturating_sub(WRITE_OVERHEAD)
            .max(1);

        let mut address = info.kernel_address;
        for fragment in image.chunks(max_fragment) {
            self.write_fragment(address, fragment)?;
            address += fragment.len() as u32;
        }

        debug!("all fragments stored, starting kernel");
        let reply = self.request(
            &factory::write_memory(info.kernel_address, &[], true),
            mode::TRANSFER_DATA,
        )?;
        parser::parse_write_ack(&reply, transfer::STORE_AND_EXECUTE)?;

        self.wait_for_kernel()
    }

    /// Send one fragment, verifying its acknowledgment before returning.
    fn write_fragment(&mut self, address: u32, fragment: &[u8]) -> Result<()> {
        let mut attempts = 0;
        loop {
            let result = self
                .request(&factory::write_memory(address, fragment, false), mode::TRANSFER_DATA)
                .and_then(|reply| parser::parse_write_ack(&reply, transfer::STORE));

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_FRAGMENT_ATTEMPTS {
                        return Err(Error::DeviceFailure(format!(
                            "kernel fragment at {address:#08X} failed after \
                             {MAX_FRAGMENT_ATTEMPTS} attempts: {e}"
                        )));
                    }
                    warn!(
                        "fragment at {address:#08X} failed \
                         (attempt {attempts}/{MAX_FRAGMENT_ATTEMPTS}): {e}"
                    );
                    self.adapter.clear_message_buffer()?;
                },
            }
        }
    }

    /// Poll for the kernel-ready signal, bounded.
    fn wait_for_kernel(&mut self) -> Result<[u8; 4]> {
        for attempt in 1..=KERNEL_READY_ATTEMPTS {
            let probe = self
                .request(&factory::kernel_version_request(), mode::KERNEL_VERSION)
                .and_then(|reply| parser::parse_kernel_version(&reply));
            match probe {
                Ok(version) => {
                    self.reporter.status(format!(
                        "Kernel running, version {:02X}.{:02X}.{:02X}.{:02X}",
                        version[0], version[1], version[2], version[3]
                    ));
                    return Ok(version);
                },
                Err(e) => {
                    debug!("kernel not ready (attempt {attempt}/{KERNEL_READY_ATTEMPTS}): {e}");
                    thread::sleep(KERNEL_READY_DELAY);
                },
            }
        }
        Err(Error::DeviceFailure(format!(
            "kernel did not signal ready within {KERNEL_READY_ATTEMPTS} polls"
        )))
    }

    /// Return the target from kernel mode to normal operation.
    pub fn exit_kernel(&mut self) -> Result<()> {
        let _guard = self.begin_operation()?;
        self.exit_kernel_inner()
    }

    pub(crate) fn exit_kernel_inner(&mut self) -> Result<()> {
        self.reporter.status("Returning PCM to normal operation");
        self.adapter.set_timeout(TimeoutScenario::DataProperty)?;
        self.adapter.send_message(&factory::return_to_normal())?;

        // The target may reboot before the acknowledgment gets out.
        match self.adapter.receive_message() {
            Ok(reply) if parser::is_reply_to(&reply, mode::RETURN_TO_NORMAL) => {},
            Ok(other) => debug!("unexpected frame while exiting kernel: {other}"),
            Err(Error::Timeout(_)) => debug!("no exit acknowledgment, assuming reboot"),
            Err(e) => return Err(e),
        }

        self.adapter.clear_message_buffer()?;
        self.relock();
        Ok(())
    }

    /// Diagnostic path: upload the kernel, confirm it answers, and return
    /// the target to normal operation without touching flash.
    pub fn test_kernel(&mut self, info: &PcmInfo, image: &[u8]) -> Result<[u8; 4]> {
        let _guard = self.begin_operation()?;

        let recovery = self.check_recovery_mode()?;
        if recovery {
            self.reporter
                .status("Recovery mode: skipping unlock handshake");
        } else {
            self.unlock_inner(info)?;
        }

        let version = self.upload_kernel_inner(info, image)?;
        self.exit_kernel_inner()?;
        Ok(version)
    }
}
