//! Checksummed block transfer against the running kernel.
//!
//! Both directions share the same loop shape: one block per round trip,
//! sized to the adapter's negotiated maximum with a shorter final block,
//! bounded per-block retries on checksum or timeout, cancellation observed
//! only at block boundaries, and progress reported after every block. The
//! caller gets either a complete buffer or a failure; there is no
//! partial-success reporting.

use log::warn;

use crate::adapter::{Adapter, TimeoutScenario, VpwSpeed};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::pcm::{PcmInfo, WriteScope};
use crate::protocol::{factory, mode, parser, transfer};
use crate::vehicle::Vehicle;
use crate::vehicle::kernel::WRITE_OVERHEAD;

/// Retry ceiling per block before the whole transfer fails.
const MAX_BLOCK_ATTEMPTS: usize = 3;

/// Header, mode, submode, address, and trailing sum around the data of one
/// block-read reply.
const READ_OVERHEAD: usize = 12;

/// Caller-provided context for a write operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFlags {
    /// The kernel is already running; skip unlock and upload.
    pub kernel_running: bool,
    /// The target is known to be in recovery mode; skip the probe and the
    /// unlock handshake.
    pub recovery_mode: bool,
}

/// One in-flight block transfer. Owned exclusively by the loop and gone
/// when it exits.
struct TransferState {
    address: u32,
    remaining: usize,
    attempts: usize,
}

impl<A: Adapter> Vehicle<A> {
    /// Read `length` bytes starting at `start` through the running kernel.
    pub fn read_memory(
        &mut self,
        start: u32,
        length: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let _guard = self.begin_operation()?;
        self.read_memory_inner(start, length, cancel)
    }

    #[allow(clippy::cast_possible_truncation)] // block sizes bounded by negotiated max
    pub(crate) fn read_memory_inner(
        &mut self,
        start: u32,
        length: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        self.adapter.set_timeout(TimeoutScenario::BlockTransfer)?;
        let block_size = self
            .adapter
            .capabilities()
            .max_receive_size
            .saturating_sub(READ_OVERHEAD)
            .max(1);

        let mut buffer = Vec::with_capacity(length);
        let mut state = TransferState {
            address: start,
            remaining: length,
            attempts: 0,
        };

        while state.remaining > 0 {
            cancel.check()?;
            let len = state.remaining.min(block_size);

            loop {
                let result = self
                    .request(&factory::block_read(state.address, len as u16), mode::BLOCK_READ)
                    .and_then(|reply| parser::parse_block_read(&reply, state.address))
                    .and_then(|data| {
                        if data.len() == len {
                            Ok(data)
                        } else {
                            Err(Error::UnexpectedResponse(format!(
                                "block at {:#08X} came back {} bytes, expected {len}",
                                state.address,
                                data.len()
                            )))
                        }
                    });

                match result {
                    Ok(data) => {
                        buffer.extend_from_slice(&data);
                        break;
                    },
                    Err(e) => {
                        state.attempts += 1;
                        if state.attempts >= MAX_BLOCK_ATTEMPTS {
                            return Err(e);
                        }
                        warn!(
                            "block at {:#08X} failed (attempt {}/{MAX_BLOCK_ATTEMPTS}): {e}",
                            state.address, state.attempts
                        );
                        self.adapter.clear_message_buffer()?;
                    },
                }
            }

            state.attempts = 0;
            state.address += len as u32;
            state.remaining -= len;
            self.reporter.progress(buffer.len(), length);
        }

        Ok(buffer)
    }

    /// Write `data` starting at `start` through the running kernel.
    pub fn write_memory(
        &mut self,
        start: u32,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<()> {
        let _guard = self.begin_operation()?;
        self.write_memory_inner(start, data, cancel)
    }

    #[allow(clippy::cast_possible_truncation)] // block sizes bounded by negotiated max
    pub(crate) fn write_memory_inner(
        &mut self,
        start: u32,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<()> {
        self.adapter.set_timeout(TimeoutScenario::BlockTransfer)?;
        let block_size = self
            .adapter
            .capabilities()
            .max_send_size
            .saturating_sub(WRITE_OVERHEAD)
            .max(1);

        let total = data.len();
        let mut written = 0usize;
        let mut state = TransferState {
            address: start,
            remaining: total,
            attempts: 0,
        };

        for block in data.chunks(block_size) {
            cancel.check()?;

            loop {
                let result = self
                    .request(
                        &factory::write_memory(state.address, block, false),
                        mode::TRANSFER_DATA,
                    )
                    .and_then(|reply| parser::parse_write_ack(&reply, transfer::STORE));

                match result {
                    Ok(()) => break,
                    Err(e) => {
                        state.attempts += 1;
                        if state.attempts >= MAX_BLOCK_ATTEMPTS {
                            return Err(e);
                        }
                        warn!(
                            "block at {:#08X} failed (attempt {}/{MAX_BLOCK_ATTEMPTS}): {e}",
                            state.address, state.attempts
                        );
                        self.adapter.clear_message_buffer()?;
                    },
                }
            }

            state.attempts = 0;
            state.address += block.len() as u32;
            state.remaining -= block.len();
            written += block.len();
            self.reporter.progress(written, total);
        }

        Ok(())
    }

    /// Read the full flash image.
    ///
    /// Recovery mode is checked first; in recovery the unlock handshake is
    /// skipped because it needs normal-mode firmware. The kernel is always
    /// exited afterwards, on failure too, so the session never ends in an
    /// ambiguous state.
    pub fn read_full_contents(
        &mut self,
        info: &PcmInfo,
        kernel_image: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let _guard = self.begin_operation()?;
        self.reporter.status(format!(
            "Reading {} image ({} KiB)",
            info.hardware,
            info.image_size / 1024
        ));

        self.enter_kernel(info, kernel_image, false)?;
        let result = self.read_memory_inner(0, info.image_size, cancel);
        self.leave_kernel();

        match &result {
            Ok(_) => self.reporter.status("Read complete"),
            Err(e) if e.is_cancelled() => self.reporter.status("Read cancelled"),
            Err(e) => self.reporter.status(format!("Read failed: {e}")),
        }
        result
    }

    /// Write one scope of the flash image.
    ///
    /// `image` must be a full-size image; the scope selects which part of
    /// it is written.
    pub fn write_contents(
        &mut self,
        info: &PcmInfo,
        scope: WriteScope,
        image: &[u8],
        flags: WriteFlags,
        kernel_image: &[u8],
        cancel: &CancelToken,
    ) -> Result<()> {
        let _guard = self.begin_operation()?;
        if image.len() != info.image_size {
            return Err(Error::Unsupported(format!(
                "image is {} bytes, {} expects {}",
                image.len(),
                info.hardware,
                info.image_size
            )));
        }

        let (offset, length) = scope.range(info);
        self.reporter.status(format!(
            "Writing {length} bytes at offset {offset:#X}"
        ));

        if flags.kernel_running {
            self.reporter.status("Kernel already running");
        } else {
            self.enter_kernel(info, kernel_image, flags.recovery_mode)?;
        }

        let result =
            self.write_memory_inner(offset as u32, &image[offset..offset + length], cancel);
        self.leave_kernel();

        match &result {
            Ok(()) => self.reporter.status("Write complete"),
            Err(e) if e.is_cancelled() => self.reporter.status("Write cancelled"),
            Err(e) => self.reporter.status(format!("Write failed: {e}")),
        }
        result
    }

    /// Unlock (unless in recovery), upload the kernel, and switch to 4x
    /// when the adapter can follow.
    fn enter_kernel(
        &mut self,
        info: &PcmInfo,
        kernel_image: &[u8],
        known_recovery: bool,
    ) -> Result<()> {
        let recovery = known_recovery || self.check_recovery_mode()?;
        if recovery {
            self.reporter
                .status("Recovery mode: skipping unlock handshake");
        } else {
            self.unlock_inner(info)?;
        }

        self.upload_kernel_inner(info, kernel_image)?;

        if self.adapter.capabilities().supports_4x {
            self.set_vpw_speed(VpwSpeed::FourX)?;
        }
        Ok(())
    }

    /// Best-effort return to normal mode and standard speed; failures here
    /// must not mask the transfer outcome.
    fn leave_kernel(&mut self) {
        if let Err(e) = self.exit_kernel_inner() {
            warn!("failed to exit kernel cleanly: {e}");
        }
        if let Err(e) = self.adapter.set_vpw_speed(VpwSpeed::Standard) {
            warn!("failed to return adapter to standard speed: {e}");
        }
    }
}
