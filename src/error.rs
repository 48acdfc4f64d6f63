//! Error types for pcmflash.

use std::io;
use thiserror::Error;

/// Result type for pcmflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pcmflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No response within the current timeout budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The adapter or the PCM returned something outside the expected grammar.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Initialization or kernel-upload step failed verification.
    ///
    /// Not retried automatically: a partially configured adapter or a
    /// half-uploaded kernel may leave the target in an unsafe state.
    #[error("Device failure: {0}")]
    DeviceFailure(String),

    /// The caller requested a stop. Distinct status, not a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// Frame or block data and its embedded checksum disagree.
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum carried on the wire.
        expected: u16,
        /// Checksum computed from the data.
        actual: u16,
    },

    /// Unknown operating system id or unsupported adapter capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A second top-level operation was started while one is in flight.
    #[error("Busy: {0}")]
    Busy(&'static str),
}

impl Error {
    /// Whether this error is the cooperative-cancellation status.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
