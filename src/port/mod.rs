//! Port abstraction for raw byte I/O to an interface adapter.
//!
//! The protocol layers are I/O-agnostic: everything above this module talks
//! to a [`Port`], whether the adapter hangs off a USB serial cable or a
//! vendor pass-through driver.
//!
//! ```text
//! +------------------+     +------------------+
//! |  Adapter layer   |     |  Adapter layer   |
//! |  (elm, passthru) |     |  (elm, passthru) |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! |    Port trait    |     |  PassThru trait  |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! | Native SerialPort|     |  Vendor driver   |
//! |   (serialport)   |     |   (external)     |
//! +------------------+     +------------------+
//! ```
//!
//! No retry logic lives here; a [`Port`] is pure byte I/O with a timeout.

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate. Text adapters run at a fixed 115200.
    pub baud_rate: u32,
    /// Initial read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the initial timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw byte channel to a physical link.
///
/// `receive` must fail with [`crate::Error::Timeout`] when no byte arrives
/// within the current timeout; it must never block indefinitely.
pub trait Port: Send {
    /// Transmit all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Copy up to `buf.len()` received bytes into `buf`.
    ///
    /// Returns the number of bytes copied (at least 1), or
    /// [`crate::Error::Timeout`] when nothing arrived in time.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Drop any buffered bytes in both directions.
    fn discard_buffers(&mut self) -> Result<()>;

    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// The current read timeout.
    fn timeout(&self) -> Duration;

    /// Port name/path for diagnostics.
    fn name(&self) -> &str;
}

#[cfg(feature = "native")]
pub use native::NativePort;
