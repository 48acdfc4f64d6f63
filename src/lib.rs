//! # pcmflash
//!
//! A library for reading and reflashing GM powertrain control modules
//! (PCMs) over the SAE J1850 VPW bus.
//!
//! This crate is the protocol engine only: it owns the message
//! abstraction, the adapter dialogues, the seed/key unlock handshake, the
//! kernel upload, and the checksummed block-transfer state machines. Front
//! ends (GUI or CLI) drive it through [`Vehicle`] and observe it through
//! a [`report::Reporter`] channel.
//!
//! - VPW frame encode/decode with checksum verification
//! - Text-command (ELM327-family) and vendor pass-through adapter drivers
//!   behind one [`adapter::Adapter`] contract
//! - Seed/key unlock with per-OS key algorithms
//! - Kernel upload and checksummed block read/write with bounded retries,
//!   progress reporting, and cooperative cancellation
//!
//! ## Supported targets
//!
//! - P01 (512 KiB) and P59 (1 MiB) powertrain control modules
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization support for the plain data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcmflash::{CancelToken, ElmAdapter, Reporter, Vehicle};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ElmAdapter::open("/dev/ttyUSB0")?;
//!     let (reporter, events) = Reporter::channel();
//!     let mut vehicle = Vehicle::new(adapter).with_reporter(reporter);
//!
//!     vehicle.initialize()?;
//!     println!("VIN: {}", vehicle.query_vin()?);
//!
//!     let info = vehicle.query_pcm_info()?;
//!     let kernel = std::fs::read("kernel.bin")?;
//!     let cancel = CancelToken::new();
//!
//!     // Drain `events` from another thread to render progress.
//!     let image = vehicle.read_full_contents(&info, &kernel, &cancel)?;
//!     std::fs::write("pcm.bin", image)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod cancel;
pub mod error;
pub mod message;
pub mod pcm;
pub mod port;
pub mod protocol;
pub mod report;
pub mod vehicle;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    adapter::{
        Adapter, DeviceCapabilities, SessionState, TimeoutScenario, VpwSpeed,
        elm::ElmAdapter,
        passthru::{PassThruAdapter, PassThruInterface},
    },
    cancel::CancelToken,
    error::{Error, Result},
    message::VpwMessage,
    pcm::{Hardware, KeyAlgorithm, PcmInfo, WriteScope},
    port::{Port, SerialConfig},
    report::{Event, Reporter},
    vehicle::{Vehicle, transfer::WriteFlags},
};
