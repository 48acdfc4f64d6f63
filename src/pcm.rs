//! Target identity: operating-system id to unlock algorithm and memory
//! layout.
//!
//! The PCM reports a 4-byte operating system id; everything the transfer
//! engine needs to size and address its work is derived from that id once
//! per session and kept immutable afterwards.

use crate::error::{Error, Result};

/// Supported PCM hardware families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hardware {
    /// 512 KiB flash, '0411-style service number.
    P01,
    /// 1 MiB flash, same electrical family as P01.
    P59,
}

impl Hardware {
    /// Total flash image size in bytes.
    pub fn image_size(self) -> usize {
        match self {
            Self::P01 => 512 * 1024,
            Self::P59 => 1024 * 1024,
        }
    }
}

impl std::fmt::Display for Hardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P01 => write!(f, "P01"),
            Self::P59 => write!(f, "P59"),
        }
    }
}

/// Seed-to-key transform variant for the unlock handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyAlgorithm {
    /// `key = constant - seed`.
    SubtractFrom(u16),
    /// `key = seed + constant`.
    AddOffset(u16),
    /// `key = swap_bytes(seed) ^ mask`.
    SwapAndXor(u16),
}

impl KeyAlgorithm {
    /// Compute the expected key for the given seed.
    pub fn compute_key(self, seed: u16) -> u16 {
        match self {
            Self::SubtractFrom(constant) => constant.wrapping_sub(seed),
            Self::AddOffset(constant) => seed.wrapping_add(constant),
            Self::SwapAndXor(mask) => seed.swap_bytes() ^ mask,
        }
    }
}

/// Session-immutable description of the connected PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PcmInfo {
    /// Reported operating system id.
    pub os_id: u32,
    /// Hardware family.
    pub hardware: Hardware,
    /// Unlock-challenge transform for this OS.
    pub key_algorithm: KeyAlgorithm,
    /// Total flash image size in bytes.
    pub image_size: usize,
    /// Offset of the boot segment's end / start of the OS segment.
    pub boot_size: usize,
    /// Offset of the calibration segment within the image.
    pub calibration_offset: usize,
    /// RAM address the kernel is uploaded to and started from.
    pub kernel_address: u32,
}

/// Known operating system ids. A real table grows release by release;
/// unknown ids are refused rather than guessed at.
const OS_TABLE: &[(u32, Hardware, KeyAlgorithm)] = &[
    (9354896, Hardware::P01, KeyAlgorithm::SubtractFrom(0x934D)),
    (12202088, Hardware::P01, KeyAlgorithm::SubtractFrom(0x934D)),
    (12212156, Hardware::P01, KeyAlgorithm::SubtractFrom(0x934D)),
    (12225074, Hardware::P01, KeyAlgorithm::SubtractFrom(0x934D)),
    (12593358, Hardware::P59, KeyAlgorithm::SwapAndXor(0x9D31)),
    (12606961, Hardware::P59, KeyAlgorithm::SwapAndXor(0x9D31)),
    (12612115, Hardware::P59, KeyAlgorithm::AddOffset(0x2F4A)),
];

/// Kernel load address shared by the supported families.
const KERNEL_ADDRESS: u32 = 0xFF8000;

/// Boot segment size shared by the supported families.
const BOOT_SIZE: usize = 0x4000;

/// Calibration segment offset shared by the supported families.
const CALIBRATION_OFFSET: usize = 0x8000;

impl PcmInfo {
    /// Derive session parameters from the reported operating system id.
    pub fn from_os_id(os_id: u32) -> Result<Self> {
        let (_, hardware, key_algorithm) = OS_TABLE
            .iter()
            .find(|(id, _, _)| *id == os_id)
            .ok_or_else(|| Error::Unsupported(format!("unknown operating system id {os_id}")))?;

        Ok(Self {
            os_id,
            hardware: *hardware,
            key_algorithm: *key_algorithm,
            image_size: hardware.image_size(),
            boot_size: BOOT_SIZE,
            calibration_offset: CALIBRATION_OFFSET,
            kernel_address: KERNEL_ADDRESS,
        })
    }
}

/// Which part of the flash image a write covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Calibration segment only.
    Calibration,
    /// Operating system and calibration, leaving the boot segment alone.
    OsAndCalibration,
    /// The entire image, boot segment included.
    Full,
}

impl WriteScope {
    /// The `(offset, length)` range this scope covers within the image.
    pub fn range(self, info: &PcmInfo) -> (usize, usize) {
        match self {
            Self::Calibration => (
                info.calibration_offset,
                info.image_size - info.calibration_offset,
            ),
            Self::OsAndCalibration => (info.boot_size, info.image_size - info.boot_size),
            Self::Full => (0, info.image_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_os_id() {
        let info = PcmInfo::from_os_id(12202088).unwrap();
        assert_eq!(info.hardware, Hardware::P01);
        assert_eq!(info.image_size, 512 * 1024);
        assert_eq!(info.kernel_address, 0xFF8000);
    }

    #[test]
    fn test_unknown_os_id_refused() {
        assert!(matches!(
            PcmInfo::from_os_id(1),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_key_algorithms() {
        assert_eq!(
            KeyAlgorithm::SubtractFrom(0x934D).compute_key(0x1234),
            0x8119
        );
        assert_eq!(KeyAlgorithm::AddOffset(0x0001).compute_key(0xFFFF), 0x0000);
        assert_eq!(
            KeyAlgorithm::SwapAndXor(0x00FF).compute_key(0x1234),
            0x3412 ^ 0x00FF
        );
    }

    #[test]
    fn test_write_scope_ranges() {
        let info = PcmInfo::from_os_id(12593358).unwrap();
        assert_eq!(WriteScope::Full.range(&info), (0, 1024 * 1024));
        assert_eq!(
            WriteScope::OsAndCalibration.range(&info),
            (0x4000, 1024 * 1024 - 0x4000)
        );
        assert_eq!(
            WriteScope::Calibration.range(&info),
            (0x8000, 1024 * 1024 - 0x8000)
        );
    }
}
