//! Request message builders.
//!
//! Every builder returns a complete [`VpwMessage`] addressed from the tool
//! to the PCM. Block-transfer payloads carry a trailing 16-bit arithmetic
//! sum over their data bytes which the target re-computes; the single
//! trailing frame checksum is appended separately at wire encode.

use byteorder::{BigEndian, WriteBytesExt};

use crate::message::VpwMessage;
use crate::protocol::{
    BlockId, NODE_PCM, NODE_TOOL, PRIORITY_BLOCK, PRIORITY_PHYSICAL, mode, security, transfer,
};

/// 16-bit arithmetic sum over block data, carried inside transfer payloads.
pub fn block_sum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)))
}

fn physical(payload: &[u8]) -> VpwMessage {
    VpwMessage::new(PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL, payload)
}

fn block(payload: &[u8]) -> VpwMessage {
    VpwMessage::new(PRIORITY_BLOCK, NODE_PCM, NODE_TOOL, payload)
}

/// Read one identification property block.
pub fn read_property(block_id: BlockId) -> VpwMessage {
    physical(&[mode::READ_PROPERTY, block_id as u8])
}

/// Request the unlock seed.
pub fn seed_request() -> VpwMessage {
    physical(&[mode::SECURITY_ACCESS, security::REQUEST_SEED])
}

/// Send the computed unlock key.
pub fn unlock_key(key: u16) -> VpwMessage {
    let [hi, lo] = key.to_be_bytes();
    physical(&[mode::SECURITY_ACCESS, security::SEND_KEY, hi, lo])
}

/// Return the target to normal operation.
pub fn return_to_normal() -> VpwMessage {
    physical(&[mode::RETURN_TO_NORMAL])
}

/// Probe for recovery mode.
pub fn recovery_probe() -> VpwMessage {
    physical(&[mode::RECOVERY_PROBE])
}

/// Ask the target for permission to switch to 4x bus speed.
pub fn high_speed_request() -> VpwMessage {
    physical(&[mode::HIGH_SPEED_REQUEST])
}

/// Commit the 4x speed switch. The target answers nothing; it changes
/// speed as soon as the frame is on the bus.
pub fn high_speed_begin() -> VpwMessage {
    physical(&[mode::HIGH_SPEED_BEGIN])
}

/// Request permission to upload `length` bytes at `address`.
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn upload_permission(length: u16, address: u32) -> VpwMessage {
    let mut payload = Vec::with_capacity(8);
    payload.push(mode::UPLOAD_REQUEST);
    payload.push(0x00);
    payload.write_u16::<BigEndian>(length).unwrap();
    payload.write_u24::<BigEndian>(address).unwrap();
    physical(&payload)
}

/// Write `data` into target memory at `address`.
///
/// With `execute` set the target jumps to `address` after storing, which
/// starts an uploaded kernel; `data` may be empty in that case.
#[allow(clippy::cast_possible_truncation)] // fragment length bounded by negotiated max
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn write_memory(address: u32, data: &[u8], execute: bool) -> VpwMessage {
    let submode = if execute {
        transfer::STORE_AND_EXECUTE
    } else {
        transfer::STORE
    };
    let mut payload = Vec::with_capacity(10 + data.len());
    payload.push(mode::TRANSFER_DATA);
    payload.push(submode);
    payload.write_u16::<BigEndian>(data.len() as u16).unwrap();
    payload.write_u24::<BigEndian>(address).unwrap();
    payload.extend_from_slice(data);
    payload.write_u16::<BigEndian>(block_sum(data)).unwrap();
    block(&payload)
}

/// Ask the running kernel for `length` bytes starting at `address`.
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn block_read(address: u32, length: u16) -> VpwMessage {
    let mut payload = Vec::with_capacity(8);
    payload.push(mode::BLOCK_READ);
    payload.push(0x01);
    payload.write_u16::<BigEndian>(length).unwrap();
    payload.write_u24::<BigEndian>(address).unwrap();
    block(&payload)
}

/// Ask the running kernel for its version.
pub fn kernel_version_request() -> VpwMessage {
    block(&[mode::KERNEL_VERSION, 0x00])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sum() {
        assert_eq!(block_sum(&[]), 0);
        assert_eq!(block_sum(&[0x01, 0x02, 0x03]), 6);
        assert_eq!(block_sum(&[0xFF; 300]), (300u32 * 0xFF % 0x1_0000) as u16);
    }

    #[test]
    fn test_read_property_shape() {
        let msg = read_property(BlockId::OperatingSystemId);
        assert_eq!(msg.header(), [PRIORITY_PHYSICAL, NODE_PCM, NODE_TOOL]);
        assert_eq!(msg.payload(), &[0x3C, 0x0A]);
    }

    #[test]
    fn test_seed_and_key() {
        assert_eq!(seed_request().payload(), &[0x27, 0x01]);
        assert_eq!(unlock_key(0x1A2B).payload(), &[0x27, 0x02, 0x1A, 0x2B]);
    }

    #[test]
    fn test_write_memory_layout() {
        let msg = write_memory(0xFF8000, &[0xAA, 0xBB], false);
        // mode, submode, len16, addr24, data, sum16
        assert_eq!(
            msg.payload(),
            &[0x36, 0x00, 0x00, 0x02, 0xFF, 0x80, 0x00, 0xAA, 0xBB, 0x01, 0x65]
        );
        assert_eq!(msg.priority(), PRIORITY_BLOCK);
    }

    #[test]
    fn test_execute_submode() {
        let msg = write_memory(0xFF8000, &[], true);
        assert_eq!(
            msg.payload(),
            &[0x36, 0x80, 0x00, 0x00, 0xFF, 0x80, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_block_read_layout() {
        let msg = block_read(0x012345, 0x0400);
        assert_eq!(msg.payload(), &[0x35, 0x01, 0x04, 0x00, 0x01, 0x23, 0x45]);
    }

    #[test]
    fn test_upload_permission_layout() {
        let msg = upload_permission(0x0C00, 0xFF8000);
        assert_eq!(msg.payload(), &[0x34, 0x00, 0x0C, 0x00, 0xFF, 0x80, 0x00]);
    }
}
