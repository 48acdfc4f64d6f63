//! Response decoding into typed results.
//!
//! Replies are matched on destination (this tool), source (the PCM), and
//! the expected reply mode before any payload is trusted. A negative
//! response (`7F <mode> <code>`) surfaces as a device failure carrying the
//! code; anything outside the grammar is an unexpected response.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::message::VpwMessage;
use crate::protocol::{
    BlockId, NODE_PCM, NODE_TOOL, REPLY_OFFSET, factory::block_sum, mode, security,
};

/// Outcome of the seed/key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockResponse {
    /// Key accepted; privileged operations are available.
    Accepted,
    /// Key rejected with the target's result code.
    Rejected(u8),
}

/// Whether `msg` addresses this tool from the PCM as a reply (positive or
/// negative) to `request_mode`. Used to skip unrelated bus chatter.
pub fn is_reply_to(msg: &VpwMessage, request_mode: u8) -> bool {
    if msg.destination() != NODE_TOOL || msg.source() != NODE_PCM {
        return false;
    }
    match msg.payload() {
        [m, ..] if *m == request_mode.wrapping_add(REPLY_OFFSET) => true,
        [m, rejected, ..] if *m == mode::NEGATIVE_RESPONSE => *rejected == request_mode,
        _ => false,
    }
}

/// Validate the addressing and reply mode, returning the payload behind
/// the mode byte of a positive reply.
pub fn expect_positive_reply<'a>(
    msg: &'a VpwMessage,
    request_mode: u8,
) -> Result<&'a [u8]> {
    if msg.destination() != NODE_TOOL || msg.source() != NODE_PCM {
        return Err(Error::UnexpectedResponse(format!(
            "reply addressed {:02X} -> {:02X}, not PCM to tool",
            msg.source(),
            msg.destination()
        )));
    }
    match msg.payload() {
        [m, rest @ ..] if *m == request_mode.wrapping_add(REPLY_OFFSET) => Ok(rest),
        [m, rejected, code, ..]
            if *m == mode::NEGATIVE_RESPONSE && *rejected == request_mode =>
        {
            Err(Error::DeviceFailure(format!(
                "negative response to mode {rejected:02X}, code {code:02X}"
            )))
        },
        _ => Err(Error::UnexpectedResponse(format!(
            "expected reply to mode {request_mode:02X}, got {msg}"
        ))),
    }
}

/// Extract the data of one identification property block.
pub fn parse_property(msg: &VpwMessage, block_id: BlockId) -> Result<Vec<u8>> {
    let rest = expect_positive_reply(msg, mode::READ_PROPERTY)?;
    match rest {
        [id, data @ ..] if *id == block_id as u8 => Ok(data.to_vec()),
        _ => Err(Error::UnexpectedResponse(format!(
            "property reply for wrong block: {msg}"
        ))),
    }
}

/// Extract the 16-bit unlock seed. A seed of zero means the target is
/// already unlocked.
pub fn parse_seed(msg: &VpwMessage) -> Result<u16> {
    let rest = expect_positive_reply(msg, mode::SECURITY_ACCESS)?;
    match rest {
        [security::REQUEST_SEED, hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(Error::UnexpectedResponse(format!("bad seed reply: {msg}"))),
    }
}

/// Interpret the target's answer to the unlock key.
pub fn parse_unlock(msg: &VpwMessage) -> Result<UnlockResponse> {
    let rest = expect_positive_reply(msg, mode::SECURITY_ACCESS)?;
    match rest {
        [security::SEND_KEY, security::KEY_ACCEPTED, ..] => Ok(UnlockResponse::Accepted),
        [security::SEND_KEY, code, ..] => Ok(UnlockResponse::Rejected(*code)),
        _ => Err(Error::UnexpectedResponse(format!(
            "bad unlock reply: {msg}"
        ))),
    }
}

/// Confirm that the upload permission request was granted.
pub fn parse_upload_grant(msg: &VpwMessage) -> Result<()> {
    let rest = expect_positive_reply(msg, mode::UPLOAD_REQUEST)?;
    match rest {
        [0x00, ..] => Ok(()),
        [code, ..] => Err(Error::DeviceFailure(format!(
            "upload refused, code {code:02X}"
        ))),
        [] => Err(Error::UnexpectedResponse("empty upload reply".into())),
    }
}

/// Confirm a write-to-memory acknowledgment for the given submode.
pub fn parse_write_ack(msg: &VpwMessage, submode: u8) -> Result<()> {
    let rest = expect_positive_reply(msg, mode::TRANSFER_DATA)?;
    match rest {
        [m, ..] if *m == submode => Ok(()),
        _ => Err(Error::UnexpectedResponse(format!(
            "bad write acknowledgment: {msg}"
        ))),
    }
}

/// Extract the running kernel's 4-byte version.
pub fn parse_kernel_version(msg: &VpwMessage) -> Result<[u8; 4]> {
    let rest = expect_positive_reply(msg, mode::KERNEL_VERSION)?;
    match rest {
        [0x00, a, b, c, d, ..] => Ok([*a, *b, *c, *d]),
        _ => Err(Error::UnexpectedResponse(format!(
            "bad kernel version reply: {msg}"
        ))),
    }
}

/// Extract and verify one block-read payload.
///
/// The reply echoes the block address, then carries the data followed by a
/// 16-bit arithmetic sum over the data; a disagreement between the carried
/// and recomputed sums is a checksum mismatch and the block must be
/// re-requested.
pub fn parse_block_read(msg: &VpwMessage, expected_address: u32) -> Result<Vec<u8>> {
    let rest = expect_positive_reply(msg, mode::BLOCK_READ)?;
    // submode, addr24, at least the sum itself
    if rest.len() < 6 || rest[0] != 0x01 {
        return Err(Error::UnexpectedResponse(format!(
            "malformed block reply: {msg}"
        )));
    }
    let address = u32::from(rest[1]) << 16 | u32::from(rest[2]) << 8 | u32::from(rest[3]);
    if address != expected_address {
        return Err(Error::UnexpectedResponse(format!(
            "block reply for {address:#08X}, expected {expected_address:#08X}"
        )));
    }
    let (data, trailer) = rest[4..].split_at(rest.len() - 6);
    let expected = BigEndian::read_u16(trailer);
    let actual = block_sum(data);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(data.to_vec())
}

/// Whether `msg` is the target's answer to the recovery probe.
pub fn is_recovery_reply(msg: &VpwMessage) -> bool {
    is_reply_to(msg, mode::RECOVERY_PROBE)
}

/// Confirm the 4x speed switch was granted.
pub fn parse_high_speed_grant(msg: &VpwMessage) -> Result<()> {
    expect_positive_reply(msg, mode::HIGH_SPEED_REQUEST).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PRIORITY_BLOCK, PRIORITY_PHYSICAL, factory};

    fn reply(payload: &[u8]) -> VpwMessage {
        VpwMessage::new(PRIORITY_PHYSICAL, NODE_TOOL, NODE_PCM, payload)
    }

    fn block_reply(payload: &[u8]) -> VpwMessage {
        VpwMessage::new(PRIORITY_BLOCK, NODE_TOOL, NODE_PCM, payload)
    }

    #[test]
    fn test_is_reply_to_matches_positive_and_negative() {
        assert!(is_reply_to(&reply(&[0x7C, 0x0A]), mode::READ_PROPERTY));
        assert!(is_reply_to(
            &reply(&[0x7F, 0x3C, 0x11]),
            mode::READ_PROPERTY
        ));
        assert!(!is_reply_to(&reply(&[0x7C, 0x0A]), mode::SECURITY_ACCESS));
        // wrong direction: tool -> PCM
        let outbound = factory::seed_request();
        assert!(!is_reply_to(&outbound, mode::SECURITY_ACCESS));
    }

    #[test]
    fn test_negative_response_is_device_failure() {
        let err = expect_positive_reply(&reply(&[0x7F, 0x27, 0x33]), mode::SECURITY_ACCESS)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceFailure(_)));
    }

    #[test]
    fn test_parse_property() {
        let msg = reply(&[0x7C, 0x0A, 0x00, 0xBA, 0x0D, 0x68]);
        let data = parse_property(&msg, BlockId::OperatingSystemId).unwrap();
        assert_eq!(data, vec![0x00, 0xBA, 0x0D, 0x68]);

        assert!(parse_property(&msg, BlockId::CalibrationId).is_err());
    }

    #[test]
    fn test_parse_seed() {
        let msg = reply(&[0x67, 0x01, 0x12, 0x34]);
        assert_eq!(parse_seed(&msg).unwrap(), 0x1234);
    }

    #[test]
    fn test_parse_unlock_accept_and_reject() {
        assert_eq!(
            parse_unlock(&reply(&[0x67, 0x02, 0x34])).unwrap(),
            UnlockResponse::Accepted
        );
        assert_eq!(
            parse_unlock(&reply(&[0x67, 0x02, 0x35])).unwrap(),
            UnlockResponse::Rejected(0x35)
        );
    }

    #[test]
    fn test_parse_block_read_round_trip() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut payload = vec![0x75, 0x01, 0x01, 0x23, 0x45];
        payload.extend_from_slice(&data);
        payload.extend_from_slice(&block_sum(&data).to_be_bytes());
        let msg = block_reply(&payload);

        assert_eq!(parse_block_read(&msg, 0x012345).unwrap(), data);
        assert!(matches!(
            parse_block_read(&msg, 0x012346),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_block_read_checksum_mismatch() {
        let data = [0xDE, 0xAD];
        let mut payload = vec![0x75, 0x01, 0x00, 0x00, 0x10];
        payload.extend_from_slice(&data);
        payload.extend_from_slice(&(block_sum(&data) ^ 1).to_be_bytes());
        let msg = block_reply(&payload);

        assert!(matches!(
            parse_block_read(&msg, 0x000010),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_kernel_version() {
        let msg = block_reply(&[0x7D, 0x00, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(parse_kernel_version(&msg).unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_write_ack_submode() {
        let msg = block_reply(&[0x76, 0x00]);
        assert!(parse_write_ack(&msg, 0x00).is_ok());
        assert!(parse_write_ack(&msg, 0x80).is_err());
    }

    #[test]
    fn test_parse_upload_grant() {
        assert!(parse_upload_grant(&reply(&[0x74, 0x00])).is_ok());
        assert!(matches!(
            parse_upload_grant(&reply(&[0x74, 0x01])),
            Err(Error::DeviceFailure(_))
        ));
    }

    #[test]
    fn test_recovery_reply_detection() {
        assert!(is_recovery_reply(&reply(&[0xA2])));
        assert!(!is_recovery_reply(&reply(&[0x7C, 0x01])));
    }
}
