//! VPW frame value type.
//!
//! One SAE J1850 VPW frame is a 3-byte header (priority, destination node,
//! source node) followed by a variable-length payload and one trailing
//! checksum byte, the low 8 bits of the arithmetic sum of everything before
//! it.
//!
//! ```text
//! +----------+-------------+--------+---------------+----------+
//! | Priority | Destination | Source |    Payload    | Checksum |
//! +----------+-------------+--------+---------------+----------+
//! |    1     |      1      |   1    |   variable    |    1     |
//! +----------+-------------+--------+---------------+----------+
//! ```
//!
//! Text-command adapters carry frames as ASCII hex (two characters per
//! byte, optional interior spaces from adapter echo); pass-through adapters
//! hand over the raw bytes. [`VpwMessage`] is the decoded, checksum-verified
//! form shared by both; it is immutable and compared by value.

use crate::error::{Error, Result};

/// Header length: priority + destination + source.
pub const HEADER_LEN: usize = 3;

/// Low 8 bits of the arithmetic sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// One VPW frame, held without its trailing checksum byte.
///
/// The checksum is appended on wire encode and verified then stripped on
/// wire decode, so it can never disagree with the content in between.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VpwMessage {
    bytes: Vec<u8>,
}

impl VpwMessage {
    /// Build a frame from header fields and payload.
    pub fn new(priority: u8, destination: u8, source: u8, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.push(priority);
        bytes.push(destination);
        bytes.push(source);
        bytes.extend_from_slice(payload);
        Self { bytes }
    }

    /// Build a frame from raw header+payload bytes (no checksum).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::UnexpectedResponse(format!(
                "frame shorter than header: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Decode a frame from its on-wire form: header + payload + checksum.
    ///
    /// The trailing byte must equal the truncated sum of everything before
    /// it; a disagreement is [`Error::ChecksumMismatch`].
    pub fn from_wire(wire: &[u8]) -> Result<Self> {
        if wire.len() < HEADER_LEN + 1 {
            return Err(Error::UnexpectedResponse(format!(
                "wire frame too short: {} bytes",
                wire.len()
            )));
        }
        let (content, trailer) = wire.split_at(wire.len() - 1);
        let expected = trailer[0];
        let actual = checksum(content);
        if expected != actual {
            return Err(Error::ChecksumMismatch {
                expected: u16::from(expected),
                actual: u16::from(actual),
            });
        }
        Ok(Self {
            bytes: content.to_vec(),
        })
    }

    /// Decode a frame from ASCII hex as received from a text adapter.
    ///
    /// Interior spaces (adapter echo artifacts) are ignored. The trailing
    /// checksum byte is verified and stripped.
    pub fn from_hex(hex_text: &str) -> Result<Self> {
        let compact: String = hex_text
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let wire = hex::decode(&compact)
            .map_err(|e| Error::UnexpectedResponse(format!("not hex: {compact:?} ({e})")))?;
        Self::from_wire(&wire)
    }

    /// Priority/message-type byte.
    pub fn priority(&self) -> u8 {
        self.bytes[0]
    }

    /// Destination node id.
    pub fn destination(&self) -> u8 {
        self.bytes[1]
    }

    /// Source node id.
    pub fn source(&self) -> u8 {
        self.bytes[2]
    }

    /// The 3-byte header.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        [self.bytes[0], self.bytes[1], self.bytes[2]]
    }

    /// Payload bytes after the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// First payload byte, the service mode.
    pub fn mode(&self) -> Option<u8> {
        self.payload().first().copied()
    }

    /// Header + payload, without checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The checksum byte this frame carries on the wire.
    pub fn wire_checksum(&self) -> u8 {
        checksum(&self.bytes)
    }

    /// Encode to the on-wire form: header + payload + checksum.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.bytes.len() + 1);
        wire.extend_from_slice(&self.bytes);
        wire.push(self.wire_checksum());
        wire
    }

    /// Canonical ASCII-hex form: uppercase, no separators, checksum included.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_wire())
    }

    /// ASCII hex of the payload only, uppercase, no separators.
    ///
    /// Text adapters take the header separately (set-header command) and
    /// append the bus checksum themselves, so only the payload is typed.
    pub fn payload_hex(&self) -> String {
        hex::encode_upper(self.payload())
    }
}

impl std::fmt::Display for VpwMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_truncated_sum() {
        assert_eq!(checksum(&[0x6C, 0x10, 0xF0, 0x01]), 0x6D);
        assert_eq!(checksum(&[0xFF, 0xFF]), 0xFE);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn test_wire_round_trip() {
        let msg = VpwMessage::new(0x6C, 0x10, 0xF0, &[0x3C, 0x0A]);
        let wire = msg.to_wire();
        assert_eq!(*wire.last().unwrap(), checksum(msg.as_bytes()));

        let decoded = VpwMessage::from_wire(&wire).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.to_wire(), wire);
    }

    #[test]
    fn test_hex_round_trip() {
        let msg = VpwMessage::new(0x6C, 0x10, 0xF0, &[0x27, 0x01]);
        let decoded = VpwMessage::from_hex(&msg.to_hex()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_from_hex_tolerates_interior_spaces() {
        // 6C 10 F0 01, checksum 6D
        let msg = VpwMessage::from_hex("6C 10 F0 01 6D").unwrap();
        assert_eq!(msg.header(), [0x6C, 0x10, 0xF0]);
        assert_eq!(msg.payload(), &[0x01]);
    }

    #[test]
    fn test_from_hex_rejects_bad_checksum() {
        let err = VpwMessage::from_hex("6C10F00155").unwrap_err();
        assert!(matches!(
            err,
            Error::ChecksumMismatch {
                expected: 0x55,
                actual: 0x6D
            }
        ));
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        assert!(matches!(
            VpwMessage::from_hex("NO DATA"),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_too_short_frames_rejected() {
        assert!(VpwMessage::from_wire(&[0x6C, 0x10]).is_err());
        assert!(VpwMessage::from_bytes(vec![0x6C]).is_err());
    }

    #[test]
    fn test_header_accessors() {
        let msg = VpwMessage::new(0x6D, 0xF0, 0x10, &[0x75, 0x01]);
        assert_eq!(msg.priority(), 0x6D);
        assert_eq!(msg.destination(), 0xF0);
        assert_eq!(msg.source(), 0x10);
        assert_eq!(msg.mode(), Some(0x75));
    }

    #[test]
    fn test_payload_hex_excludes_header_and_checksum() {
        let msg = VpwMessage::new(0x6C, 0x10, 0xF0, &[0x3C, 0x0A]);
        assert_eq!(msg.payload_hex(), "3C0A");
    }

    #[test]
    fn test_display_spaced_hex() {
        let msg = VpwMessage::new(0x6C, 0x10, 0xF0, &[0x20]);
        assert_eq!(msg.to_string(), "6C 10 F0 20");
    }
}
