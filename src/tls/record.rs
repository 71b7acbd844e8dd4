//! `TLSPlaintext`/`TLSCiphertext` record framing (RFC 5246 §6.2, RFC 8446 §5).
//!
//! ```text
//! struct {
//!     ContentType type;
//!     ProtocolVersion legacy_record_version;
//!     uint16 length;
//!     opaque fragment[length];
//! } TLSPlaintext;
//! ```

use std::io::Read;

use crate::error::Error;
use crate::tls::constants::*;

/// `ContentType` (RFC 8446 §5.1). The handshake subsystem owns the full
/// set of message types carried *inside* a `handshake` record; this enum is
/// just the outer record-layer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    Invalid = 0,
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Invalid,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// The 5-byte record header, parsed and validated but not yet carrying its
/// payload (the payload lives in the caller's scratch buffer so that a
/// record read never needs its own allocation).
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub legacy_version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(buf: &[u8; RECORD_HEADER_LEN]) -> Result<Self, Error> {
        let content_type = ContentType::from_u8(buf[0]);
        let legacy_version = u16::from_be_bytes([buf[1], buf[2]]);
        let length = u16::from_be_bytes([buf[3], buf[4]]);

        if legacy_version != TLS_1_0_VERSION && legacy_version != TLS_1_2_VERSION {
            return Err(Error::Decode("unexpected legacy_record_version"));
        }
        if length as usize > MAX_CIPHERTEXT_RECORD_LEN {
            return Err(Error::Decode("record length exceeds MAX_CIPHERTEXT_RECORD_LEN"));
        }

        Ok(Self {
            content_type,
            legacy_version,
            length,
        })
    }

    /// Writes the header in place; `length` must already reflect the final
    /// ciphertext length (it is patched in after encryption on the send
    /// path).
    pub fn write(&self, buf: &mut [u8; RECORD_HEADER_LEN]) {
        buf[0] = self.content_type.to_u8();
        buf[1..3].copy_from_slice(&self.legacy_version.to_be_bytes());
        buf[3..5].copy_from_slice(&self.length.to_be_bytes());
    }
}

/// Reads exactly one framed record from `stream` into `scratch`, returning
/// the parsed header and the number of payload bytes written to
/// `scratch[..n]`. `scratch` must be at least `MAX_CIPHERTEXT_RECORD_LEN`
/// bytes; this is the only buffer either side of the record boundary needs
/// to allocate once and reuse for the life of the connection.
///
/// Short reads are handled by `Read::read_exact`'s internal retry loop; an
/// EOF in the middle of a record (as opposed to between records) is
/// reported as the underlying `UnexpectedEof` io error.
pub fn read_record_from<S: Read>(
    stream: &mut S,
    scratch: &mut [u8],
) -> Result<(RecordHeader, usize), Error> {
    assert!(
        scratch.len() >= MAX_CIPHERTEXT_RECORD_LEN,
        "scratch buffer must be at least MAX_CIPHERTEXT_RECORD_LEN bytes"
    );

    let mut header_buf = [0u8; RECORD_HEADER_LEN];
    stream.read_exact(&mut header_buf)?;
    let header = RecordHeader::parse(&header_buf)?;

    let len = header.length as usize;
    stream.read_exact(&mut scratch[..len])?;

    Ok((header, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn content_type_round_trips_known_values() {
        for &(byte, expected) in &[
            (20u8, ContentType::ChangeCipherSpec),
            (21, ContentType::Alert),
            (22, ContentType::Handshake),
            (23, ContentType::ApplicationData),
        ] {
            assert_eq!(ContentType::from_u8(byte), expected);
            assert_eq!(expected.to_u8(), byte);
        }
    }

    #[test]
    fn header_rejects_bad_legacy_version() {
        let buf = [23u8, 0x02, 0x00, 0x00, 0x05];
        assert!(matches!(RecordHeader::parse(&buf), Err(Error::Decode(_))));
    }

    #[test]
    fn header_rejects_oversized_length() {
        let len = (MAX_CIPHERTEXT_RECORD_LEN + 1) as u16;
        let len_bytes = len.to_be_bytes();
        let buf = [23u8, 0x03, 0x03, len_bytes[0], len_bytes[1]];
        assert!(matches!(RecordHeader::parse(&buf), Err(Error::Decode(_))));
    }

    #[test]
    fn read_record_from_reads_header_then_payload() {
        let mut wire = vec![23u8, 0x03, 0x03, 0x00, 0x05];
        wire.extend_from_slice(b"hello");
        let mut cursor = Cursor::new(wire);

        let mut scratch = [0u8; MAX_CIPHERTEXT_RECORD_LEN];
        let (header, n) = read_record_from(&mut cursor, &mut scratch).unwrap();

        assert_eq!(header.content_type, ContentType::ApplicationData);
        assert_eq!(header.legacy_version, TLS_1_2_VERSION);
        assert_eq!(n, 5);
        assert_eq!(&scratch[..n], b"hello");
    }

    #[test]
    fn read_record_from_propagates_truncated_payload_as_io_error() {
        let wire = vec![23u8, 0x03, 0x03, 0x00, 0x05, b'h', b'e'];
        let mut cursor = Cursor::new(wire);
        let mut scratch = [0u8; MAX_CIPHERTEXT_RECORD_LEN];
        assert!(matches!(
            read_record_from(&mut cursor, &mut scratch),
            Err(Error::Io(_))
        ));
    }
}
