//! Non-blocking sibling of [`crate::tls::Connection`]: the caller supplies
//! both the input and output buffers and owns all I/O itself. Useful inside
//! a reactor that already has raw bytes in hand (e.g. from a single
//! `recv()` call spanning several records) and doesn't want the record
//! plane to own a socket.

use crate::error::Error;
use crate::tls::cipher::Cipher;
use crate::tls::constants::RECORD_HEADER_LEN;
use crate::tls::record::{ContentType, RecordHeader};
use crate::tls::record_stream::RecordPlane;

/// Result of [`Transcoder::encrypt`].
pub struct EncryptResult {
    /// Bytes written to the output buffer (framed ciphertext).
    pub ciphertext: usize,
    /// Bytes consumed from the input buffer (always all of it on success).
    pub consumed: usize,
}

/// Result of [`Transcoder::decrypt`].
pub struct DecryptResult {
    /// Bytes of plaintext written to the output buffer.
    pub plaintext: usize,
    /// Bytes consumed from the input buffer (one full framed record).
    pub consumed: usize,
    pub content_type: ContentType,
}

/// Drives the same [`RecordPlane`] as `Connection`, but never touches a
/// transport: every call takes explicit input/output slices.
pub struct Transcoder {
    plane: RecordPlane,
    max_fragment_len: usize,
}

impl Transcoder {
    pub fn new(cipher: Cipher, is_tls13: bool, max_fragment_len: usize, inplace_alignment: usize) -> Self {
        let (encrypt_half, decrypt_half) = cipher.split();
        Self {
            plane: RecordPlane::new(encrypt_half, decrypt_half, is_tls13, inplace_alignment),
            max_fragment_len,
        }
    }

    /// Encrypts all of `input` as one or more framed records into `output`.
    pub fn encrypt(&self, input: &[u8], output: &mut [u8]) -> Result<EncryptResult, Error> {
        let n = self.plane.encrypt(input, output, self.max_fragment_len)?;
        Ok(EncryptResult {
            ciphertext: n,
            consumed: input.len(),
        })
    }

    /// Decrypts exactly one framed record from the front of `input`. If
    /// `input` does not yet hold a complete record, returns
    /// `Error::BufferTooSmall` sized to the still-missing byte count so the
    /// caller knows how much more to read before calling again.
    pub fn decrypt(&self, input: &[u8], output: &mut [u8]) -> Result<DecryptResult, Error> {
        if input.len() < RECORD_HEADER_LEN {
            return Err(Error::BufferTooSmall {
                needed: RECORD_HEADER_LEN,
                available: input.len(),
            });
        }

        let mut header_buf = [0u8; RECORD_HEADER_LEN];
        header_buf.copy_from_slice(&input[..RECORD_HEADER_LEN]);
        let header = RecordHeader::parse(&header_buf)?;

        let record_len = RECORD_HEADER_LEN + header.length as usize;
        if input.len() < record_len {
            return Err(Error::BufferTooSmall {
                needed: record_len,
                available: input.len(),
            });
        }

        if output.len() < header.length as usize {
            return Err(Error::BufferTooSmall {
                needed: header.length as usize,
                available: output.len(),
            });
        }

        let payload_len = header.length as usize;
        output[..payload_len].copy_from_slice(&input[RECORD_HEADER_LEN..record_len]);

        let outcome = self.plane.decrypt_record(&header, &mut output[..payload_len])?;

        Ok(DecryptResult {
            plaintext: outcome.plaintext_len,
            consumed: record_len,
            content_type: outcome.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::cipher::AeadKeyMaterial;

    fn aes128gcm() -> Cipher {
        Cipher::Aes128Gcm {
            encrypt: AeadKeyMaterial {
                key: vec![0x09; 16],
                static_iv: vec![0x0a; 12],
            },
            decrypt: AeadKeyMaterial {
                key: vec![0x09; 16],
                static_iv: vec![0x0a; 12],
            },
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_without_any_io() {
        let transcoder = Transcoder::new(aes128gcm(), true, 16_384, 16);
        let mut wire = [0u8; 256];
        let enc = transcoder.encrypt(b"transcoded", &mut wire).unwrap();
        assert_eq!(enc.consumed, b"transcoded".len());

        let mut plaintext = [0u8; 256];
        let dec = transcoder.decrypt(&wire[..enc.ciphertext], &mut plaintext).unwrap();
        assert_eq!(dec.consumed, enc.ciphertext);
        assert_eq!(&plaintext[..dec.plaintext], b"transcoded");
        assert_eq!(dec.content_type, ContentType::ApplicationData);
    }

    #[test]
    fn decrypt_on_a_partial_record_reports_how_many_more_bytes_are_needed() {
        let transcoder = Transcoder::new(aes128gcm(), true, 16_384, 16);
        let mut wire = [0u8; 256];
        let enc = transcoder.encrypt(b"partial", &mut wire).unwrap();

        let mut plaintext = [0u8; 256];
        let err = transcoder.decrypt(&wire[..enc.ciphertext - 1], &mut plaintext).unwrap_err();
        match err {
            Error::BufferTooSmall { needed, .. } => assert_eq!(needed, enc.ciphertext),
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
    }
}
