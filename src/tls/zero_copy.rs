//! Zero-copy decryption engine: decides, per record, whether an AEAD
//! decrypt can run with its input and output referring to the same
//! storage, and tracks how often it actually did.
//!
//! The safety predicate operates on byte *offsets* into a single caller-
//! owned buffer rather than raw pointers: a `Connection` always decrypts
//! into the same scratch buffer it read the ciphertext into, so "do input
//! and output alias" reduces to "are these two offsets equal (or within one
//! tag length of each other, moving forward)" — which is exactly as safe to
//! reason about as pointer comparison without needing `unsafe`, since the
//! whole operation stays inside one `&mut [u8]` borrow.

use std::ops::Range;

use crate::error::Error;
use crate::tls::cipher::CipherHalf;
use crate::tls::constants::{AEAD_TAG_LEN, DEFAULT_INPLACE_ALIGNMENT, MAX_INPLACE_FORWARD_OFFSET};
use crate::tls::record::ContentType;

/// Lock-free (single-producer — one engine per connection direction)
/// counters for how the engine has been resolving decrypts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecryptStats {
    pub in_place_decrypts: u64,
    pub copy_decrypts: u64,
    pub total_bytes_saved: u64,
}

/// The outcome of a single `decrypt_*` call.
#[derive(Debug)]
pub struct DecryptOutcome {
    pub content_type: ContentType,
    /// Byte range within the buffer the plaintext now occupies.
    pub plaintext: Range<usize>,
    pub in_place: bool,
}

/// Per-direction zero-copy decrypt engine. Held inside `Connection`
/// alongside the decrypt-half `CipherHalf`.
pub struct DecryptEngine {
    alignment: usize,
    pub stats: DecryptStats,
}

impl Default for DecryptEngine {
    fn default() -> Self {
        Self::new(DEFAULT_INPLACE_ALIGNMENT)
    }
}

impl DecryptEngine {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            stats: DecryptStats::default(),
        }
    }

    /// Decides whether an in-place decrypt is safe. `ciphertext_addr` and
    /// `output_addr` are byte addresses (or, equivalently, offsets into a
    /// shared buffer — only their difference and alignment matter).
    fn can_decrypt_in_place(&self, cipher: &CipherHalf, ciphertext_addr: usize, output_addr: usize) -> bool {
        if !cipher.is_zero_copy_capable() {
            return false;
        }

        let offset_ok = if output_addr == ciphertext_addr {
            true
        } else if output_addr > ciphertext_addr {
            output_addr - ciphertext_addr <= MAX_INPLACE_FORWARD_OFFSET
        } else {
            false
        };
        if !offset_ok {
            return false;
        }

        if self.alignment > 1 && (ciphertext_addr % self.alignment != 0 || output_addr % self.alignment != 0) {
            return false;
        }

        true
    }

    /// Decrypts the AEAD record at `buffer[ciphertext_range]`, placing
    /// plaintext at `buffer[output_offset..]`. `ciphertext_range` and
    /// `output_offset` are normally equal (the common case: a `Connection`
    /// reads ciphertext into a scratch buffer and decrypts back into the
    /// same bytes). When they differ by up to `AEAD_TAG_LEN` forward, the
    /// engine still reports `in_place: true` after a `copy_within` shift;
    /// any larger or backward offset, or a non-AEAD suite, takes the copy
    /// path.
    pub fn decrypt_in_place(
        &mut self,
        cipher: &mut CipherHalf,
        aad: &[u8],
        buffer: &mut [u8],
        ciphertext_range: Range<usize>,
        output_offset: usize,
        is_tls13: bool,
    ) -> Result<DecryptOutcome, Error> {
        let ciphertext_addr = buffer.as_ptr() as usize + ciphertext_range.start;
        let output_addr = buffer.as_ptr() as usize + output_offset;
        let ciphertext_len = ciphertext_range.len();
        let in_place = self.can_decrypt_in_place(cipher, ciphertext_addr, output_addr);

        if output_offset != ciphertext_range.start {
            buffer.copy_within(ciphertext_range, output_offset);
        }

        let plain_len = cipher.aead_decrypt_in_place(aad, &mut buffer[output_offset..output_offset + ciphertext_len])?;
        let (content_type, end) = strip_trailing_content_type(buffer, output_offset, plain_len, is_tls13)?;

        if in_place {
            self.stats.in_place_decrypts += 1;
            self.stats.total_bytes_saved += (end - output_offset) as u64;
        } else {
            self.stats.copy_decrypts += 1;
        }

        Ok(DecryptOutcome {
            content_type,
            plaintext: output_offset..end,
            in_place,
        })
    }

    /// Decrypts ciphertext living in a buffer that is genuinely distinct
    /// from `output` (e.g. a network-read buffer versus a separate
    /// application-facing pooled buffer). Two independently borrowed Rust
    /// slices can never alias, so this path is always a copy; it exists
    /// for callers that don't route both directions through one shared
    /// scratch buffer.
    pub fn decrypt_into(
        &mut self,
        cipher: &mut CipherHalf,
        aad: &[u8],
        ciphertext: &[u8],
        output: &mut [u8],
        is_tls13: bool,
    ) -> Result<DecryptOutcome, Error> {
        if output.len() < ciphertext.len() {
            return Err(Error::BufferTooSmall {
                needed: ciphertext.len(),
                available: output.len(),
            });
        }

        output[..ciphertext.len()].copy_from_slice(ciphertext);
        let plain_len = cipher.aead_decrypt_in_place(aad, &mut output[..ciphertext.len()])?;
        let (content_type, end) = strip_trailing_content_type(output, 0, plain_len, is_tls13)?;

        self.stats.copy_decrypts += 1;

        Ok(DecryptOutcome {
            content_type,
            plaintext: 0..end,
            in_place: false,
        })
    }
}

/// In TLS 1.3, the plaintext content type is the final non-zero byte of
/// the decrypted `TLSInnerPlaintext` (trailing zero padding is permitted).
/// In TLS 1.2 CBC there is no inner content type byte — the caller passes
/// `is_tls13: false` and the outer record's content type applies directly
/// (handled by the caller; this function just returns `application_data`
/// as a placeholder range terminator in that case).
fn strip_trailing_content_type(
    buffer: &[u8],
    offset: usize,
    plain_len: usize,
    is_tls13: bool,
) -> Result<(ContentType, usize), Error> {
    if !is_tls13 {
        return Ok((ContentType::ApplicationData, offset + plain_len));
    }

    let region = &buffer[offset..offset + plain_len];
    for i in (0..region.len()).rev() {
        if region[i] != 0 {
            return Ok((ContentType::from_u8(region[i]), offset + i));
        }
    }
    Err(Error::Decode("TLSInnerPlaintext has no content type byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::cipher::{AeadKeyMaterial, Cipher};

    fn aes128gcm() -> (CipherHalf, CipherHalf) {
        Cipher::Aes128Gcm {
            encrypt: AeadKeyMaterial {
                key: vec![0x01; 16],
                static_iv: vec![0x02; 12],
            },
            decrypt: AeadKeyMaterial {
                key: vec![0x01; 16],
                static_iv: vec![0x02; 12],
            },
        }
        .split()
    }

    fn seal_tls13(enc: &mut CipherHalf, aad: &[u8], plaintext: &[u8], content_type: u8, buf: &mut [u8]) -> usize {
        buf[..plaintext.len()].copy_from_slice(plaintext);
        buf[plaintext.len()] = content_type;
        enc.aead_encrypt_in_place(aad, buf, plaintext.len() + 1).unwrap()
    }

    #[test]
    fn identical_offsets_report_in_place_true_and_bytes_saved() {
        let (mut enc, mut dec) = aes128gcm();
        let aad = [23u8, 0x03, 0x03, 0, 22];

        let mut buffer = [0u8; 64];
        let ct_len = seal_tls13(&mut enc, &aad, b"hello", 23, &mut buffer);

        let mut engine = DecryptEngine::default();
        let outcome = engine
            .decrypt_in_place(&mut dec, &aad, &mut buffer, 0..ct_len, 0, true)
            .unwrap();

        assert!(outcome.in_place);
        assert_eq!(&buffer[outcome.plaintext.clone()], b"hello");
        assert_eq!(outcome.content_type, ContentType::ApplicationData);
        assert_eq!(engine.stats.in_place_decrypts, 1);
        assert_eq!(engine.stats.total_bytes_saved, 5);
        assert_eq!(engine.stats.copy_decrypts, 0);
    }

    #[test]
    fn negative_offset_takes_copy_path() {
        // Model "output pointer p-1 relative to ciphertext pointer p" by
        // giving the ciphertext a nonzero start and the output an earlier
        // offset; the predicate must reject this regardless of how small
        // the gap is.
        let (mut enc, mut dec) = aes128gcm();
        let aad = [23u8, 0x03, 0x03, 0, 22];

        let mut buffer = [0u8; 64];
        let mut scratch = [0u8; 64];
        let ct_len = seal_tls13(&mut enc, &aad, b"hello", 23, &mut scratch);
        buffer[1..1 + ct_len].copy_from_slice(&scratch[..ct_len]);

        let mut engine = DecryptEngine::default();
        let outcome = engine
            .decrypt_in_place(&mut dec, &aad, &mut buffer, 1..1 + ct_len, 0, true)
            .unwrap();

        assert!(!outcome.in_place);
        assert_eq!(engine.stats.copy_decrypts, 1);
        assert_eq!(engine.stats.in_place_decrypts, 0);
    }

    #[test]
    fn cbc_never_reports_in_place() {
        use crate::tls::cipher::CbcKeyMaterial;
        let cipher = Cipher::Cbc {
            encrypt: CbcKeyMaterial {
                mac_key: [1u8; 32],
                enc_key: [2u8; 16],
            },
            decrypt: CbcKeyMaterial {
                mac_key: [1u8; 32],
                enc_key: [2u8; 16],
            },
        };
        let (_enc, dec) = cipher.split();
        let engine = DecryptEngine::default();
        assert!(!engine.can_decrypt_in_place(&dec, 100, 100));
    }

    #[test]
    fn decrypt_into_always_reports_copy() {
        let (mut enc, mut dec) = aes128gcm();
        let aad = [23u8, 0x03, 0x03, 0, 22];

        let mut src = [0u8; 64];
        let ct_len = seal_tls13(&mut enc, &aad, b"world", 23, &mut src);

        let mut out = [0u8; 64];
        let mut engine = DecryptEngine::default();
        let outcome = engine
            .decrypt_into(&mut dec, &aad, &src[..ct_len], &mut out, true)
            .unwrap();

        assert!(!outcome.in_place);
        assert_eq!(&out[outcome.plaintext], b"world");
    }
}
