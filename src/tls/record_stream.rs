//! The connection data plane: record fragmentation/reassembly driven
//! through a negotiated [`Cipher`], independent of any particular
//! transport. [`crate::tls::application_stream`] wraps this in a blocking
//! `Read`/`Write` connection; [`crate::tls::transcoder`] wraps it in a
//! non-blocking buffer-in/buffer-out form. Both sit on top of the same
//! `RecordPlane`.
//!
//! This crate pairs each AEAD suite with TLS 1.3 framing (implicit nonce
//! derived from the static IV) and the CBC-HMAC suite with TLS 1.2 framing
//! (explicit per-record IV, outer content type carries the real message
//! type). A `RecordPlane` is constructed for one of the two pairings and
//! does not renegotiate mid-connection.

use parking_lot::Mutex;

use crate::error::Error;
use crate::tls::cipher::CipherHalf;
use crate::tls::constants::{MAX_CIPHERTEXT_RECORD_LEN, RECORD_HEADER_LEN, TLS_1_2_VERSION};
use crate::tls::record::{ContentType, RecordHeader};
use crate::tls::zero_copy::DecryptEngine;

/// Data-plane connection states. The handshake subsystem (out of scope
/// here) is the one that decides whether a `Failed` connection should
/// attempt a `close_notify` send; this plane only tracks the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    EncryptInProgress,
    DecryptInProgress,
    Closed,
    Failed,
}

/// Outcome of a single `decrypt_record` call.
pub struct DecryptedRecord {
    pub content_type: ContentType,
    pub plaintext_len: usize,
    pub in_place: bool,
}

/// Drives the encrypt and decrypt pipelines for one connection direction
/// pair. Encrypt and decrypt each hold their own lock, so the two can run
/// concurrently from different threads; they share no mutable state beyond
/// their independent sequence counters (each already owned by its own
/// `CipherHalf`).
pub struct RecordPlane {
    encrypt_half: Mutex<CipherHalf>,
    decrypt_half: Mutex<(CipherHalf, DecryptEngine)>,
    state: Mutex<ConnectionState>,
    is_tls13: bool,
}

impl RecordPlane {
    pub fn new(encrypt_half: CipherHalf, decrypt_half: CipherHalf, is_tls13: bool, inplace_alignment: usize) -> Self {
        debug_assert_eq!(
            encrypt_half.is_zero_copy_capable(),
            is_tls13,
            "this crate pairs AEAD suites with TLS 1.3 and CBC-HMAC with TLS 1.2"
        );
        Self {
            encrypt_half: Mutex::new(encrypt_half),
            decrypt_half: Mutex::new((decrypt_half, DecryptEngine::new(inplace_alignment))),
            state: Mutex::new(ConnectionState::Idle),
            is_tls13,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn enter(&self, entering: ConnectionState) -> Result<(), Error> {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Closed => return Err(Error::CloseNotify),
            ConnectionState::Failed => return Err(Error::Unexpected(0)),
            _ => {}
        }
        *state = entering;
        Ok(())
    }

    fn leave(&self, outcome: &Result<impl Sized, Error>) {
        let mut state = self.state.lock();
        *state = match outcome {
            Ok(_) => ConnectionState::Idle,
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, "record plane entering Failed state");
                ConnectionState::Failed
            }
            Err(_) => ConnectionState::Idle,
        };
    }

    pub fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    /// Fragments `cleartext` into records of at most `max_fragment_len`
    /// bytes and encrypts each into `sink`, returning the total number of
    /// bytes written. `sink` must have room for the worst case: every
    /// fragment grows by `RECORD_HEADER_LEN` plus at most 1 (TLS 1.3 inner
    /// content-type byte) plus the cipher's expansion (16 bytes for AEAD,
    /// up to `BLOCK_SIZE * 2 + MAC_LEN` for CBC).
    pub fn encrypt(&self, cleartext: &[u8], sink: &mut [u8], max_fragment_len: usize) -> Result<usize, Error> {
        self.enter(ConnectionState::EncryptInProgress)?;
        let result = self.encrypt_inner(cleartext, sink, max_fragment_len);
        self.leave(&result);
        result
    }

    fn encrypt_inner(&self, cleartext: &[u8], sink: &mut [u8], max_fragment_len: usize) -> Result<usize, Error> {
        let mut cipher = self.encrypt_half.lock();
        let mut pos = 0;

        for fragment in fragments(cleartext, max_fragment_len) {
            #[cfg(feature = "trace_records")]
            tracing::trace!(fragment_len = fragment.len(), "encrypting record fragment");
            pos += self.encrypt_fragment(&mut cipher, fragment, &mut sink[pos..])?;
        }

        Ok(pos)
    }

    fn encrypt_fragment(&self, cipher: &mut CipherHalf, fragment: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        if self.is_tls13 {
            let inner_len = fragment.len() + 1;
            let ciphertext_len = inner_len + 16;
            let total = RECORD_HEADER_LEN + ciphertext_len;
            if out.len() < total {
                return Err(Error::BufferTooSmall {
                    needed: total,
                    available: out.len(),
                });
            }

            let header = RecordHeader {
                content_type: ContentType::ApplicationData,
                legacy_version: TLS_1_2_VERSION,
                length: ciphertext_len as u16,
            };
            let mut header_buf = [0u8; RECORD_HEADER_LEN];
            header.write(&mut header_buf);
            out[..RECORD_HEADER_LEN].copy_from_slice(&header_buf);

            let body = &mut out[RECORD_HEADER_LEN..RECORD_HEADER_LEN + ciphertext_len];
            body[..fragment.len()].copy_from_slice(fragment);
            body[fragment.len()] = ContentType::ApplicationData.to_u8();
            cipher.aead_encrypt_in_place(&header_buf, body, inner_len)?;

            Ok(total)
        } else {
            let n = cipher.cbc_encrypt(
                ContentType::ApplicationData,
                TLS_1_2_VERSION,
                fragment,
                &mut out[RECORD_HEADER_LEN..],
            )?;

            let header = RecordHeader {
                content_type: ContentType::ApplicationData,
                legacy_version: TLS_1_2_VERSION,
                length: n as u16,
            };
            let mut header_buf = [0u8; RECORD_HEADER_LEN];
            header.write(&mut header_buf);
            out[..RECORD_HEADER_LEN].copy_from_slice(&header_buf);

            Ok(RECORD_HEADER_LEN + n)
        }
    }

    /// Decrypts a single already-framed record (`header` plus its payload
    /// living in `payload`, which must equal `header.length` bytes) in
    /// place, returning the record's real content type and how much of
    /// `payload` now holds plaintext.
    pub fn decrypt_record(&self, header: &RecordHeader, payload: &mut [u8]) -> Result<DecryptedRecord, Error> {
        self.enter(ConnectionState::DecryptInProgress)?;
        let result = self.decrypt_record_inner(header, payload);
        self.leave(&result);
        result
    }

    fn decrypt_record_inner(&self, header: &RecordHeader, payload: &mut [u8]) -> Result<DecryptedRecord, Error> {
        #[cfg(feature = "trace_records")]
        tracing::trace!(record_len = header.length, "decrypting record");

        if header.length as usize != payload.len() {
            return Err(Error::Decode("record payload length does not match header"));
        }
        if payload.len() > MAX_CIPHERTEXT_RECORD_LEN {
            return Err(Error::Decode("record length exceeds MAX_CIPHERTEXT_RECORD_LEN"));
        }

        let mut guard = self.decrypt_half.lock();
        let (cipher, engine) = &mut *guard;

        if self.is_tls13 {
            let mut header_buf = [0u8; RECORD_HEADER_LEN];
            header.write(&mut header_buf);
            let outcome = engine.decrypt_in_place(cipher, &header_buf, payload, 0..payload.len(), 0, true)?;
            Ok(DecryptedRecord {
                content_type: outcome.content_type,
                plaintext_len: outcome.plaintext.len(),
                in_place: outcome.in_place,
            })
        } else {
            let plain_len = cipher.cbc_decrypt(header.content_type, header.legacy_version, payload)?;
            Ok(DecryptedRecord {
                content_type: header.content_type,
                plaintext_len: plain_len,
                in_place: false,
            })
        }
    }
}

/// Splits `data` into chunks of at most `max_len` bytes, in order. An empty
/// input yields a single empty fragment so that `encrypt(&[], ...)` still
/// produces one (empty) record, matching how a caller flushing zero bytes
/// of application data still expects a well-formed record on the wire.
fn fragments(data: &[u8], max_len: usize) -> impl Iterator<Item = &[u8]> {
    struct Fragments<'a> {
        remaining: &'a [u8],
        max_len: usize,
        done: bool,
    }

    impl<'a> Iterator for Fragments<'a> {
        type Item = &'a [u8];

        fn next(&mut self) -> Option<&'a [u8]> {
            if self.done {
                return None;
            }
            if self.remaining.is_empty() {
                self.done = true;
                return Some(self.remaining);
            }
            let take = self.remaining.len().min(self.max_len);
            let (chunk, rest) = self.remaining.split_at(take);
            self.remaining = rest;
            if rest.is_empty() {
                self.done = true;
            }
            Some(chunk)
        }
    }

    Fragments {
        remaining: data,
        max_len,
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::cipher::{AeadKeyMaterial, Cipher};

    fn aes128gcm_plane() -> RecordPlane {
        let cipher = Cipher::Aes128Gcm {
            encrypt: AeadKeyMaterial {
                key: vec![0x01; 16],
                static_iv: vec![0x02; 12],
            },
            decrypt: AeadKeyMaterial {
                key: vec![0x01; 16],
                static_iv: vec![0x02; 12],
            },
        };
        let (enc, dec) = cipher.split();
        RecordPlane::new(enc, dec, true, 16)
    }

    #[test]
    fn fragments_splits_at_max_len_boundaries() {
        let data = vec![7u8; 20_000];
        let chunks: Vec<_> = fragments(&data, 16_384).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 16_384);
        assert_eq!(chunks[1].len(), 20_000 - 16_384);
    }

    #[test]
    fn fragments_of_empty_input_yields_one_empty_fragment() {
        let chunks: Vec<_> = fragments(&[], 16_384).collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn scenario_s1_round_trips_hello_with_expected_record_shape() {
        let plane = aes128gcm_plane();
        let mut sink = [0u8; 256];
        let n = plane.encrypt(b"hello", &mut sink, 16_384).unwrap();
        assert_eq!(n, RECORD_HEADER_LEN + 22);

        let header = RecordHeader::parse(sink[..5].try_into().unwrap()).unwrap();
        assert_eq!(header.length, 22);

        let mut payload = sink[5..5 + 22].to_vec();
        let outcome = plane.decrypt_record(&header, &mut payload).unwrap();
        assert_eq!(outcome.content_type, ContentType::ApplicationData);
        assert_eq!(outcome.plaintext_len, 5);
        assert_eq!(&payload[..5], b"hello");
    }

    #[test]
    fn scenario_s2_twenty_thousand_bytes_splits_into_two_records() {
        let plane = aes128gcm_plane();
        let mut sink = vec![0u8; 64 * 1024];
        let cleartext = vec![9u8; 20_000];
        let n = plane.encrypt(&cleartext, &mut sink, 16_384).unwrap();

        let first_header = RecordHeader::parse(sink[..5].try_into().unwrap()).unwrap();
        assert_eq!(first_header.length as usize, 16_384 + 1 + 16);

        let second_start = 5 + first_header.length as usize;
        let second_header = RecordHeader::parse(sink[second_start..second_start + 5].try_into().unwrap()).unwrap();
        assert_eq!(second_header.length as usize, (20_000 - 16_384) + 1 + 16);

        assert_eq!(n, second_start + 5 + second_header.length as usize);
    }

    #[test]
    fn failed_cipher_error_transitions_connection_to_failed() {
        let plane = aes128gcm_plane();
        let header = RecordHeader {
            content_type: ContentType::ApplicationData,
            legacy_version: TLS_1_2_VERSION,
            length: 10,
        };
        let mut garbage = vec![0u8; 10];
        assert!(plane.decrypt_record(&header, &mut garbage).is_err());
        assert_eq!(plane.state(), ConnectionState::Failed);
    }

    #[test]
    fn closed_connection_rejects_further_encrypts() {
        let plane = aes128gcm_plane();
        plane.mark_closed();
        let mut sink = [0u8; 64];
        assert!(matches!(plane.encrypt(b"x", &mut sink, 16_384), Err(Error::CloseNotify)));
    }
}
