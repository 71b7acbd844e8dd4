//! TLS 1.2 CBC-HMAC ("GenericBlockCipher", RFC 5246 §6.2.3.2).
//!
//! CBC has no AEAD shape to abstract over, so this is hand-written rather
//! than going through `AeadDirection<C>`: HMAC-then-encrypt on send,
//! decrypt-then-verify-HMAC (constant time, via `subtle`) on receive.
//! Explicit per-record IVs mean this variant is never eligible for the
//! zero-copy decrypt path.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::tls::cipher_suite::SequenceCounter;
use crate::tls::record::ContentType;

type CbcEnc = cbc::Encryptor<Aes128>;
type CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

const BLOCK_SIZE: usize = 16;
const MAC_LEN: usize = 32;

/// One direction's worth of CBC-HMAC key material and sequence state.
pub(crate) struct CbcDirection {
    mac_key: [u8; 32],
    enc_key: [u8; 16],
    seq: SequenceCounter,
}

impl CbcDirection {
    pub fn new(mac_key: [u8; 32], enc_key: [u8; 16]) -> Self {
        Self {
            mac_key,
            enc_key,
            seq: SequenceCounter::new(),
        }
    }

    fn mac(&self, seq: u64, content_type: ContentType, legacy_version: u16, plaintext: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts any key length");
        mac.update(&seq.to_be_bytes());
        mac.update(&[content_type.to_u8()]);
        mac.update(&legacy_version.to_be_bytes());
        mac.update(&(plaintext.len() as u16).to_be_bytes());
        mac.update(plaintext);
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    /// Encrypts `plaintext` into `out` as `explicit_iv || ciphertext`, where
    /// `ciphertext` covers `plaintext || mac || padding`. Returns the total
    /// number of bytes written to `out`. `out` must have room for
    /// `BLOCK_SIZE (IV) + plaintext.len() + MAC_LEN + BLOCK_SIZE (max pad)`.
    pub fn encrypt(
        &mut self,
        content_type: ContentType,
        legacy_version: u16,
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let seq = self.seq.peek()?;

        let needed = BLOCK_SIZE + plaintext.len() + MAC_LEN + BLOCK_SIZE;
        if out.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);
        out[..BLOCK_SIZE].copy_from_slice(&iv);

        let mac = self.mac(seq, content_type, legacy_version, plaintext);

        let msg_len = plaintext.len() + MAC_LEN;
        let body = &mut out[BLOCK_SIZE..BLOCK_SIZE + msg_len + BLOCK_SIZE];
        body[..plaintext.len()].copy_from_slice(plaintext);
        body[plaintext.len()..msg_len].copy_from_slice(&mac);

        let encryptor = CbcEnc::new(&self.enc_key.into(), &iv.into());
        let ciphertext = encryptor
            .encrypt_padded_mut::<Pkcs7>(body, msg_len)
            .map_err(|_| Error::Decode("CBC padding failed"))?;
        let ciphertext_len = ciphertext.len();

        self.seq.advance();
        Ok(BLOCK_SIZE + ciphertext_len)
    }

    /// Decrypts `record` (explicit IV followed by ciphertext) in place
    /// inside `buffer`, returning the plaintext length. `buffer` is
    /// consumed and overwritten; the caller is expected to have already
    /// copied the wire record into it.
    pub fn decrypt(
        &mut self,
        content_type: ContentType,
        legacy_version: u16,
        buffer: &mut [u8],
    ) -> Result<usize, Error> {
        let seq = self.seq.peek()?;

        if buffer.len() < BLOCK_SIZE + MAC_LEN + BLOCK_SIZE {
            return Err(Error::Decode("CBC record too short"));
        }
        if (buffer.len() - BLOCK_SIZE) % BLOCK_SIZE != 0 {
            return Err(Error::Decode("CBC ciphertext not block-aligned"));
        }

        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&buffer[..BLOCK_SIZE]);
        let ciphertext_len = buffer.len() - BLOCK_SIZE;

        let decryptor = CbcDec::new(&self.enc_key.into(), &iv.into());
        let plaintext = decryptor
            .decrypt_padded_mut::<Pkcs7>(&mut buffer[BLOCK_SIZE..BLOCK_SIZE + ciphertext_len])
            .map_err(|_| Error::BadRecordMac)?;

        if plaintext.len() < MAC_LEN {
            return Err(Error::BadRecordMac);
        }
        let data_len = plaintext.len() - MAC_LEN;
        let (data, received_mac) = plaintext.split_at(data_len);

        let expected_mac = self.mac(seq, content_type, legacy_version, data);
        if expected_mac.ct_eq(received_mac).unwrap_u8() != 1 {
            return Err(Error::BadRecordMac);
        }

        buffer.copy_within(BLOCK_SIZE..BLOCK_SIZE + data_len, 0);
        self.seq.advance();
        Ok(data_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_recovers_plaintext() {
        let mut enc = CbcDirection::new([1u8; 32], [2u8; 16]);
        let mut dec = CbcDirection::new([1u8; 32], [2u8; 16]);

        let plaintext = b"hello cbc world";
        let mut out = [0u8; 256];
        let n = enc
            .encrypt(ContentType::ApplicationData, 0x0303, plaintext, &mut out)
            .unwrap();

        let mut buffer = out[..n].to_vec();
        let plain_len = dec
            .decrypt(ContentType::ApplicationData, 0x0303, &mut buffer)
            .unwrap();

        assert_eq!(&buffer[..plain_len], plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_mac_check() {
        let mut enc = CbcDirection::new([3u8; 32], [4u8; 16]);
        let mut dec = CbcDirection::new([3u8; 32], [4u8; 16]);

        let mut out = [0u8; 256];
        let n = enc
            .encrypt(ContentType::ApplicationData, 0x0303, b"data", &mut out)
            .unwrap();

        let mut buffer = out[..n].to_vec();
        let last = buffer.len() - 1;
        buffer[last] ^= 0xFF;

        assert!(matches!(
            dec.decrypt(ContentType::ApplicationData, 0x0303, &mut buffer),
            Err(Error::BadRecordMac)
        ));
    }
}
