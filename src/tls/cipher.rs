//! The negotiated cipher for a connection: a tagged sum type over every
//! suite this crate supports, dispatched with a single `match` at every
//! encrypt/decrypt call — never a `Box<dyn Trait>` per record.
//!
//! A `Cipher` is produced by the (out-of-scope) handshake subsystem once
//! negotiation completes and handed to [`crate::tls::Connection`] /
//! [`crate::tls::Transcoder`]. Internally, `Cipher::split` separates it
//! into an encrypt half and a decrypt half so the two directions can be
//! driven from different threads under independent locks.

use aead::KeyInit;
use generic_array::GenericArray;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;
use crate::tls::cipher_suite::AeadDirection;
use crate::tls::cipher_tls12::CbcDirection;
use crate::tls::record::ContentType;

type Aes128GcmImpl = aes_gcm::Aes128Gcm;
type Aes256GcmImpl = aes_gcm::Aes256Gcm;
type ChaCha20Poly1305Impl = chacha20poly1305::ChaCha20Poly1305;
type Aegis128LImpl = aegis::aegis128l::Aegis128L;

/// Key material for one direction of a negotiated AEAD suite, as handed
/// over by the handshake subsystem: a raw key and the static IV/salt used
/// to derive per-record nonces (RFC 8446 §5.3). Sequence counters always
/// start at zero for a fresh keying epoch. Zeroized on drop so a dropped
/// `Connection` doesn't leave traffic keys sitting in freed heap memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AeadKeyMaterial {
    pub key: Vec<u8>,
    pub static_iv: Vec<u8>,
}

/// Key material for one direction of a negotiated CBC-HMAC suite.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CbcKeyMaterial {
    pub mac_key: [u8; 32],
    pub enc_key: [u8; 16],
}

/// The negotiated cipher, covering both directions. Constructed once by
/// the handshake subsystem from derived traffic secrets; the data plane
/// never re-derives key material itself.
pub enum Cipher {
    Aes128Gcm {
        encrypt: AeadKeyMaterial,
        decrypt: AeadKeyMaterial,
    },
    Aes256Gcm {
        encrypt: AeadKeyMaterial,
        decrypt: AeadKeyMaterial,
    },
    Chacha20Poly1305 {
        encrypt: AeadKeyMaterial,
        decrypt: AeadKeyMaterial,
    },
    Aegis128L {
        encrypt: AeadKeyMaterial,
        decrypt: AeadKeyMaterial,
    },
    Cbc {
        encrypt: CbcKeyMaterial,
        decrypt: CbcKeyMaterial,
    },
}

impl Cipher {
    /// Splits the cipher into independent encrypt/decrypt halves so
    /// `Connection` can guard them with separate mutexes: encrypt and
    /// decrypt share no mutable state but their own sequence counters.
    pub(crate) fn split(self) -> (CipherHalf, CipherHalf) {
        match self {
            Cipher::Aes128Gcm { encrypt, decrypt } => (
                CipherHalf::Aes128Gcm(new_aead_direction::<Aes128GcmImpl>(encrypt)),
                CipherHalf::Aes128Gcm(new_aead_direction::<Aes128GcmImpl>(decrypt)),
            ),
            Cipher::Aes256Gcm { encrypt, decrypt } => (
                CipherHalf::Aes256Gcm(new_aead_direction::<Aes256GcmImpl>(encrypt)),
                CipherHalf::Aes256Gcm(new_aead_direction::<Aes256GcmImpl>(decrypt)),
            ),
            Cipher::Chacha20Poly1305 { encrypt, decrypt } => (
                CipherHalf::Chacha20Poly1305(new_aead_direction::<ChaCha20Poly1305Impl>(encrypt)),
                CipherHalf::Chacha20Poly1305(new_aead_direction::<ChaCha20Poly1305Impl>(decrypt)),
            ),
            Cipher::Aegis128L { encrypt, decrypt } => (
                CipherHalf::Aegis128L(new_aead_direction::<Aegis128LImpl>(encrypt)),
                CipherHalf::Aegis128L(new_aead_direction::<Aegis128LImpl>(decrypt)),
            ),
            Cipher::Cbc { encrypt, decrypt } => (
                CipherHalf::Cbc(CbcDirection::new(encrypt.mac_key, encrypt.enc_key)),
                CipherHalf::Cbc(CbcDirection::new(decrypt.mac_key, decrypt.enc_key)),
            ),
        }
    }
}

fn new_aead_direction<C>(material: AeadKeyMaterial) -> AeadDirection<C>
where
    C: aead::AeadInPlace<TagSize = generic_array::typenum::U16> + KeyInit,
{
    let cipher = C::new_from_slice(&material.key).expect("handshake provides a correctly sized key");
    let static_iv = GenericArray::clone_from_slice(&material.static_iv);
    AeadDirection::new(cipher, static_iv)
}

/// One direction (encrypt-only or decrypt-only) of a split `Cipher`. This
/// is what `Connection` actually stores and what the record plane and
/// zero-copy engine dispatch on.
pub(crate) enum CipherHalf {
    Aes128Gcm(AeadDirection<Aes128GcmImpl>),
    Aes256Gcm(AeadDirection<Aes256GcmImpl>),
    Chacha20Poly1305(AeadDirection<ChaCha20Poly1305Impl>),
    Aegis128L(AeadDirection<Aegis128LImpl>),
    Cbc(CbcDirection),
}

/// Expands to one match arm per AEAD variant calling `$method` on the
/// inner `AeadDirection`; used so the four near-identical suites share one
/// definition instead of four hand-copied match statements.
macro_rules! aead_dispatch {
    ($self:expr, $binding:ident => $body:expr) => {
        match $self {
            CipherHalf::Aes128Gcm($binding) => $body,
            CipherHalf::Aes256Gcm($binding) => $body,
            CipherHalf::Chacha20Poly1305($binding) => $body,
            CipherHalf::Aegis128L($binding) => $body,
            CipherHalf::Cbc(_) => unreachable!("CBC is excluded from the AEAD dispatch path"),
        }
    };
}

impl CipherHalf {
    /// Whether this suite is eligible for the zero-copy engine: any
    /// approved AEAD with a 16-byte tag. CBC-HMAC never qualifies.
    pub fn is_zero_copy_capable(&self) -> bool {
        !matches!(self, CipherHalf::Cbc(_))
    }

    /// Encrypts the TLS 1.3 inner plaintext (`cleartext || content_type`)
    /// held in `buffer[..inner_len]` in place, appending the 16-byte AEAD
    /// tag immediately after. `buffer` must have at least `inner_len + 16`
    /// bytes of capacity. Returns the total ciphertext length.
    pub fn aead_encrypt_in_place(
        &mut self,
        aad: &[u8],
        buffer: &mut [u8],
        inner_len: usize,
    ) -> Result<usize, Error> {
        let tag = aead_dispatch!(self, d => d.encrypt_in_place_detached(aad, &mut buffer[..inner_len])?);
        buffer[inner_len..inner_len + 16].copy_from_slice(&tag);
        Ok(inner_len + 16)
    }

    /// Verifies and decrypts an AEAD record's ciphertext+tag held in
    /// `buffer` in place. Returns the plaintext length (ciphertext length
    /// minus the 16-byte tag). The caller is responsible for the TLS 1.3
    /// trailing-zero-padding / content-type-byte strip.
    pub fn aead_decrypt_in_place(&mut self, aad: &[u8], buffer: &mut [u8]) -> Result<usize, Error> {
        if buffer.len() < 16 {
            return Err(Error::Decode("ciphertext shorter than AEAD tag"));
        }
        let split = buffer.len() - 16;
        let (ciphertext, tag_bytes) = buffer.split_at_mut(split);
        let tag = GenericArray::clone_from_slice(tag_bytes);
        aead_dispatch!(self, d => d.decrypt_in_place_detached(aad, ciphertext, &tag)?);
        Ok(split)
    }

    /// CBC-HMAC encrypt; panics (via `unreachable!`) on an AEAD variant,
    /// since the record plane only ever calls this on a `Cbc` half.
    pub fn cbc_encrypt(
        &mut self,
        content_type: ContentType,
        legacy_version: u16,
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, Error> {
        match self {
            CipherHalf::Cbc(c) => c.encrypt(content_type, legacy_version, plaintext, out),
            _ => unreachable!("cbc_encrypt called on a non-CBC cipher half"),
        }
    }

    /// CBC-HMAC decrypt; panics (via `unreachable!`) on an AEAD variant.
    pub fn cbc_decrypt(
        &mut self,
        content_type: ContentType,
        legacy_version: u16,
        buffer: &mut [u8],
    ) -> Result<usize, Error> {
        match self {
            CipherHalf::Cbc(c) => c.decrypt(content_type, legacy_version, buffer),
            _ => unreachable!("cbc_decrypt called on a non-CBC cipher half"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aes128gcm_pair(key: [u8; 16], iv: [u8; 12]) -> Cipher {
        Cipher::Aes128Gcm {
            encrypt: AeadKeyMaterial {
                key: key.to_vec(),
                static_iv: iv.to_vec(),
            },
            decrypt: AeadKeyMaterial {
                key: key.to_vec(),
                static_iv: iv.to_vec(),
            },
        }
    }

    #[test]
    fn aes128gcm_round_trip_through_split_halves() {
        let cipher = aes128gcm_pair([0x01; 16], [0x02; 12]);
        let (mut enc, mut dec) = cipher.split();

        let plaintext = b"hello";
        let mut buffer = [0u8; 64];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        buffer[plaintext.len()] = 23; // application_data inner content type
        let inner_len = plaintext.len() + 1;

        let aad = [23u8, 0x03, 0x03, 0x00, 22];
        let ct_len = enc.aead_encrypt_in_place(&aad, &mut buffer, inner_len).unwrap();
        assert_eq!(ct_len, inner_len + 16);

        let pt_len = dec.aead_decrypt_in_place(&aad, &mut buffer[..ct_len]).unwrap();
        assert_eq!(pt_len, inner_len);
        assert_eq!(&buffer[..plaintext.len()], plaintext);
        assert_eq!(buffer[plaintext.len()], 23);
    }

    #[test]
    fn cbc_is_not_zero_copy_capable() {
        let cipher = Cipher::Cbc {
            encrypt: CbcKeyMaterial {
                mac_key: [0u8; 32],
                enc_key: [0u8; 16],
            },
            decrypt: CbcKeyMaterial {
                mac_key: [0u8; 32],
                enc_key: [0u8; 16],
            },
        };
        let (enc, _dec) = cipher.split();
        assert!(!enc.is_zero_copy_capable());
    }

    #[test]
    fn aead_variants_are_zero_copy_capable() {
        let cipher = aes128gcm_pair([0x01; 16], [0x02; 12]);
        let (enc, _dec) = cipher.split();
        assert!(enc.is_zero_copy_capable());
    }
}
