//! Per-direction AEAD key material and nonce derivation, generic over the
//! concrete RustCrypto cipher type.
//!
//! Mirrors the shape of a classic `key_size`/`nonce_size`/`encrypt`/`decrypt`
//! AEAD seam but targets the `aead` crate's `AeadInPlace` trait that
//! `aes-gcm`, `chacha20poly1305`,
//! and `aegis` all implement, so the same generic code drives all three
//! suites with zero dynamic dispatch: each `Cipher` enum variant (see
//! `cipher.rs`) is monomorphized over its concrete cipher type at compile
//! time and dispatch is a single `match` over the enum, never a `dyn Trait`
//! call per record.

use aead::{AeadInPlace, Nonce, Tag};
use generic_array::typenum::U16;

use crate::error::Error;

/// Tracks a single direction's (encrypt- or decrypt-) monotonic sequence
/// counter. `seq == u64::MAX` is treated as the terminal "no further
/// records may be sent under this key" state: per RFC 8446 §5.5 the
/// counter must never wrap, so the crate reserves the top value rather
/// than allow a 2^64th record to reuse nonce 0.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SequenceCounter {
    seq: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { seq: 0 }
    }

    /// Returns the sequence number to use for the next record without
    /// consuming it. Call `advance` only after the record has actually been
    /// produced, so a caller that bails out early (e.g. `BufferTooSmall`)
    /// never burns a sequence number it didn't use.
    pub fn peek(&self) -> Result<u64, Error> {
        if self.seq == u64::MAX {
            Err(Error::SequenceOverflow)
        } else {
            Ok(self.seq)
        }
    }

    pub fn advance(&mut self) {
        debug_assert!(self.seq != u64::MAX);
        self.seq += 1;
    }
}

/// Derives the per-record nonce for TLS 1.3 AEAD suites (RFC 8446 §5.3):
/// the static IV with the big-endian sequence number XORed into its
/// rightmost 8 bytes.
pub(crate) fn derive_nonce<N: generic_array::ArrayLength<u8>>(
    static_iv: &generic_array::GenericArray<u8, N>,
    seq: u64,
) -> generic_array::GenericArray<u8, N> {
    let mut nonce = static_iv.clone();
    let seq_be = seq.to_be_bytes();
    let n = nonce.len();
    debug_assert!(n >= seq_be.len());
    for i in 0..seq_be.len() {
        nonce[n - seq_be.len() + i] ^= seq_be[i];
    }
    nonce
}

/// One direction's worth of AEAD state: the constructed cipher instance,
/// its static IV, and its sequence counter. Generic over any concrete
/// cipher implementing `AeadInPlace` with a 16-byte tag (the only tag size
/// this crate's zero-copy engine and wire format support).
pub(crate) struct AeadDirection<C: AeadInPlace<TagSize = U16>> {
    cipher: C,
    static_iv: Nonce<C>,
    seq: SequenceCounter,
}

impl<C: AeadInPlace<TagSize = U16>> AeadDirection<C> {
    pub fn new(cipher: C, static_iv: Nonce<C>) -> Self {
        Self {
            cipher,
            static_iv,
            seq: SequenceCounter::new(),
        }
    }

    fn nonce_for(&self, seq: u64) -> Nonce<C> {
        derive_nonce(&self.static_iv, seq)
    }

    /// Encrypts `buffer` (containing only plaintext on entry) in place,
    /// appending nothing; the tag is returned separately so the caller can
    /// place it immediately after the ciphertext in the record buffer.
    /// Reserves (but does not advance) the sequence number used; the
    /// caller must call `advance()` once the output has actually been
    /// written to its destination.
    pub fn encrypt_in_place_detached(
        &mut self,
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<Tag<C>, Error> {
        let seq = self.seq.peek()?;
        let nonce = self.nonce_for(seq);
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, aad, buffer)
            .map_err(|_| Error::Decode("AEAD encryption failed"))?;
        self.seq.advance();
        Ok(tag)
    }

    /// Verifies and decrypts `buffer` (ciphertext, no tag) in place against
    /// `tag`. On success the sequence counter advances; on a MAC failure it
    /// does not (the connection is about to be torn down anyway).
    pub fn decrypt_in_place_detached(
        &mut self,
        aad: &[u8],
        buffer: &mut [u8],
        tag: &Tag<C>,
    ) -> Result<(), Error> {
        let seq = self.seq.peek()?;
        let nonce = self.nonce_for(seq);
        self.cipher
            .decrypt_in_place_detached(&nonce, aad, buffer, tag)
            .map_err(|_| Error::BadRecordMac)?;
        self.seq.advance();
        Ok(())
    }

    /// The sequence number that would be used for the *next* call, for
    /// tests and for the auxiliary key-update check performed after a
    /// successful decrypt.
    #[cfg(test)]
    pub fn peek_seq(&self) -> Result<u64, Error> {
        self.seq.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generic_array::GenericArray;
    use generic_array::typenum::U12;

    #[test]
    fn nonce_derivation_xors_only_the_trailing_eight_bytes() {
        let iv: GenericArray<u8, U12> = GenericArray::clone_from_slice(&[0xAAu8; 12]);
        let nonce = derive_nonce(&iv, 1);
        assert_eq!(&nonce[..4], &[0xAA; 4]);
        assert_eq!(nonce[11], 0xAA ^ 1);
    }

    #[test]
    fn sequence_counter_rejects_use_at_u64_max() {
        let mut counter = SequenceCounter::new();
        counter.seq = u64::MAX;
        assert!(matches!(counter.peek(), Err(Error::SequenceOverflow)));
    }

    #[test]
    fn sequence_counter_advances_by_one_per_use() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.peek().unwrap(), 0);
        counter.advance();
        assert_eq!(counter.peek().unwrap(), 1);
        counter.advance();
        assert_eq!(counter.peek().unwrap(), 2);
    }
}
