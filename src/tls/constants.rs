//! Wire-level constants for the TLS record layer (RFC 5246 §6.2, RFC 8446 §5).

/// `ProtocolVersion` value used on the wire for TLS 1.0 (only ever seen in
/// the very first record of a handshake for backwards compatibility).
pub const TLS_1_0_VERSION: u16 = 0x0301;

/// `ProtocolVersion` value used on the wire by both TLS 1.2 and TLS 1.3
/// records (TLS 1.3 always advertises 1.2 at the record layer).
pub const TLS_1_2_VERSION: u16 = 0x0303;

/// Number of bytes in a `TLSPlaintext`/`TLSCiphertext` header:
/// `content_type (1) || legacy_record_version (2) || length (2)`.
pub const RECORD_HEADER_LEN: usize = 5;

/// Maximum size of a plaintext fragment per record (2^14), per RFC 8446 §5.1.
pub const MAX_PLAINTEXT_RECORD_LEN: usize = 1 << 14;

/// Maximum size of a `TLSCiphertext.encrypted_record` payload: plaintext
/// limit plus 256 bytes of headroom for the content-type byte, padding, and
/// the AEAD tag/MAC.
pub const MAX_CIPHERTEXT_RECORD_LEN: usize = MAX_PLAINTEXT_RECORD_LEN + 256;

/// Tag length, in bytes, of every AEAD suite this crate supports for
/// zero-copy decryption (AES-GCM, ChaCha20-Poly1305, AEGIS-128L all use a
/// 16-byte tag).
pub const AEAD_TAG_LEN: usize = 16;

/// Default alignment requirement (in bytes) the zero-copy engine enforces
/// on both the ciphertext and output pointers before it will decrypt
/// in place. Matches typical cache-line-friendly allocator alignment.
pub const DEFAULT_INPLACE_ALIGNMENT: usize = 16;

/// Maximum forward offset (`output.ptr - ciphertext.ptr`) the zero-copy
/// engine considers safe for in-place decryption: at most one AEAD tag's
/// worth of headroom.
pub const MAX_INPLACE_FORWARD_OFFSET: usize = AEAD_TAG_LEN;

/// Worst-case number of bytes a single plaintext fragment grows by once
/// framed and encrypted, across every suite this crate supports: the 5-byte
/// record header plus either the AEAD path (1-byte inner content type + a
/// 16-byte tag = 17 bytes) or the CBC-HMAC path (a 16-byte explicit IV +
/// 32-byte HMAC-SHA256 MAC + up to 16 bytes of PKCS#7 padding = 64 bytes),
/// whichever is larger. Used to size an encrypt-side scratch buffer from a
/// fragment count without hard-coding a fixed-size margin that a large
/// write could exceed.
pub const MAX_RECORD_EXPANSION: usize = RECORD_HEADER_LEN + 64;
