//! TLS 1.2/1.3 record-layer data plane: framing, AEAD/CBC-HMAC cipher
//! state, the zero-copy decrypt engine, and the two connection surfaces
//! built on top of them (blocking [`Connection`] and non-blocking
//! [`Transcoder`]). The handshake state machine, X.509 validation, and
//! extension negotiation are external collaborators that hand this module
//! an already-negotiated [`Cipher`].

mod alert;
mod cipher;
mod cipher_suite;
mod cipher_tls12;
mod constants;
mod options;
mod record;
mod record_stream;
mod transcoder;

pub mod application_stream;
pub mod zero_copy;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cipher::{AeadKeyMaterial, CbcKeyMaterial, Cipher};
pub use constants::{
    AEAD_TAG_LEN, DEFAULT_INPLACE_ALIGNMENT, MAX_CIPHERTEXT_RECORD_LEN, MAX_INPLACE_FORWARD_OFFSET,
    MAX_PLAINTEXT_RECORD_LEN, RECORD_HEADER_LEN, TLS_1_0_VERSION, TLS_1_2_VERSION,
};
pub use options::ConnectionOptions;
pub use record::{read_record_from, ContentType, RecordHeader};
pub use record_stream::{ConnectionState, DecryptedRecord, RecordPlane};
pub use transcoder::{DecryptResult, EncryptResult, Transcoder};

pub use application_stream::Connection;
