//! Error taxonomy for the TLS record-layer data plane.
//!
//! One enum covers every subsystem in this crate (record framing, cipher
//! state, pools, signal pipe) rather than a per-module error type, matching
//! the house style of a single `Error` surface per crate boundary.

use thiserror::Error;

use crate::tls::alert::AlertDescription;

/// Errors observable by a caller of the data plane.
///
/// See the module docs on [`crate::tls`] for which variants are fatal to the
/// connection (and therefore trigger a best-effort alert + `Failed`
/// transition) versus which are recoverable.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed record or frame (bad header, truncated payload, ...).
    #[error("malformed TLS record: {0}")]
    Decode(&'static str),

    /// AEAD tag verification failed, or the decrypt sequence counter is out
    /// of step with the peer's encrypt counter.
    #[error("bad record MAC")]
    BadRecordMac,

    /// A record carried a content type that is not valid in the current
    /// connection state (e.g. application data before the handshake
    /// finished, or the wrong record type in response to one of our calls).
    #[error("unexpected content type {0:#x}")]
    Unexpected(u8),

    /// The peer sent a `close_notify` alert. Recoverable: callers should
    /// surface this as EOF rather than failing the connection.
    #[error("peer sent close_notify")]
    CloseNotify,

    /// The caller-supplied output buffer could not hold the operation's
    /// result. Recoverable: retry with a larger buffer.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The per-direction sequence counter is exhausted; one more record
    /// would require reusing a nonce. Per RFC 8446 §5.5 this must never be
    /// allowed to wrap.
    #[error("sequence counter exhausted for this keying epoch")]
    SequenceOverflow,

    /// The zero-copy engine was asked to decrypt in place but the
    /// input/output buffers violate the aliasing or alignment
    /// preconditions. Recoverable: fall back to the copying decrypt path.
    #[error("invalid buffer aliasing for in-place decrypt")]
    InvalidBuffer,

    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is fatal to the connection's data plane. Fatal
    /// errors drive the `Failed` transition and a best-effort alert send;
    /// non-fatal errors are surfaced to the caller without killing the
    /// connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Decode(_) | Error::BadRecordMac | Error::Unexpected(_) | Error::SequenceOverflow => true,
            Error::CloseNotify | Error::BufferTooSmall { .. } | Error::InvalidBuffer => false,
            // Transport errors are fatal unless the caller can retry the I/O
            // itself; the data plane has no way to distinguish, so treat
            // them as fatal to be conservative about resuming a connection
            // with a wedged cipher state.
            Error::Io(_) => true,
        }
    }
}

impl From<&Error> for Option<AlertDescription> {
    /// Maps an error to the alert description that should be sent to the
    /// peer, best-effort, before closing the connection. Non-fatal errors
    /// and I/O errors (where there is no reliable way to write an alert)
    /// map to `None`.
    fn from(err: &Error) -> Self {
        Some(match err {
            Error::Decode(_) => AlertDescription::DecodeError,
            Error::BadRecordMac => AlertDescription::BadRecordMac,
            Error::Unexpected(_) => AlertDescription::UnexpectedMessage,
            Error::SequenceOverflow => AlertDescription::InternalError,
            Error::CloseNotify | Error::BufferTooSmall { .. } | Error::InvalidBuffer | Error::Io(_) => {
                return None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_matches_alert_mapping() {
        assert!(Error::Decode("bad header").is_fatal());
        assert!(Error::BadRecordMac.is_fatal());
        assert!(Error::Unexpected(0).is_fatal());
        assert!(Error::SequenceOverflow.is_fatal());
        assert!(!Error::CloseNotify.is_fatal());
        assert!(!Error::BufferTooSmall { needed: 1, available: 0 }.is_fatal());
        assert!(!Error::InvalidBuffer.is_fatal());
    }

    #[test]
    fn alert_mapping_only_defined_for_fatal_wire_errors() {
        let opt: Option<AlertDescription> = (&Error::BadRecordMac).into();
        assert_eq!(opt, Some(AlertDescription::BadRecordMac));

        let opt: Option<AlertDescription> = (&Error::CloseNotify).into();
        assert_eq!(opt, None);
    }
}
