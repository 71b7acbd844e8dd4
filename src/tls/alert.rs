//! TLS alert protocol (RFC 8446 §6). The handshake subsystem owns alert
//! *parsing* (it already has the full message framing); this module only
//! covers what the data plane needs to emit a best-effort alert before
//! closing a connection it has failed.

/// `AlertLevel` per RFC 8446 §6. TLS 1.3 treats every alert the data plane
/// would send as effectively fatal, but the wire field is still two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// Subset of `AlertDescription` (RFC 8446 §6) that the data plane can
/// originate. The handshake subsystem's own alert type is a superset of
/// this; the data plane never needs to send e.g. `certificate_expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    DecodeError = 50,
    DecryptError = 51,
    InternalError = 80,
}

/// A single alert message: two bytes on the wire, `level || description`.
#[derive(Debug, Clone, Copy)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    /// Serializes this alert as the two-byte `AlertInner` payload. The
    /// caller is responsible for wrapping this in a `Record` with
    /// `content_type = alert` and encrypting it with the current cipher,
    /// same as any other outbound record.
    pub fn to_bytes(self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_alert_serializes_level_then_description() {
        let alert = Alert::fatal(AlertDescription::BadRecordMac);
        assert_eq!(alert.to_bytes(), [2, 20]);
    }

    #[test]
    fn close_notify_is_a_warning() {
        let alert = Alert::close_notify();
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.to_bytes(), [1, 0]);
    }
}
