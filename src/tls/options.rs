//! Connection construction options. There is no file- or environment-based
//! configuration layer in this crate — it is a library, not a service — so
//! these are passed in directly by the embedding application, typically
//! once the handshake subsystem has already negotiated a `Cipher`.

use crate::signal_pipe::TriggerMode;
use crate::tls::constants::{DEFAULT_INPLACE_ALIGNMENT, MAX_PLAINTEXT_RECORD_LEN};

/// Per-connection tunables. `Default` matches the wire-mandated record size
/// limits and a conservative, always-correct alignment requirement; signal
/// pipe support defaults to off since most embedders drive the connection
/// synchronously and never touch a descriptor-polling reactor.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Largest plaintext fragment this connection will emit per record.
    /// Must not exceed `MAX_PLAINTEXT_RECORD_LEN`; a smaller value trades
    /// throughput for smaller worst-case buffering.
    pub max_plaintext_record_len: usize,

    /// Alignment, in bytes, the zero-copy engine requires of both the
    /// ciphertext and output addresses before it will decrypt in place.
    /// Set to 1 to disable the alignment check entirely.
    pub inplace_alignment: usize,

    /// Whether this connection allocates a signal pipe for an external
    /// reactor. When `false`, `Connection::signal_fd()` reads from the
    /// zero-cost `NullSignalPipe` variant instead.
    pub signal_pipe_enabled: bool,

    /// Edge- vs level-triggered drain behavior for the signal pipe. Only
    /// meaningful when `signal_pipe_enabled` is `true`.
    pub trigger_mode: TriggerMode,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_plaintext_record_len: MAX_PLAINTEXT_RECORD_LEN,
            inplace_alignment: DEFAULT_INPLACE_ALIGNMENT,
            signal_pipe_enabled: false,
            trigger_mode: TriggerMode::LevelTriggered,
        }
    }
}
