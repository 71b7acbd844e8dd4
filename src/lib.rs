//! A TLS 1.2/1.3 record-layer data plane library, built around zero-
//! allocation steady-state I/O: record framing with per-direction AEAD or
//! CBC-HMAC cipher state, a zero-copy decryption engine, pooled-memory
//! subsystems for handshake-scoped and record-sized allocations, and a
//! coalescing signal pipe for epoll/kqueue reactors.
//!
//! The handshake state machine, X.509 parsing, and extension negotiation
//! policy are not part of this crate — they are expected to sit on top of
//! it, consuming [`pool::ArenaPool`] for their own transient state and
//! producing a [`tls::Cipher`] that this crate's connection types consume.

pub mod error;
pub mod pool;
pub mod signal_pipe;
pub mod tls;

pub use error::Error;
pub use tls::{Cipher, Connection, ConnectionOptions, Transcoder};
