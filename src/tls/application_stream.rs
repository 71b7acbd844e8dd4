//! The blocking, `Read`/`Write` connection handle exposed to applications
//! and to the (out-of-scope) handshake subsystem once negotiation hands it
//! a [`Cipher`]. Owns the transport stream directly; [`crate::tls::Transcoder`]
//! is the non-blocking sibling for callers that manage their own I/O.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::error::Error;
use crate::pool::BufferPool;
use crate::tls::cipher::Cipher;
use crate::tls::constants::{MAX_CIPHERTEXT_RECORD_LEN, MAX_RECORD_EXPANSION};
use crate::tls::options::ConnectionOptions;
use crate::tls::record::{read_record_from, ContentType};
use crate::tls::record_stream::RecordPlane;
use crate::signal_pipe::OptionalSignalPipe;

/// A TLS record-layer connection over an already-connected transport `S`,
/// driven with an already-negotiated `Cipher`. Construction never performs
/// a handshake; that is the caller's responsibility.
pub struct Connection<S> {
    stream: S,
    plane: RecordPlane,
    options: ConnectionOptions,
    signal_pipe: OptionalSignalPipe,
    read_scratch: Vec<u8>,
    read_buffered: std::ops::Range<usize>,
    write_scratch: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl<S: Read + Write> Connection<S> {
    /// Builds a connection acting as the TLS client side: `encrypt` uses
    /// `cipher`'s `encrypt` half directly, matching how the handshake
    /// subsystem derives client-write/server-write keys.
    pub fn client(stream: S, cipher: Cipher, is_tls13: bool, options: ConnectionOptions) -> io::Result<Self> {
        Self::new(stream, cipher, is_tls13, options)
    }

    /// Builds a connection acting as the TLS server side. The cipher's
    /// encrypt/decrypt halves are already oriented correctly by the
    /// handshake subsystem (server-write vs client-write), so this is
    /// identical to `client()` from the record plane's point of view.
    pub fn server(stream: S, cipher: Cipher, is_tls13: bool, options: ConnectionOptions) -> io::Result<Self> {
        Self::new(stream, cipher, is_tls13, options)
    }

    fn new(stream: S, cipher: Cipher, is_tls13: bool, options: ConnectionOptions) -> io::Result<Self> {
        let (encrypt_half, decrypt_half) = cipher.split();
        let plane = RecordPlane::new(encrypt_half, decrypt_half, is_tls13, options.inplace_alignment);
        let signal_pipe = OptionalSignalPipe::new(options.signal_pipe_enabled, options.trigger_mode)?;

        Ok(Self {
            stream,
            plane,
            options,
            signal_pipe,
            read_scratch: vec![0u8; MAX_CIPHERTEXT_RECORD_LEN],
            read_buffered: 0..0,
            write_scratch: vec![0u8; MAX_CIPHERTEXT_RECORD_LEN],
            pool: None,
        })
    }

    /// Same as `client`/`server`, but binds a shared [`BufferPool`] the
    /// connection acquires its record scratch space from instead of
    /// allocating its own, so many connections on the same reactor thread
    /// share a bounded set of record-sized buffers.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.read_scratch = vec![0u8; pool.buffer_size().max(MAX_CIPHERTEXT_RECORD_LEN)];
        self.pool = Some(pool);
        self
    }

    /// The descriptor the embedding reactor should poll for readability,
    /// when a signal pipe was requested in `options`.
    pub fn signal_fd(&self) -> std::os::unix::io::RawFd {
        self.signal_pipe.read_fd()
    }

    /// Encrypts and writes `buf` as one or more records, fragmenting at
    /// `options.max_plaintext_record_len`. Returns the number of cleartext
    /// bytes consumed (always `buf.len()` on success, matching `Write`'s
    /// contract). `write_scratch` only grows when a particular call needs
    /// more room than any previous one, so steady-state traffic at a
    /// stable size never reallocates.
    fn encrypt_and_send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let max_fragment_len = self.options.max_plaintext_record_len;
        let fragments = if buf.is_empty() {
            1
        } else {
            (buf.len() + max_fragment_len - 1) / max_fragment_len
        };
        let worst_case = buf.len() + fragments * MAX_RECORD_EXPANSION;
        if self.write_scratch.len() < worst_case {
            self.write_scratch.resize(worst_case, 0);
        }

        let n = self
            .plane
            .encrypt(buf, &mut self.write_scratch, self.options.max_plaintext_record_len)?;
        self.stream.write_all(&self.write_scratch[..n])?;
        self.signal_pipe.signal()?;
        Ok(buf.len())
    }

    /// Reads and decrypts the next application-data record, looping past
    /// any handshake or alert records by surfacing them as zero-length
    /// reads with state updated accordingly — the embedding handshake
    /// subsystem is expected to drive those through a lower-level API; this
    /// path exists for a pure data-plane consumer that only ever expects
    /// application data once the handshake is done.
    fn recv_one_record(&mut self) -> Result<(ContentType, usize), Error> {
        let (header, len) = read_record_from(&mut self.stream, &mut self.read_scratch)?;
        let outcome = self.plane.decrypt_record(&header, &mut self.read_scratch[..len])?;

        if outcome.content_type == ContentType::Alert {
            if outcome.plaintext_len >= 2 && self.read_scratch[1] == 0 {
                self.plane.mark_closed();
                return Err(Error::CloseNotify);
            }
            return Err(Error::Unexpected(ContentType::Alert as u8));
        }

        Ok((outcome.content_type, outcome.plaintext_len))
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.plane.mark_closed();
        Ok(())
    }
}

impl<S: Read + Write> Read for Connection<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buffered.is_empty() {
            match self.recv_one_record() {
                Ok((_, len)) => self.read_buffered = 0..len,
                Err(Error::CloseNotify) => return Ok(0),
                Err(e) => return Err(to_io_error(e)),
            }
        }

        let available = &self.read_scratch[self.read_buffered.clone()];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_buffered.start += n;
        Ok(n)
    }
}

impl<S: Read + Write> Write for Connection<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encrypt_and_send(buf).map_err(to_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

fn to_io_error(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
