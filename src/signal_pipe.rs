//! A coalescing wake primitive for descriptor-polling reactors (epoll on
//! Linux, kqueue on macOS/BSD). One or more producers call `signal()`; a
//! single consumer (the reactor thread, after it observes the descriptor
//! become readable) calls `clear()` to drain it. Any number of concurrent
//! `signal()` calls between two `clear()`s collapse into at most one byte
//! sitting in the kernel pipe buffer.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

const STATE_IDLE: u32 = 0;
const STATE_PENDING: u32 = 1;
const STATE_SENT: u32 = 2;

/// Whether the reactor should re-arm with edge- or level-triggered
/// semantics; only affects how `clear()` drains the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    LevelTriggered,
    EdgeTriggered,
}

/// A readable/writable descriptor pair (or a single eventfd acting as both)
/// plus the atomic coalescing state machine described in the module docs.
pub struct SignalPipe {
    read_fd: RawFd,
    write_fd: RawFd,
    is_eventfd: bool,
    state: AtomicU32,
    trigger_mode: TriggerMode,
}

impl SignalPipe {
    /// Creates a new pipe, preferring a single Linux `eventfd` descriptor
    /// (non-blocking, close-on-exec) and falling back to `pipe2` with the
    /// same flags when eventfd creation fails (e.g. a seccomp sandbox that
    /// denies the syscall). On macOS/BSD there is no eventfd equivalent, so
    /// this always creates a plain pipe and sets the flags with `fcntl`
    /// rather than hard-coding platform-specific numeric values for
    /// `O_NONBLOCK`.
    pub fn new(trigger_mode: TriggerMode) -> io::Result<Self> {
        #[cfg(target_os = "linux")]
        {
            if let Some(fd) = Self::try_create_eventfd()? {
                return Ok(Self {
                    read_fd: fd,
                    write_fd: fd,
                    is_eventfd: true,
                    state: AtomicU32::new(STATE_IDLE),
                    trigger_mode,
                });
            }
        }

        let (read_fd, write_fd) = Self::create_pipe()?;
        Ok(Self {
            read_fd,
            write_fd,
            is_eventfd: false,
            state: AtomicU32::new(STATE_IDLE),
            trigger_mode,
        })
    }

    #[cfg(target_os = "linux")]
    fn try_create_eventfd() -> io::Result<Option<RawFd>> {
        // EFD_NONBLOCK | EFD_CLOEXEC; eventfd's flag bits alias the O_*
        // bits exposed by `libc` for the same purpose.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd >= 0 {
            Ok(Some(fd))
        } else {
            // Any failure (ENOSYS, EMFILE, a sandboxed syscall filter, ...)
            // falls back to the pipe path rather than propagating an error.
            Ok(None)
        }
    }

    fn create_pipe() -> io::Result<(RawFd, RawFd)> {
        let mut fds = [0 as RawFd; 2];

        #[cfg(target_os = "linux")]
        {
            let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            return Ok((fds[0], fds[1]));
        }

        #[cfg(not(target_os = "linux"))]
        {
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            for &fd in &fds {
                set_nonblocking_cloexec(fd)?;
            }
            Ok((fds[0], fds[1]))
        }
    }

    /// The descriptor the reactor should register for readability.
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// Bits to OR into an `epoll_event.events` field, including `EPOLLET`
    /// when this pipe was constructed edge-triggered.
    #[cfg(target_os = "linux")]
    pub fn epoll_interest(&self) -> u32 {
        let mut bits = libc::EPOLLIN as u32;
        if self.trigger_mode == TriggerMode::EdgeTriggered {
            bits |= libc::EPOLLET as u32;
        }
        bits
    }

    /// Bits to OR into a `kevent.flags` field, including `EV_CLEAR` when
    /// this pipe was constructed edge-triggered.
    #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
    pub fn kqueue_flags(&self) -> u16 {
        let mut flags = (libc::EV_ADD | libc::EV_ENABLE) as u16;
        if self.trigger_mode == TriggerMode::EdgeTriggered {
            flags |= libc::EV_CLEAR as u16;
        }
        flags
    }

    /// Raises the signal. Coalesces with any signal already pending: the
    /// CAS from IDLE to PENDING only succeeds for the first caller in a
    /// given idle period, and every other concurrent caller observes the
    /// CAS fail and returns without touching the descriptor.
    pub fn signal(&self) -> io::Result<()> {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        self.write_one_byte()?;
        self.state.store(STATE_SENT, Ordering::Release);
        Ok(())
    }

    fn write_one_byte(&self) -> io::Result<()> {
        let value: u64 = 1;
        let rc = if self.is_eventfd {
            unsafe { libc::write(self.write_fd, &value as *const u64 as *const libc::c_void, 8) }
        } else {
            let byte: u8 = 1;
            unsafe { libc::write(self.write_fd, &byte as *const u8 as *const libc::c_void, 1) }
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            // EAGAIN on an eventfd means the counter is already saturated,
            // which is itself evidence the reader has not drained yet —
            // treat it as a successful coalesced signal rather than an
            // error.
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Clears the pending/sent state and drains the descriptor. Returns
    /// whether a signal had actually been observed (i.e. the state was not
    /// already IDLE).
    pub fn clear(&self) -> io::Result<bool> {
        let previous = self.state.swap(STATE_IDLE, Ordering::AcqRel);
        match previous {
            STATE_IDLE => Ok(false),
            STATE_PENDING => Ok(true),
            STATE_SENT => {
                self.drain()?;
                Ok(true)
            }
            _ => unreachable!("signal pipe state is one of IDLE/PENDING/SENT"),
        }
    }

    fn drain(&self) -> io::Result<()> {
        if self.is_eventfd {
            let mut value: u64 = 0;
            let rc = unsafe { libc::read(self.read_fd, &mut value as *mut u64 as *mut libc::c_void, 8) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    return Err(err);
                }
            }
            return Ok(());
        }

        loop {
            let mut byte: u8 = 0;
            let rc = unsafe { libc::read(self.read_fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(());
                }
                return Err(err);
            }
            if self.trigger_mode == TriggerMode::LevelTriggered {
                // Level-triggered reactors observe readability again on the
                // next poll if another byte arrives, so a single read
                // suffices.
                return Ok(());
            }
            // Edge-triggered reactors only see one wakeup per transition,
            // so drain down to EAGAIN to avoid missing a coalesced signal
            // written while this loop was running.
        }
    }

    /// True iff the last transition moved into PENDING or SENT and no
    /// subsequent `clear()` has observed it.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_IDLE
    }
}

#[cfg(not(target_os = "linux"))]
fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(fd, libc::F_GETFD, 0);
        if fd_flags < 0 || libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            if !self.is_eventfd {
                libc::close(self.write_fd);
            }
        }
    }
}

/// Zero-cost variant used when the embedding application drives its own
/// notification scheme (or none at all) and doesn't want a real descriptor
/// allocated. Every operation is a no-op; `read_fd()` returns -1.
#[derive(Default)]
pub struct NullSignalPipe;

impl NullSignalPipe {
    pub fn read_fd(&self) -> RawFd {
        -1
    }

    pub fn signal(&self) -> io::Result<()> {
        Ok(())
    }

    pub fn clear(&self) -> io::Result<bool> {
        Ok(false)
    }

    pub fn is_pending(&self) -> bool {
        false
    }
}

/// Either a real [`SignalPipe`] or the [`NullSignalPipe`] no-op, selected at
/// construction time by `ConnectionOptions::signal_pipe_enabled`. Kept as an
/// enum (rather than a trait object) so the disabled path costs nothing
/// beyond a branch on the hot encrypt/decrypt call sites that check
/// `is_pending()`.
pub enum OptionalSignalPipe {
    Enabled(SignalPipe),
    Disabled(NullSignalPipe),
}

impl OptionalSignalPipe {
    pub fn new(enabled: bool, trigger_mode: TriggerMode) -> io::Result<Self> {
        if enabled {
            Ok(Self::Enabled(SignalPipe::new(trigger_mode)?))
        } else {
            Ok(Self::Disabled(NullSignalPipe))
        }
    }

    pub fn read_fd(&self) -> RawFd {
        match self {
            Self::Enabled(p) => p.read_fd(),
            Self::Disabled(p) => p.read_fd(),
        }
    }

    pub fn signal(&self) -> io::Result<()> {
        match self {
            Self::Enabled(p) => p.signal(),
            Self::Disabled(p) => p.signal(),
        }
    }

    pub fn clear(&self) -> io::Result<bool> {
        match self {
            Self::Enabled(p) => p.clear(),
            Self::Disabled(p) => p.clear(),
        }
    }

    pub fn is_pending(&self) -> bool {
        match self {
            Self::Enabled(p) => p.is_pending(),
            Self::Disabled(p) => p.is_pending(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn idle_pipe_is_not_pending() {
        let pipe = SignalPipe::new(TriggerMode::LevelTriggered).unwrap();
        assert!(!pipe.is_pending());
    }

    #[test]
    fn signal_then_clear_round_trips_through_pending() {
        let pipe = SignalPipe::new(TriggerMode::LevelTriggered).unwrap();
        pipe.signal().unwrap();
        assert!(pipe.is_pending());
        assert!(pipe.clear().unwrap());
        assert!(!pipe.is_pending());
    }

    #[test]
    fn clear_on_idle_pipe_reports_no_signal_observed() {
        let pipe = SignalPipe::new(TriggerMode::LevelTriggered).unwrap();
        assert!(!pipe.clear().unwrap());
    }

    #[test]
    fn concurrent_signals_coalesce_to_a_single_pending_state() {
        let pipe = Arc::new(SignalPipe::new(TriggerMode::LevelTriggered).unwrap());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pipe = pipe.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        pipe.signal().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(pipe.is_pending());
        assert!(pipe.clear().unwrap());
        assert!(!pipe.is_pending());
        // A second clear with nothing in between observes no signal.
        assert!(!pipe.clear().unwrap());
    }

    #[test]
    fn disabled_optional_signal_pipe_is_a_pure_no_op() {
        let pipe = OptionalSignalPipe::new(false, TriggerMode::LevelTriggered).unwrap();
        assert_eq!(pipe.read_fd(), -1);
        pipe.signal().unwrap();
        assert!(!pipe.is_pending());
        assert!(!pipe.clear().unwrap());
    }

    #[test]
    fn enabled_optional_signal_pipe_behaves_like_signal_pipe() {
        let pipe = OptionalSignalPipe::new(true, TriggerMode::LevelTriggered).unwrap();
        assert_ne!(pipe.read_fd(), -1);
        pipe.signal().unwrap();
        assert!(pipe.is_pending());
        assert!(pipe.clear().unwrap());
    }
}
