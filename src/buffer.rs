//! The input buffer: bytes queued for the socket while it isn't writable.

use std::io;
use std::os::fd::AsRawFd;

/// Outcome of a single [`InputBuffer::drain_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The write made progress (possibly draining the whole buffer).
    /// Carries the number of bytes actually written.
    Wrote(usize),
    /// The descriptor isn't writable right now; the buffer is unchanged.
    WouldBlock,
}

/// An owned, growable byte buffer that stands between the input framer and
/// the socket.
///
/// Bytes in `[0, len)` are pending writes in the order they were appended.
/// When the buffer is idle (`len == 0`) the relay loop has no reason to
/// register write-interest on the socket; as soon as a byte is appended it
/// becomes backpressured and write-interest must be (re-)registered.
#[derive(Debug, Default)]
pub struct InputBuffer {
    bytes: Vec<u8>,
}

impl InputBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Appends `src` to the tail of the buffer. Grows capacity as needed;
    /// there is no partial append — either all of `src` is queued, or the
    /// allocator aborts the process, which is the only failure mode Rust's
    /// `Vec` exposes for this.
    pub fn append(&mut self, src: &[u8]) {
        self.bytes.extend_from_slice(src);
    }

    /// True iff there are no pending bytes.
    pub fn is_idle(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Issues a single non-blocking write of the buffer's contents to `fd`.
    ///
    /// On a partial write, the unsent remainder is shifted to the head of
    /// the buffer, preserving order. On `EAGAIN`/`EWOULDBLOCK`/`EINTR`, the
    /// buffer is left untouched and [`DrainOutcome::WouldBlock`] is
    /// returned. Any other errno is surfaced as an `io::Error` for the
    /// caller to route through the exit reporter.
    pub fn drain_to(&mut self, fd: &impl AsRawFd) -> io::Result<DrainOutcome> {
        if self.bytes.is_empty() {
            return Ok(DrainOutcome::Wrote(0));
        }
        let raw = fd.as_raw_fd();
        let written = unsafe {
            libc::write(raw, self.bytes.as_ptr().cast(), self.bytes.len())
        };
        if written >= 0 {
            let written = written as usize;
            self.bytes.drain(0..written);
            Ok(DrainOutcome::Wrote(written))
        } else {
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                    Ok(DrainOutcome::WouldBlock)
                }
                _ => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, RawFd};

    struct Fd(RawFd);
    impl AsRawFd for Fd {
        fn as_raw_fd(&self) -> RawFd {
            self.0
        }
    }

    fn pipe_pair() -> (Fd, Fd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (Fd(fds[0]), Fd(fds[1]))
    }

    fn set_nonblocking(fd: RawFd) {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }

    #[test]
    fn idle_buffer_has_nothing_to_drain() {
        let buf = InputBuffer::new();
        assert!(buf.is_idle());
    }

    #[test]
    fn append_then_idle_is_false() {
        let mut buf = InputBuffer::new();
        buf.append(b"hello");
        assert!(!buf.is_idle());
    }

    #[test]
    fn drain_delivers_bytes_in_order() {
        let (read_end, write_end) = pipe_pair();
        let mut buf = InputBuffer::new();
        buf.append(b"hello world");
        let outcome = buf.drain_to(&write_end).unwrap();
        assert_eq!(outcome, DrainOutcome::Wrote(11));
        assert!(buf.is_idle());

        let mut out = [0u8; 32];
        let n = unsafe {
            libc::read(read_end.as_raw_fd(), out.as_mut_ptr().cast(), out.len())
        };
        assert_eq!(&out[..n as usize], b"hello world");
    }

    #[test]
    fn would_block_leaves_buffer_untouched() {
        // A pipe with nothing on the read side and no space pressure will
        // still accept a small write, so force EAGAIN by never reading:
        // fill the pipe's kernel buffer past capacity on a nonblocking fd.
        let (_read_end, write_end) = pipe_pair();
        set_nonblocking(write_end.as_raw_fd());
        let mut buf = InputBuffer::new();
        // Default Linux pipe capacity is 64 KiB; push well past that
        // without reading to force a WouldBlock on some iteration.
        let chunk = vec![b'x'; 1 << 16];
        buf.append(&chunk);
        buf.append(&chunk);
        let mut blocked_once = false;
        for _ in 0..8 {
            match buf.drain_to(&write_end).unwrap() {
                DrainOutcome::Wrote(0) => break,
                DrainOutcome::Wrote(_) => continue,
                DrainOutcome::WouldBlock => {
                    blocked_once = true;
                    break;
                }
            }
        }
        assert!(blocked_once, "expected the oversized write to eventually block");
    }
}
