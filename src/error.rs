//! Typed error taxonomy for Unix domain socket connection establishment.
//!
//! The socket connector (see [`crate::connector`]) never hands back a bare
//! [`io::Error`] to its caller: every failure mode it can produce is a
//! variant here, so call sites match on structure instead of sniffing
//! `io::ErrorKind` or formatted messages.

use std::io;

/// Everything that [`crate::connector::connect`] can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The socket path is longer than the kernel's `sun_path` capacity and
    /// either contains no `/` to split on, or the `chdir` fallback itself
    /// failed.
    #[error("socket path too long: {0}")]
    PathTooLong(#[source] io::Error),

    /// `stat` on the socket path failed with `ENOENT` or similar.
    #[error("no such path: {0}")]
    NoSuchPath(#[source] io::Error),

    /// A file exists at the path but is not a Unix domain socket (or is, in
    /// addition, a regular file).
    #[error("not a socket")]
    NotASocket,

    /// `connect` failed with `ECONNREFUSED`. A stale socket file may have
    /// been unlinked as a side effect; see [`crate::connector`].
    #[error("connection refused: {0}")]
    ConnectionRefused(#[source] io::Error),

    /// Any other `connect`/`socket`/`stat` failure that isn't one of the
    /// above — a one-off, non-retryable syscall failure.
    #[error("transient syscall failure: {0}")]
    Transient(#[source] io::Error),
}

impl ConnectError {
    /// The errno this error carries, if any, for use by the Exit Reporter's
    /// errno-annotated message format.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::PathTooLong(e)
            | Self::NoSuchPath(e)
            | Self::ConnectionRefused(e)
            | Self::Transient(e) => e.raw_os_error(),
            Self::NotASocket => None,
        }
    }
}
