//! Unix domain socket connection establishment.
//!
//! Mirrors the syscall-wrapping style of a small socket library: each
//! raw `libc` call is checked inline and translated into an `io::Error`
//! via [`std::io::Error::last_os_error`], then folded into a
//! [`ConnectError`] variant by [`connect`].

use crate::error::ConnectError;
use std::ffi::CString;
use std::fs;
use std::io;
use std::mem::{size_of, zeroed};
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum path length accepted directly by `connect(2)` for a Unix domain
/// socket, derived the way `sockaddr_un`'s layout defines it: the whole
/// struct minus the leading `sa_family_t` field. 108 on Linux, 104 on the
/// BSD family (which also reserves a leading length byte we don't model
/// here since this crate targets Linux-style `sockaddr_un`).
pub const MAX_UDSOCKET_PATH_LEN: usize = {
    size_of::<libc::sockaddr_un>() - size_of::<libc::sa_family_t>()
};

/// Socket files untouched for longer than this are considered abandoned by
/// a crashed master and eligible for unlinking when they also refuse
/// connections.
const STALENESS_THRESHOLD: Duration = Duration::from_secs(300);

fn create_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

fn build_sockaddr(path: &CString) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut addr: libc::sockaddr_un = unsafe { zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let bytes = path.as_bytes_with_nul();
    if bytes.len() > MAX_UDSOCKET_PATH_LEN {
        return Err(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
    }
    for (dst, &src) in addr.sun_path.iter_mut().zip(bytes.iter()) {
        *dst = src as libc::c_char;
    }
    let addrlen = (size_of::<libc::sa_family_t>() + bytes.len()) as libc::socklen_t;
    Ok((addr, addrlen))
}

fn connect_raw(fd: &OwnedFd, addr: &libc::sockaddr_un, addrlen: libc::socklen_t) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    let rc = unsafe {
        libc::connect(fd.as_raw_fd(), (addr as *const libc::sockaddr_un).cast(), addrlen)
    };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Attempts a single `socket()` + `connect()` against `path` with no
/// fallback logic of any kind.
fn connect_direct(path: &Path) -> io::Result<OwnedFd> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "socket path contains a NUL byte"))?;
    let (addr, addrlen) = build_sockaddr(&cpath)?;
    let fd = create_socket()?;
    connect_raw(&fd, &addr, addrlen)?;
    Ok(fd)
}

/// Splits `path` at its last `/` into `(dir, basename)`. Returns `None` if
/// there is no `/` to split on, in which case the path-length fallback
/// cannot be attempted.
fn split_at_last_slash(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let s = path.as_os_str().as_bytes();
    let idx = s.iter().rposition(|&b| b == b'/')?;
    let basename = std::ffi::OsStr::from_bytes(&s[idx + 1..]);
    if basename.is_empty() {
        return None;
    }
    let dir = if idx == 0 { PathBuf::from("/") } else { PathBuf::from(std::ffi::OsStr::from_bytes(&s[..idx])) };
    Some((dir, PathBuf::from(basename)))
}

/// Retries the connection with the working directory temporarily changed to
/// `dir`, using only `basename` as the socket path. Restores the original
/// working directory unconditionally, even if the retried connect failed.
fn connect_via_chdir(dir: &Path, basename: &Path) -> io::Result<OwnedFd> {
    let saved_cwd_fd = unsafe { libc::open(b".\0".as_ptr().cast(), libc::O_RDONLY) };
    if saved_cwd_fd == -1 {
        return Err(io::Error::last_os_error());
    }
    let saved_cwd = unsafe { OwnedFd::from_raw_fd(saved_cwd_fd) };

    let chdir_cstr = CString::new(dir.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "directory contains a NUL byte"))?;
    let chdir_rc = unsafe { libc::chdir(chdir_cstr.as_ptr()) };
    let result = if chdir_rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        connect_direct(basename)
    };

    // Restore the original working directory unconditionally.
    use std::os::fd::AsRawFd;
    unsafe { libc::fchdir(saved_cwd.as_raw_fd()) };

    result
}

/// `stat`s `path` and, if it names a stale Unix domain socket (older than
/// [`STALENESS_THRESHOLD`]), unlinks it. Returns `Ok(true)` if the file at
/// `path` is not a socket at all (or, defensively, is also a regular
/// file), in which case [`ConnectError::NotASocket`] should be surfaced
/// instead of `ConnectionRefused`.
///
/// A failed `unlink` (e.g. `ENOENT`, because another process already
/// cleaned up the file) is not treated as an error: cleanup racing with
/// another actor is expected, not exceptional.
fn handle_possibly_stale_socket(path: &Path) -> io::Result<bool> {
    let meta = fs::symlink_metadata(path)?;
    let mode = std::os::unix::fs::MetadataExt::mode(&meta);
    let is_socket = mode & libc::S_IFMT == libc::S_IFSOCK;
    let is_regular = mode & libc::S_IFMT == libc::S_IFREG;
    if !is_socket || is_regular {
        return Ok(true);
    }

    let ctime = std::os::unix::fs::MetadataExt::ctime(&meta);
    let ctime = UNIX_EPOCH + Duration::from_secs(ctime.max(0) as u64);
    if is_stale(ctime, SystemTime::now()) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// True iff a socket created at `ctime` is old enough, as of `now`, to be
/// considered abandoned by a crashed master.
fn is_stale(ctime: SystemTime, now: SystemTime) -> bool {
    now.duration_since(ctime).unwrap_or(Duration::ZERO) > STALENESS_THRESHOLD
}

/// Opens a client connection to the Unix domain socket at `path`.
///
/// See the module documentation and [`ConnectError`] for the full error
/// taxonomy. In short: an over-long path is retried via a `chdir`
/// fallback when it contains a `/`; a refused connection against a stale
/// socket file triggers a best-effort unlink as a side effect before the
/// refusal is surfaced.
pub fn connect(path: &Path) -> Result<OwnedFd, ConnectError> {
    match connect_direct(path) {
        Ok(fd) => Ok(fd),
        Err(err) if err.raw_os_error() == Some(libc::ENAMETOOLONG) => {
            match split_at_last_slash(path) {
                Some((dir, basename)) => {
                    connect_via_chdir(&dir, &basename).map_err(|e| classify(path, e))
                }
                None => Err(ConnectError::PathTooLong(err)),
            }
        }
        Err(err) => Err(classify(path, err)),
    }
}

fn classify(path: &Path, err: io::Error) -> ConnectError {
    match err.raw_os_error() {
        Some(libc::ENAMETOOLONG) => ConnectError::PathTooLong(err),
        Some(libc::ENOENT) => ConnectError::NoSuchPath(err),
        Some(libc::ECONNREFUSED) => match handle_possibly_stale_socket(path) {
            Ok(true) => ConnectError::NotASocket,
            Ok(false) => ConnectError::ConnectionRefused(err),
            Err(_) => ConnectError::ConnectionRefused(err),
        },
        _ => ConnectError::Transient(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn happy_path_connects_to_live_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let fd = connect(&path).expect("connect should succeed against a live listener");
        drop(fd);
    }

    #[test]
    fn missing_socket_is_no_such_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");

        let err = connect(&path).unwrap_err();
        assert!(matches!(err, ConnectError::NoSuchPath(_)));
    }

    #[test]
    fn regular_file_is_not_a_socket_and_is_not_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.sock");
        fs::write(&path, b"not a socket").unwrap();

        let err = connect(&path).unwrap_err();
        assert!(matches!(err, ConnectError::NotASocket));
        assert!(path.exists(), "a regular file must never be unlinked by the connector");
    }

    #[test]
    fn fresh_socket_file_with_no_listener_is_refused_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.sock");
        // Bind and immediately drop: leaves a socket file on disk (std's
        // UnixListener does not unlink on drop) with nothing listening, but
        // freshly created, so it must survive the staleness check.
        drop(UnixListener::bind(&path).unwrap());

        let err = connect(&path).unwrap_err();
        assert!(matches!(err, ConnectError::ConnectionRefused(_)));
        assert!(path.exists(), "a fresh socket file must not be unlinked");
    }

    #[test]
    fn path_length_fallback_reaches_the_same_socket() {
        let dir = tempfile::tempdir().unwrap();
        let short_path = dir.path().join("w.sock");
        let _listener = UnixListener::bind(&short_path).unwrap();

        // Build an artificially long (but valid) path to the same file by
        // padding with a deeply nested, `/`-separated prefix that resolves
        // via the real filesystem root rather than exceeding PATH_MAX.
        // Exercise split_at_last_slash + connect_via_chdir directly instead,
        // since constructing a >PATH_MAX path on disk isn't portable in a
        // test environment.
        let (parent, basename) = split_at_last_slash(&short_path).unwrap();
        assert_eq!(basename, Path::new("w.sock"));
        let fd = connect_via_chdir(&parent, &basename).expect("chdir fallback should connect");
        drop(fd);
    }

    #[test]
    fn staleness_threshold_is_300_seconds() {
        let now = UNIX_EPOCH + Duration::from_secs(10_000);
        assert!(!is_stale(now - Duration::from_secs(299), now));
        assert!(is_stale(now - Duration::from_secs(301), now));
    }

    #[test]
    fn max_path_len_matches_sockaddr_un_layout() {
        assert_eq!(
            MAX_UDSOCKET_PATH_LEN,
            size_of::<libc::sockaddr_un>() - size_of::<libc::sa_family_t>()
        );
    }
}
