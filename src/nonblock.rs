//! Non-blocking configuration for standard input and the connected socket.
//!
//! The relay loop multiplexes by readiness and must never block on any
//! descriptor other than the readiness primitive itself (`mio::Poll`), so
//! both descriptors it owns are switched to `O_NONBLOCK` before the loop's
//! first iteration.

use std::io;
use std::os::fd::AsRawFd;

fn get_status_flags(fd: libc::c_int) -> io::Result<libc::c_int> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(flags)
    }
}

fn set_status_flags(fd: libc::c_int, flags: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Sets or clears `O_NONBLOCK` on `fd`.
pub fn set_nonblocking(fd: &impl AsRawFd, nonblocking: bool) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let old_flags = get_status_flags(raw)?;
    let new_flags =
        if nonblocking { old_flags | libc::O_NONBLOCK } else { old_flags & !libc::O_NONBLOCK };
    set_status_flags(raw, new_flags)
}
