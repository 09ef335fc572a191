//! The bidirectional relay loop: the central state machine of an attach
//! session.
//!
//! Single-threaded and readiness-driven, following the same shape as a
//! `mio`-based Unix domain socket server loop, but with exactly three kinds
//! of source instead of a listener-plus-clients set: standard input, the
//! one socket this process ever opens, and the signal self-pipes. Ownership
//! is strict — the socket, the scratch buffer, the input buffer, and
//! standard input's descriptor all belong to this loop and nothing else.

use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::buffer::{DrainOutcome, InputBuffer};
use crate::collab::{FrameWriter, InputFramer};
use crate::connector;
use crate::ctx::Ctx;
use crate::exit::{self, Category};
use crate::nonblock;
use crate::signal::{self, SignalSources};

/// Sent once, immediately after connect, so the master's input framer
/// recognizes a new attacher's presence as a no-op macro.
const HELLO_TOKEN: &[u8; 2] = b"\\N";

const STDIN: Token = Token(0);
const SOCKET: Token = Token(1);
const SIGNAL_BASE: usize = 2;

const SCRATCH_LEN: usize = 4096;

/// Runs the attach session described by `ctx` to completion.
///
/// `framer` turns raw stdin bytes into socket-destined bytes; `writer`
/// turns raw socket bytes into whatever the downstream sink expects;
/// `stdout` is where `writer`'s output is flushed. On every path except one
/// this function does not return: every exit is a call to
/// [`crate::exit::report`]. The one path that does return is the initial
/// connect failing while `ctx.noerror_mode` is set, per §4.E/§7 — a silent,
/// side-effect-free no-op.
pub fn run(
    ctx: &Ctx,
    framer: &mut impl InputFramer,
    writer: &mut impl FrameWriter,
    stdout: &mut impl Write,
) {
    let socket = match connector::connect(&ctx.socket_path) {
        Ok(fd) => fd,
        Err(err) => {
            if ctx.noerror_mode {
                tracing::debug!(error = %err, "initial connect failed; noerror_mode suppresses it");
                return;
            }
            exit::report(
                Category::Errno(err.raw_os_error().unwrap_or(0)),
                &format!("connect failed: {err}"),
                1,
            );
        }
    };

    if let Err(err) = nonblock::set_nonblocking(&socket, true) {
        report_fatal_io("fcntl on socket failed", &err);
    }
    let stdin = io::stdin();
    if let Err(err) = nonblock::set_nonblocking(&stdin, true) {
        report_fatal_io("fcntl on stdin failed", &err);
    }

    let mut signals = match signal::install() {
        Ok(s) => s,
        Err(err) => report_fatal_io("installing signal handlers failed", &err),
    };

    send_hello(&socket);

    if let Err(err) = run_loop(&socket, &stdin, &mut signals, framer, writer, stdout) {
        report_fatal_io("readiness loop failed", &err);
    }
}

fn report_fatal_io(prefix: &str, err: &io::Error) -> ! {
    exit::report(Category::Errno(err.raw_os_error().unwrap_or(0)), &format!("{prefix}: {err}"), 1)
}

/// Writes the hello token in full, looping over short writes on the
/// freshly connected (still blocking at this point, logically — the
/// descriptor has already been switched to non-blocking, but its send
/// buffer is empty immediately after connect) socket.
fn send_hello(socket: &OwnedFd) {
    let mut sent = 0;
    while sent < HELLO_TOKEN.len() {
        let raw = socket.as_raw_fd();
        let rc = unsafe {
            libc::write(raw, HELLO_TOKEN[sent..].as_ptr().cast(), HELLO_TOKEN.len() - sent)
        };
        if rc >= 0 {
            sent += rc as usize;
            continue;
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
            _ => report_fatal_io("writing hello token failed", &err),
        }
    }
}

enum ReadOutcome {
    Data(usize),
    Eof,
    WouldBlock,
}

/// A single non-blocking `read(2)`, normalizing `EINTR` the same way as
/// `EAGAIN`/`EWOULDBLOCK`: both mean "nothing to do this iteration", since
/// the readiness primitive will simply present the descriptor again.
fn raw_read(fd: RawFd, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if rc > 0 {
        Ok(ReadOutcome::Data(rc as usize))
    } else if rc == 0 {
        Ok(ReadOutcome::Eof)
    } else {
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(ReadOutcome::WouldBlock),
            _ => Err(err),
        }
    }
}

fn run_loop(
    socket: &OwnedFd,
    stdin: &io::Stdin,
    signals: &mut SignalSources,
    framer: &mut impl InputFramer,
    writer: &mut impl FrameWriter,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let socket_raw = socket.as_raw_fd();
    let stdin_raw = stdin.as_raw_fd();

    let mut poll = Poll::new()?;
    let registry = poll.registry();
    registry.register(&mut SourceFd(&stdin_raw), STDIN, Interest::READABLE)?;
    registry.register(&mut SourceFd(&socket_raw), SOCKET, Interest::READABLE)?;
    for (i, source) in signals.sources.iter().enumerate() {
        let raw = source.as_unix_stream().as_raw_fd();
        registry.register(&mut SourceFd(&raw), Token(SIGNAL_BASE + i), Interest::READABLE)?;
    }

    let mut input_buffer = InputBuffer::new();
    let mut socket_backpressured = false;
    let mut stdin_open = true;
    let mut scratch = [0u8; SCRATCH_LEN];
    let mut decoded = Vec::new();
    let mut stdin_carry = Vec::new();
    let mut events = Events::with_capacity(16);

    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                _ => return Err(err),
            }
        }

        let mut signal_index = None;
        let mut socket_readable = false;
        let mut stdin_readable = false;
        let mut socket_writable = false;
        for event in events.iter() {
            match event.token() {
                STDIN => stdin_readable = event.is_readable(),
                SOCKET => {
                    socket_readable |= event.is_readable();
                    socket_writable |= event.is_writable();
                }
                Token(n) if n >= SIGNAL_BASE => signal_index = Some(n - SIGNAL_BASE),
                _ => {}
            }
        }

        // Ordering per the relay loop's event-handling contract: a pending
        // signal always wins, then inbound socket data, then outbound
        // stdin data, then draining whatever that stdin read queued up.
        if let Some(index) = signal_index {
            signals.handle(index);
        }

        if socket_readable {
            match raw_read(socket_raw, &mut scratch)? {
                ReadOutcome::Eof => exit::report(Category::Plain, "EOF - dtach terminating", 0),
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Data(n) => {
                    decoded.clear();
                    writer.write_frame(&scratch[..n], &mut decoded);
                    stdout.write_all(&decoded)?;
                    stdout.flush()?;
                }
            }
        }

        if stdin_open && stdin_readable {
            match raw_read(stdin_raw, &mut scratch)? {
                ReadOutcome::Eof => {
                    poll.registry().deregister(&mut SourceFd(&stdin_raw))?;
                    stdin_open = false;
                }
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Data(n) => {
                    stdin_carry.extend_from_slice(&scratch[..n]);
                    decoded.clear();
                    let consumed = framer.forward_inbound_frames(&stdin_carry, &mut decoded);
                    stdin_carry.drain(0..consumed);
                    input_buffer.append(&decoded);
                }
            }
        }

        if socket_writable && !input_buffer.is_idle() {
            match input_buffer.drain_to(socket)? {
                DrainOutcome::Wrote(_) | DrainOutcome::WouldBlock => {}
            }
        }

        let should_backpressure = !input_buffer.is_idle();
        if should_backpressure != socket_backpressured {
            let interest = if should_backpressure {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            poll.registry().reregister(&mut SourceFd(&socket_raw), SOCKET, interest)?;
            socket_backpressured = should_backpressure;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::PassThrough;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    #[test]
    fn noerror_mode_silently_returns_on_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Ctx::new(dir.path().join("missing.sock")).with_noerror_mode(true);
        let mut framer = PassThrough;
        let mut writer = PassThrough;
        let mut stdout = Vec::new();

        // Must return rather than calling exit::report, which would tear
        // down the test process.
        run(&ctx, &mut framer, &mut writer, &mut stdout);
        assert!(stdout.is_empty());
    }

    #[test]
    fn send_hello_writes_the_two_byte_token() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let owned: OwnedFd = ours.into();
        send_hello(&owned);

        let mut buf = [0u8; 2];
        let mut theirs = theirs;
        theirs.set_read_timeout(Some(std::time::Duration::from_secs(1))).unwrap();
        theirs.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, HELLO_TOKEN);
    }

    #[test]
    fn raw_read_reports_data_then_eof() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        unsafe {
            libc::write(write_fd, b"hi".as_ptr().cast(), 2);
            libc::close(write_fd);
        }

        let mut buf = [0u8; 16];
        match raw_read(read_fd, &mut buf).unwrap() {
            ReadOutcome::Data(n) => assert_eq!(&buf[..n], b"hi"),
            _ => panic!("expected data"),
        }
        match raw_read(read_fd, &mut buf).unwrap() {
            ReadOutcome::Eof => {}
            _ => panic!("expected eof after the writer closed"),
        }
        unsafe { libc::close(read_fd) };
    }

    #[test]
    fn raw_read_reports_would_block_on_an_empty_nonblocking_pipe() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);
        unsafe {
            let flags = libc::fcntl(read_fd, libc::F_GETFL);
            libc::fcntl(read_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }

        let mut buf = [0u8; 16];
        match raw_read(read_fd, &mut buf).unwrap() {
            ReadOutcome::WouldBlock => {}
            _ => panic!("expected would-block on an empty non-blocking pipe"),
        }
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
