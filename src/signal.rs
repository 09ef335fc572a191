//! Signal-to-exit translation via the self-pipe trick.
//!
//! Signal handlers must only call async-signal-safe functions, so no
//! handler here calls the exit reporter directly. Instead, each handled
//! signal gets its own pipe registered with
//! [`signal_hook::low_level::pipe::register`], which writes a single
//! placeholder byte into the pipe from handler context. The relay loop
//! polls every pipe's read end like any other source and, since each pipe
//! is wired to exactly one signal, knows which signal fired without
//! needing the byte's value — `signal_hook`'s pipe registration does not
//! guarantee the byte carries the signal number, only that a byte arrives.

use std::io;
use std::io::Read;
use std::os::unix::net::UnixStream;

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};

use crate::exit::{self, Category};

/// What a received signal means for the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// An ordinary detach event: the user closed the controlling terminal
    /// or pressed the interrupt key. Reported without an errno annotation.
    Detach,
    /// Something unexpected: reported with an errno annotation.
    Unexpected,
}

/// Maps a raw signal number to the disposition described in the signal
/// handler table.
pub fn disposition(signum: i32) -> Disposition {
    match signum {
        SIGHUP | SIGINT => Disposition::Detach,
        _ => Disposition::Unexpected,
    }
}

/// Terminates the process the way [`crate::exit`] expects for a received
/// signal, per the signal handler table: `SIGHUP`/`SIGINT` get a plain
/// "detached with signal" message, everything else handled here
/// (`SIGTERM`/`SIGQUIT`) gets an errno-annotated "unexpected signal"
/// message. Never returns.
pub fn report_signal(signum: i32) -> ! {
    match disposition(signum) {
        Disposition::Detach => {
            exit::report(Category::Plain, &format!("detached with signal: {signum}"), 1)
        }
        // The errno slot is always 0 here: a received signal carries no OS
        // errno of its own, but the category still marks this as an
        // unexpected/error-class termination rather than an ordinary detach.
        Disposition::Unexpected => {
            exit::report(Category::Errno(0), &format!("unexpected signal: {signum}"), 1)
        }
    }
}

/// One self-pipe read end, tagged with the signal number it was wired to.
pub struct SignalSource {
    pub signum: i32,
    reader: UnixStream,
}

impl SignalSource {
    /// The descriptor the relay loop should register for read-readiness.
    pub fn as_unix_stream(&self) -> &UnixStream {
        &self.reader
    }

    /// Drains whatever placeholder bytes are pending. The count is
    /// meaningless — any byte at all means the signal fired at least once
    /// — but draining keeps the pipe from reporting spurious readiness on
    /// a hypothetical future iteration (there won't be one: the caller
    /// always follows this with [`report_signal`], which never returns).
    fn drain(&mut self) {
        let mut buf = [0u8; 32];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

/// The full set of self-pipes installed by [`install`].
pub struct SignalSources {
    pub sources: Vec<SignalSource>,
}

impl SignalSources {
    /// Drains `source` and reports its signal via the exit reporter. Never
    /// returns.
    pub fn handle(&mut self, index: usize) -> ! {
        let source = &mut self.sources[index];
        source.drain();
        report_signal(source.signum)
    }
}

/// Installs handlers for every signal in the handler table (§4.C):
/// `SIGPIPE`/`SIGXFSZ` are ignored outright, while
/// `SIGHUP`/`SIGINT`/`SIGTERM`/`SIGQUIT` each get their own self-pipe for
/// the relay loop to poll and translate.
pub fn install() -> io::Result<SignalSources> {
    // SIGPIPE and SIGXFSZ are ignored unconditionally: a write to a socket
    // whose peer vanished, or a write past the file-size limit, must
    // surface as an ordinary errno on the syscall, not tear down the
    // process.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGXFSZ, libc::SIG_IGN);
    }

    let mut sources = Vec::new();
    for signum in [SIGHUP, SIGINT, SIGTERM, SIGQUIT] {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        signal_hook::low_level::pipe::register(signum, writer)?;
        sources.push(SignalSource { signum, reader });
    }

    Ok(SignalSources { sources })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_signals_are_plain() {
        assert_eq!(disposition(SIGHUP), Disposition::Detach);
        assert_eq!(disposition(SIGINT), Disposition::Detach);
    }

    #[test]
    fn other_terminating_signals_are_unexpected() {
        assert_eq!(disposition(SIGTERM), Disposition::Unexpected);
        assert_eq!(disposition(SIGQUIT), Disposition::Unexpected);
    }

    #[test]
    fn installed_pipe_wakes_up_on_its_own_signal() {
        let mut sources = install().expect("signal handlers should install");
        let hup_index = sources.sources.iter().position(|s| s.signum == SIGHUP).unwrap();

        unsafe { libc::raise(SIGHUP) };
        // Give the handler a moment to run; it only performs a single
        // async-signal-safe write, so this should be effectively instant.
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut buf = [0u8; 1];
        let n = sources.sources[hup_index]
            .reader
            .read(&mut buf)
            .expect("the self-pipe should have a byte waiting");
        assert_eq!(n, 1);
    }
}
