//! The attach context: the one piece of state the host hands to the core.

use std::path::PathBuf;

/// Handle passed to the relay core by the surrounding program.
///
/// Created by the host before invoking [`crate::relay::run`], immutable for
/// the duration of the attach session, and dropped once the core returns
/// (which, per the relay loop's design, it normally never does — see
/// [`crate::relay`]).
#[derive(Debug, Clone)]
pub struct Ctx {
    /// Absolute or relative filesystem path to the master's Unix domain
    /// socket.
    pub socket_path: PathBuf,
    /// If true, a failed initial connection is a silent no-op rather than a
    /// fatal exit via the [`crate::exit`] reporter.
    pub noerror_mode: bool,
}

impl Ctx {
    /// Builds a context for attaching to the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into(), noerror_mode: false }
    }

    /// Sets [`Ctx::noerror_mode`].
    pub fn with_noerror_mode(mut self, noerror_mode: bool) -> Self {
        self.noerror_mode = noerror_mode;
        self
    }
}
