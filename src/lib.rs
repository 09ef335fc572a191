//! Attach-side client for a detachable terminal multiplexer.
//!
//! Connects to a long-lived master process over a Unix domain socket and
//! relays bytes between standard input and that socket until a signal, a
//! socket close, or a fatal I/O error ends the session. See [`relay::run`]
//! for the entry point and [`exit`] for how the session reports the way it
//! ended.

pub mod buffer;
pub mod collab;
pub mod connector;
pub mod ctx;
pub mod error;
pub mod exit;
pub mod nonblock;
pub mod procname;
pub mod relay;
pub mod signal;

pub use ctx::Ctx;
pub use error::ConnectError;
