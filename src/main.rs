//! Binary shell: parses arguments, wires up diagnostic logging, and hands
//! off to the relay core. None of this changes the core's observable
//! behavior — it exists only to make the crate runnable as a standalone
//! program.

use attach_relay::collab::PassThrough;
use attach_relay::{relay, Ctx};
use clap::Parser;

/// Attach to a detached terminal session over its Unix domain socket.
#[derive(Debug, Parser)]
#[command(name = "attach", version, about)]
struct AttachArgs {
    /// Path to the master's Unix domain socket.
    #[arg(long)]
    socket: std::path::PathBuf,

    /// Treat a failed initial connection as a silent no-op instead of a
    /// fatal error.
    #[arg(long)]
    no_error: bool,

    /// Raise diagnostic-logging verbosity. Repeatable; has no effect on
    /// the exit reporter's single termination line.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl From<AttachArgs> for Ctx {
    fn from(args: AttachArgs) -> Self {
        Ctx::new(args.socket).with_noerror_mode(args.no_error)
    }
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let default_directive = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() {
    let args = AttachArgs::parse();
    init_logging(args.verbose);
    attach_relay::procname::set_argv0("attach-", 'a');

    let ctx: Ctx = args.into();
    let mut framer = PassThrough;
    let mut writer = PassThrough;
    let mut stdout = std::io::stdout().lock();
    relay::run(&ctx, &mut framer, &mut writer, &mut stdout);
}
