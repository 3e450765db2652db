//! watch-hook: SessionStart/SessionEnd hook that supervises `wb-grep watch`.
//!
//! Configured as a command hook; the host pipes the event JSON on stdin.
//! Every path exits 0 so a supervision problem never blocks the session.
//!
//! ## Subcommands
//!
//! - `handle` (default): dispatch on `hook_event_name`
//! - `start`: SessionStart handler, prints the acknowledgment JSON
//! - `stop`: SessionEnd handler
//! - `status`: list recorded watchers (JSON lines)

mod handle;
mod input;
mod logging;
mod status;

use clap::{Parser, Subcommand};
use watch_core::{Supervisor, WatchConfig};

#[derive(Parser)]
#[command(name = "watch-hook")]
#[command(about = "Session-scoped supervisor for wb-grep watch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event, dispatching on hook_event_name (reads JSON from stdin)
    Handle,

    /// Start the watcher for a session (reads JSON from stdin)
    Start,

    /// Stop the watcher for a session and clean up (reads JSON from stdin)
    Stop,

    /// Print every recorded watcher as a JSON line
    Status,
}

fn main() {
    let config = WatchConfig::from_env();
    let _logging_guard = logging::init(config.diagnostic_log());
    let cli = Cli::parse();
    let supervisor = Supervisor::new(config);

    match cli.command.unwrap_or(Commands::Handle) {
        Commands::Handle => handle::run(&supervisor, handle::Mode::Dispatch),
        Commands::Start => handle::run(&supervisor, handle::Mode::Start),
        Commands::Stop => handle::run(&supervisor, handle::Mode::Stop),
        Commands::Status => status::run(&supervisor),
    }
}
