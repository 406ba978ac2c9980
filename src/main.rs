//! Inspector CLI - session-based debugging for live browser tabs and
//! script runtimes
//!
//! Commands talk to a background daemon that holds the open sessions, so
//! breakpoints and paused state survive across invocations.

use clap::Parser;
use inspector::{cli, commands, common, daemon};

use commands::Commands;

#[derive(Parser)]
#[command(name = "inspector", about = "Session-based debugger for browser tabs and script runtimes")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Daemon => {
            common::logging::init_daemon();
            daemon::run(inspector::default_connector()).await
        }
        command => {
            common::logging::init_cli();
            cli::dispatch(command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
