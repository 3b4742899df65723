//! CLI definitions for hearth-runtime.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hearth-runtime",
    version,
    about = "Home-automation controller runtime",
    after_help = "Examples:\n  hearth-runtime run --config hearth.toml\n  hearth-runtime check boot.txt\n  hearth-runtime dump --config hearth.toml"
)]
pub struct Cli {
    /// Log at debug level regardless of log.level.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load stored state, run the boot script and serve consoles.
    Run {
        /// Configuration file (defaults to ./hearth.toml when present).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Boot script overriding device.script.
        #[arg(long)]
        script: Option<PathBuf>,
        /// Do not read commands from stdin.
        #[arg(long, action = ArgAction::SetTrue)]
        no_console: bool,
    },
    /// Report unknown commands in a script without executing it.
    Check {
        /// Script file to check.
        script: PathBuf,
    },
    /// Print the stored configuration document.
    Dump {
        /// Configuration file naming the storage path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
