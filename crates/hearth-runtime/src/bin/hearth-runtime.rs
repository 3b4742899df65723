//! CLI entrypoint for the hearth controller runtime.

#[path = "hearth-runtime/cli.rs"]
mod cli;
#[path = "hearth-runtime/run.rs"]
mod run;

use clap::Parser;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    if let Err(err) = dispatch() {
        let message = format_error_with_tip(&err);
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
    Ok(())
}

fn dispatch() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            script,
            no_console,
        } => run::run_runtime(config, script, no_console, cli.verbose),
        Command::Check { script } => run::run_check(&script),
        Command::Dump { config } => run::run_dump(config),
    }
}

fn format_error_with_tip(err: &anyhow::Error) -> String {
    let message = format!("{err:#}");
    let tip = if message.contains("invalid config") {
        Some("Tip: check hearth.toml; every section is optional and unknown keys are rejected.")
    } else if message.contains("bind") && message.contains("in use") {
        Some("Tip: another console is listening on that port; change console.telnet_listen or stop it.")
    } else if message.contains("no stored document") {
        Some("Tip: nothing has been saved yet; run `save` from the console first.")
    } else if message.contains("unknown command") {
        Some("Tip: command names are case-sensitive, e.g. `buttonSet`, not `buttonset`.")
    } else {
        None
    };
    match tip {
        Some(tip) => format!("{message}\n{tip}"),
        None => message,
    }
}
