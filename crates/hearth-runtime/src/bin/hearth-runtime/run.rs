//! Runtime subcommands.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use hearth_runtime::config::{RuntimeConfig, DEFAULT_CONFIG_FILE};
use hearth_runtime::console::StdoutSink;
use hearth_runtime::cursor::TokenCursor;
use hearth_runtime::messaging::{Messenger, MqttMessenger, NullMessenger};
use hearth_runtime::persist::{decode_document, FileRegion, PersistenceAdapter, StorageRegion};
use hearth_runtime::queue::{script_lines, CommandQueue, CommandSender};
use hearth_runtime::scheduler::{Clock, StdClock};
use hearth_runtime::Runtime;

pub fn run_runtime(
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    no_console: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    init_logging(if verbose {
        "debug"
    } else {
        config.log_level.as_str()
    });
    info!(device = config.device_name.as_str(), "starting");

    let queue = CommandQueue::new();
    let messenger: Arc<dyn Messenger> = match config.mqtt.clone() {
        Some(settings) => Arc::new(MqttMessenger::connect(settings, queue.sender())?),
        None => Arc::new(NullMessenger),
    };

    let mut builder = Runtime::builder()
        .with_storage(PersistenceAdapter::file(
            config.storage_path.clone(),
            config.write_mode,
        ))
        .with_messenger(messenger);
    if let Some((host, _)) = &config.telnet_listen {
        builder = builder.with_telnet_host(host.clone());
    }
    let stdin_console = config.console_stdin && !no_console;
    if stdin_console {
        builder = builder.with_output("stdout", Box::new(StdoutSink));
        spawn_stdin_console(queue.sender())?;
    }
    let mut runtime = builder.with_queue(queue).build();

    let loaded = runtime.boot();
    info!(entries = loaded, "stored configuration loaded");
    if let Some((_, port)) = &config.telnet_listen {
        runtime.push(format!("telnet 1 {port}"));
    }
    if let Some(path) = script.or_else(|| config.script.clone()) {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read boot script {}", path.display()))?;
        let queued = runtime.add_commands(&text);
        info!(script = %path.display(), lines = queued, "boot script queued");
    }

    let clock = StdClock::new();
    let mut next = clock.now();
    loop {
        runtime.tick();
        if runtime.reboot_requested() {
            break;
        }
        if runtime.queue().is_empty() {
            next += config.tick;
            clock.sleep_until(next);
        } else {
            next = clock.now();
        }
    }
    info!("reboot requested, stopping");
    Ok(())
}

pub fn run_check(script: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("read script {}", script.display()))?;
    let runtime = Runtime::default();
    let mut unknown = 0usize;
    let mut total = 0usize;
    for line in script_lines(&text) {
        total += 1;
        let name = TokenCursor::new(line).next();
        if !runtime.commands().contains(name) {
            unknown += 1;
            println!("unknown command '{name}': {line}");
        }
    }
    if unknown > 0 {
        bail!("unknown command in {unknown} of {total} lines");
    }
    println!("{total} lines ok");
    Ok(())
}

pub fn run_dump(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let region = FileRegion::new(config.storage_path.clone());
    let Some(bytes) = region.read()? else {
        bail!("no stored document in '{}'", region.name());
    };
    let entries = decode_document(&bytes)?;
    for (key, value) in &entries {
        println!("{key} = {value}");
    }
    println!("{} entries", entries.len());
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => Ok(RuntimeConfig::load(&path)?),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                Ok(RuntimeConfig::load(default)?)
            } else {
                Ok(RuntimeConfig::default())
            }
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default()
            .add_directive(level.parse().unwrap_or_else(|_| Level::INFO.into()))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spawn_stdin_console(commands: CommandSender) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("hearth-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !commands.push(line) {
                    break;
                }
            }
            debug!("stdin console closed");
        })
        .context("spawn stdin console")?;
    Ok(())
}
