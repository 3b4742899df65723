//! Runtime context and the single-threaded control loop step.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{info, warn};

use crate::board::{Board, SimulatedBoard};
use crate::command::{CommandTable, DispatchOutcome};
use crate::console::{Console, OutputSink, TelnetControl};
use crate::cursor::TokenCursor;
use crate::error::RuntimeError;
use crate::handlers;
use crate::messaging::{Messenger, NullMessenger, StatusPublisher};
use crate::persist::{MemoryRegion, PersistenceAdapter};
use crate::queue::{CommandQueue, CommandSender};
use crate::scheduler::{Clock, StdClock, TimerTable};
use crate::sensors::SensorRegistry;
use crate::store::{KeyFilter, StateStore};
use crate::value::StateValue;
use crate::widgets::WidgetRegistry;

/// Firmware identifier published under [`FIRMWARE_KEY`].
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FIRMWARE_KEY: &str = "firmware";

/// Everything a command handler may touch.
pub struct RuntimeContext {
    pub store: StateStore,
    pub persistence: PersistenceAdapter,
    pub widgets: WidgetRegistry,
    pub messenger: Arc<dyn Messenger>,
    pub board: Box<dyn Board>,
    pub sensors: SensorRegistry,
    pub timers: TimerTable,
    pub console: Console,
    pub telnet: TelnetControl,
    pub clock: Arc<dyn Clock>,
    /// Output pins bound to state keys by `button`/`pwm` declarations.
    pub outputs: IndexMap<SmolStr, u8>,
    /// Producer handle for transports started by handlers.
    pub commands: CommandSender,
    pub reboot: bool,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("store", &self.store)
            .field("persistence", &self.persistence)
            .field("widgets", &self.widgets.len())
            .field("sensors", &self.sensors.len())
            .field("timers", &self.timers.len())
            .field("outputs", &self.outputs)
            .field("reboot", &self.reboot)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Writes the persisted partition to storage.
    pub fn save(&self) -> Result<usize, RuntimeError> {
        self.persistence.save(&self.store)
    }

    /// Loads stored configuration into the persisted partition.
    pub fn load(&mut self) -> Result<usize, RuntimeError> {
        self.persistence.load(&mut self.store)
    }

    pub fn println(&mut self, line: &str) {
        self.console.println(line);
    }
}

/// Builder for [`Runtime`]; every collaborator has an in-process default.
#[derive(Default)]
pub struct RuntimeBuilder {
    persistence: Option<PersistenceAdapter>,
    messenger: Option<Arc<dyn Messenger>>,
    board: Option<Box<dyn Board>>,
    clock: Option<Arc<dyn Clock>>,
    telnet_host: Option<SmolStr>,
    sinks: Vec<(SmolStr, Box<dyn OutputSink>)>,
    queue: Option<CommandQueue>,
}

impl RuntimeBuilder {
    #[must_use]
    pub fn with_storage(mut self, persistence: PersistenceAdapter) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    #[must_use]
    pub fn with_board(mut self, board: Box<dyn Board>) -> Self {
        self.board = Some(board);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_telnet_host(mut self, host: impl Into<SmolStr>) -> Self {
        self.telnet_host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, name: impl Into<SmolStr>, sink: Box<dyn OutputSink>) -> Self {
        self.sinks.push((name.into(), sink));
        self
    }

    /// Uses an existing queue, e.g. one whose sender was handed to a
    /// transport before the runtime was built.
    #[must_use]
    pub fn with_queue(mut self, queue: CommandQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn build(self) -> Runtime {
        let queue = self.queue.unwrap_or_default();
        let messenger = self
            .messenger
            .unwrap_or_else(|| Arc::new(NullMessenger));
        let mut store = StateStore::new();
        store.subscribe(KeyFilter::All, StatusPublisher::new(messenger.clone()));
        store.write_live(FIRMWARE_KEY, FIRMWARE_VERSION);

        let mut console = Console::new();
        for (name, sink) in self.sinks {
            console.attach(name, sink);
        }

        let context = RuntimeContext {
            store,
            persistence: self
                .persistence
                .unwrap_or_else(|| PersistenceAdapter::memory(MemoryRegion::new())),
            widgets: WidgetRegistry::new(),
            messenger,
            board: self
                .board
                .unwrap_or_else(|| Box::new(SimulatedBoard::new())),
            sensors: SensorRegistry::new(),
            timers: TimerTable::new(),
            console,
            telnet: self
                .telnet_host
                .map_or_else(TelnetControl::default, TelnetControl::new),
            clock: self.clock.unwrap_or_else(|| Arc::new(StdClock::new())),
            outputs: IndexMap::new(),
            commands: queue.sender(),
            reboot: false,
        };

        let mut commands = CommandTable::new();
        handlers::register_defaults(&mut commands);

        Runtime {
            queue,
            commands,
            context,
        }
    }
}

/// Owns the queue, the command table and the context handlers run against.
#[derive(Debug)]
pub struct Runtime {
    queue: CommandQueue,
    commands: CommandTable,
    context: RuntimeContext,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Runtime {
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    #[must_use]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RuntimeContext {
        &mut self.context
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.context.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.context.store
    }

    #[must_use]
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    #[must_use]
    pub fn sender(&self) -> CommandSender {
        self.queue.sender()
    }

    pub fn push(&self, line: impl Into<SmolStr>) {
        self.queue.push(line);
    }

    pub fn add_commands(&self, script: &str) -> usize {
        self.queue.add_commands(script)
    }

    pub fn register<F>(&mut self, name: impl Into<SmolStr>, handler: F)
    where
        F: Fn(&mut RuntimeContext, &mut TokenCursor<'_>) -> Result<(), RuntimeError> + 'static,
    {
        self.commands.register(name, handler);
    }

    /// Runs one line immediately, bypassing the queue.
    pub fn dispatch(&mut self, line: &str) -> DispatchOutcome {
        self.commands.dispatch(line, &mut self.context)
    }

    /// Pops and dispatches at most one queued line.
    pub fn step(&mut self) -> Option<DispatchOutcome> {
        let line = self.queue.pop()?;
        Some(self.dispatch(&line))
    }

    /// One control loop pass: service timers, then at most one queued line.
    pub fn tick(&mut self) -> Option<DispatchOutcome> {
        let now = self.context.clock.now();
        let ctx = &mut self.context;
        ctx.timers.service(now, &mut ctx.store);
        self.step()
    }

    /// Dispatches every queued line, including lines queued by handlers
    /// while draining.
    pub fn run_pending(&mut self) -> Vec<DispatchOutcome> {
        std::iter::from_fn(|| self.step()).collect()
    }

    /// Loads stored configuration at startup.
    ///
    /// A missing or unreadable document leaves the persisted partition empty
    /// and the runtime starts with defaults; returns the entries loaded.
    pub fn boot(&mut self) -> usize {
        match self.context.load() {
            Ok(count) => count,
            Err(err) if err.is_missing_document() => {
                info!(
                    region = self.context.persistence.region_name(),
                    "no stored configuration, starting fresh"
                );
                0
            }
            Err(err) => {
                warn!(%err, "stored configuration ignored");
                0
            }
        }
    }

    pub fn save(&self) -> Result<usize, RuntimeError> {
        self.context.save()
    }

    #[must_use]
    pub fn reboot_requested(&self) -> bool {
        self.context.reboot
    }

    /// Entry point for sensor drivers: records a reading in the live partition.
    pub fn report_reading(&mut self, key: &str, value: impl Into<StateValue>) {
        self.context.store.write_live(key, value);
    }

    /// Keys changed since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<SmolStr> {
        self.context.store.events_mut().drain()
    }
}
