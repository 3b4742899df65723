//! Console output and line transports.

#![allow(missing_docs)]

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::queue::CommandSender;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// Upper bound on one broadcast write; a client that stays stalled longer is dropped.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Receives text printed by command handlers.
pub trait OutputSink: Send {
    fn write_line(&mut self, line: &str) -> Result<(), RuntimeError>;
}

/// Handler output fan-out: every line goes to the log and to each attached sink.
#[derive(Default)]
pub struct Console {
    sinks: IndexMap<SmolStr, Box<dyn OutputSink>>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Console {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sink under `name`, replacing any sink with that name.
    pub fn attach(&mut self, name: impl Into<SmolStr>, sink: Box<dyn OutputSink>) {
        self.sinks.insert(name.into(), sink);
    }

    pub fn detach(&mut self, name: &str) -> bool {
        self.sinks.shift_remove(name).is_some()
    }

    #[must_use]
    pub fn has_sink(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    pub fn println(&mut self, line: &str) {
        info!(target: "hearth::console", "{line}");
        for (name, sink) in &mut self.sinks {
            if let Err(err) = sink.write_line(line) {
                debug!(sink = name.as_str(), %err, "console sink write failed");
            }
        }
    }
}

/// Writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|err| RuntimeError::Transport(format!("{err}").into()))
    }
}

/// Keeps printed lines in memory; clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }
}

impl OutputSink for MemorySink {
    fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

#[derive(Debug)]
struct TelnetClient {
    peer: SocketAddr,
    stream: TcpStream,
}

type ClientList = Arc<Mutex<Vec<TelnetClient>>>;

/// Line-oriented TCP console.
///
/// Each received line is pushed to the command queue; console output is
/// broadcast to every connected client through [`TelnetServer::sink`].
#[derive(Debug)]
pub struct TelnetServer {
    local_addr: SocketAddr,
    clients: ClientList,
    shutdown: Arc<AtomicBool>,
}

impl TelnetServer {
    pub fn start(addr: &str, commands: CommandSender) -> Result<Self, RuntimeError> {
        let listener = TcpListener::bind(addr)
            .map_err(|err| RuntimeError::Transport(format!("bind {addr}: {err}").into()))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| RuntimeError::Transport(format!("nonblocking {addr}: {err}").into()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| RuntimeError::Transport(format!("local addr {addr}: {err}").into()))?;
        let clients: ClientList = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_clients = clients.clone();
        let accept_shutdown = shutdown.clone();
        thread::Builder::new()
            .name("hearth-telnet".into())
            .spawn(move || accept_loop(&listener, &accept_clients, &accept_shutdown, &commands))
            .map_err(|err| RuntimeError::Transport(format!("spawn telnet thread: {err}").into()))?;

        info!(%local_addr, "telnet console listening");
        Ok(Self {
            local_addr,
            clients,
            shutdown,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Output sink that broadcasts to the connected clients.
    #[must_use]
    pub fn sink(&self) -> TelnetSink {
        TelnetSink {
            clients: self.clients.clone(),
        }
    }

    /// Stops accepting and disconnects every client.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for client in self.clients.lock().drain(..) {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
        info!(local_addr = %self.local_addr, "telnet console stopped");
    }
}

impl Drop for TelnetServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: &TcpListener,
    clients: &ClientList,
    shutdown: &AtomicBool,
    commands: &CommandSender,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = stream
                    .set_nonblocking(false)
                    .and_then(|()| stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT)))
                {
                    warn!(%peer, %err, "telnet client rejected");
                    continue;
                }
                let reader = match stream.try_clone() {
                    Ok(clone) => clone,
                    Err(_) => continue,
                };
                debug!(%peer, "telnet client connected");
                clients.lock().push(TelnetClient { peer, stream });
                let commands = commands.clone();
                let client_list = clients.clone();
                let spawned = thread::Builder::new()
                    .name("hearth-telnet-client".into())
                    .spawn(move || {
                        handle_client(reader, &commands, peer);
                        forget_client(&client_list, peer);
                    });
                if let Err(err) = spawned {
                    warn!(%peer, %err, "telnet client thread failed to start");
                    forget_client(clients, peer);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!(%err, "telnet accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn handle_client(stream: TcpStream, commands: &CommandSender, peer: SocketAddr) {
    let reader = BufReader::new(stream);
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !commands.push(line) {
            break;
        }
    }
    debug!(%peer, "telnet client disconnected");
}

fn forget_client(clients: &ClientList, peer: SocketAddr) {
    clients.lock().retain(|client| {
        if client.peer == peer {
            let _ = client.stream.shutdown(Shutdown::Both);
            false
        } else {
            true
        }
    });
}

/// Broadcast side of a [`TelnetServer`]; clients that fail or stall a write are dropped.
#[derive(Debug, Clone)]
pub struct TelnetSink {
    clients: ClientList,
}

impl OutputSink for TelnetSink {
    fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        self.clients.lock().retain_mut(|client| {
            match write!(client.stream, "{line}\r\n") {
                Ok(()) => true,
                Err(err) => {
                    debug!(peer = %client.peer, %err, "telnet client dropped");
                    let _ = client.stream.shutdown(Shutdown::Both);
                    false
                }
            }
        });
        Ok(())
    }
}

/// Start/stop state of the telnet console, driven by the `telnet` command.
#[derive(Debug)]
pub struct TelnetControl {
    host: SmolStr,
    server: Option<TelnetServer>,
}

impl Default for TelnetControl {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl TelnetControl {
    /// Name under which the broadcast sink is attached to the console.
    pub const SINK: &'static str = "telnet";

    #[must_use]
    pub fn new(host: impl Into<SmolStr>) -> Self {
        Self {
            host: host.into(),
            server: None,
        }
    }

    #[must_use]
    pub fn server(&self) -> Option<&TelnetServer> {
        self.server.as_ref()
    }

    /// Starts listening on `port` (0 picks a free port), replacing a running server.
    pub fn enable(
        &mut self,
        port: u16,
        commands: CommandSender,
        console: &mut Console,
    ) -> Result<SocketAddr, RuntimeError> {
        self.disable(console);
        let server = TelnetServer::start(&format!("{}:{port}", self.host), commands)?;
        let addr = server.local_addr();
        console.attach(Self::SINK, Box::new(server.sink()));
        self.server = Some(server);
        Ok(addr)
    }

    pub fn disable(&mut self, console: &mut Console) -> bool {
        console.detach(Self::SINK);
        match self.server.take() {
            Some(server) => {
                server.stop();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CommandQueue;
    use std::time::Instant;

    #[test]
    fn console_fans_out_to_sinks() {
        let mut console = Console::new();
        let first = MemorySink::new();
        let second = MemorySink::new();
        console.attach("a", Box::new(first.clone()));
        console.attach("b", Box::new(second.clone()));
        console.println("hello");
        assert!(console.detach("b"));
        console.println("again");
        assert_eq!(first.lines(), vec!["hello", "again"]);
        assert_eq!(second.lines(), vec!["hello"]);
    }

    #[test]
    fn telnet_lines_reach_queue_and_output_reaches_client() {
        let queue = CommandQueue::new();
        let mut console = Console::new();
        let mut control = TelnetControl::new("127.0.0.1");
        let addr = control
            .enable(0, queue.sender(), &mut console)
            .expect("telnet start");

        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(b"switch alpha 1\r\n").expect("send");

        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(queue.pop().as_deref(), Some("switch alpha 1"));

        let server = control.server().expect("server");
        while server.client_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        console.println("ok");
        let mut reader = BufReader::new(client.try_clone().expect("clone"));
        let mut line = String::new();
        reader.read_line(&mut line).expect("read");
        assert_eq!(line, "ok\r\n");

        assert!(control.disable(&mut console));
        assert!(!console.has_sink(TelnetControl::SINK));
    }

    fn wait_for_clients(server: &TelnetServer, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.client_count() != count {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    fn stalled_client_does_not_block_output() {
        let queue = CommandQueue::new();
        let mut console = Console::new();
        let mut control = TelnetControl::new("127.0.0.1");
        let addr = control
            .enable(0, queue.sender(), &mut console)
            .expect("telnet start");
        let _idle = TcpStream::connect(addr).expect("connect");
        let server = control.server().expect("server");
        assert!(wait_for_clients(server, 1));

        let chunk = "x".repeat(64 * 1024);
        let started = Instant::now();
        for _ in 0..512 {
            console.println(&chunk);
        }
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn disconnected_client_is_forgotten() {
        let queue = CommandQueue::new();
        let mut console = Console::new();
        let mut control = TelnetControl::new("127.0.0.1");
        let addr = control
            .enable(0, queue.sender(), &mut console)
            .expect("telnet start");
        let client = TcpStream::connect(addr).expect("connect");
        let server = control.server().expect("server");
        assert!(wait_for_clients(server, 1));
        drop(client);
        assert!(wait_for_clients(server, 0));
    }
}
