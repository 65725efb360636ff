//! Live-data channel.
//!
//! A WebSocket client on a background thread. Inbound text frames are
//! queued and drained with `poll_events()` on the caller's turn, so the
//! engine itself stays single-threaded. When the peer goes away the thread
//! reconnects until `close()` is called.

use crate::error::ChannelError;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the channel thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// The peer went away; another attempt follows after the delay.
    Reconnecting { attempt: u32 },
    /// A text payload.
    Message(String),
    Error { message: String },
}

/// Reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelOptions {
    pub reconnect_delay: Duration,
    /// `None` retries forever.
    pub max_reconnects: Option<u32>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            max_reconnects: None,
        }
    }
}

/// Sub-identifier carried by an MQTT-style topic: the text after the last
/// `/`. `None` for a topic without a separator or with nothing after it.
pub fn topic_sub_id(topic: &str) -> Option<&str> {
    let (_, last) = topic.rsplit_once('/')?;
    (!last.is_empty()).then_some(last)
}

enum Command {
    Send(String),
    Close,
}

/// Why a session ended.
enum SessionEnd {
    Closed,
    Lost,
}

pub struct LiveChannel {
    state: ConnectionState,
    url: Option<String>,
    events: Vec<ChannelEvent>,
    cmd_tx: Option<Sender<Command>>,
    event_rx: Option<Receiver<ChannelEvent>>,
    _thread: Option<JoinHandle<()>>,
    options: ChannelOptions,
}

impl LiveChannel {
    pub fn new() -> Self {
        Self::with_options(ChannelOptions::default())
    }

    pub fn with_options(options: ChannelOptions) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            url: None,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
            options,
        }
    }

    pub fn connect(&mut self, url: &str) -> Result<(), ChannelError> {
        if self.cmd_tx.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }
        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ChannelError::InvalidScheme(parsed.scheme().to_string()));
        }

        self.state = ConnectionState::Connecting;
        let (cmd_tx, cmd_rx) = channel::<Command>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();
        let target = url.to_string();
        let options = self.options;

        let handle = thread::spawn(move || run(&target, options, &cmd_rx, &event_tx));

        self.url = Some(url.to_string());
        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Close the connection and stop reconnecting.
    pub fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.url = None;
        self.state = ConnectionState::Disconnected;
    }

    pub fn send(&self, msg: &str) -> Result<(), ChannelError> {
        match &self.cmd_tx {
            Some(tx) => tx
                .send(Command::Send(msg.to_string()))
                .map_err(|e| ChannelError::SendFailed(e.to_string())),
            None => Err(ChannelError::NotConnected),
        }
    }

    /// Drain pending events (non-blocking). Once the reader thread has
    /// given up the channel is no longer open.
    pub fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut finished = false;
        if let Some(rx) = &self.event_rx {
            loop {
                let event = match rx.try_recv() {
                    Ok(event) => event,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                };
                match &event {
                    ChannelEvent::Connected => self.state = ConnectionState::Connected,
                    ChannelEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    ChannelEvent::Reconnecting { .. } => self.state = ConnectionState::Connecting,
                    ChannelEvent::Error { .. } => self.state = ConnectionState::Error,
                    ChannelEvent::Message(_) => {}
                }
                self.events.push(event);
            }
        }
        if finished {
            log::info!("Live channel to {} finished", self.url.as_deref().unwrap_or("?"));
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_open(&self) -> bool {
        self.cmd_tx.is_some()
    }
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveChannel")
            .field("state", &self.state)
            .field("url", &self.url)
            .finish()
    }
}

fn run(url: &str, options: ChannelOptions, cmd_rx: &Receiver<Command>, event_tx: &Sender<ChannelEvent>) {
    let mut attempt = 0u32;
    loop {
        log::info!("Live channel connecting to {}", url);
        match session(url, cmd_rx, event_tx) {
            Ok(SessionEnd::Closed) => break,
            Ok(SessionEnd::Lost) => attempt = 0,
            Err(message) => {
                log::error!("Live channel connection failed: {}", message);
                let _ = event_tx.send(ChannelEvent::Error { message });
            }
        }

        attempt += 1;
        if options.max_reconnects.is_some_and(|max| attempt > max) {
            log::warn!("Live channel giving up after {} attempts", attempt - 1);
            break;
        }
        let _ = event_tx.send(ChannelEvent::Reconnecting { attempt });
        match cmd_rx.recv_timeout(options.reconnect_delay) {
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::Send(_)) => log::warn!("Dropping outbound message while reconnecting"),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    log::info!("Live channel thread exiting");
    let _ = event_tx.send(ChannelEvent::Disconnected);
}

fn session(
    url: &str,
    cmd_rx: &Receiver<Command>,
    event_tx: &Sender<ChannelEvent>,
) -> Result<SessionEnd, String> {
    let (mut socket, response) = connect(url).map_err(|e| e.to_string())?;
    log::info!("Live channel connected, status: {}", response.status());
    let _ = event_tx.send(ChannelEvent::Connected);

    match socket.get_mut() {
        tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("TLS or other stream - using default timeout handling"),
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(Command::Send(msg)) => {
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("Live channel send error: {}", e);
                    return Ok(SessionEnd::Lost);
                }
            }
            Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                return Ok(SessionEnd::Closed);
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => {
                log::debug!("Live channel received {} bytes", txt.len());
                let _ = event_tx.send(ChannelEvent::Message(txt.to_string()));
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(txt) => {
                    let _ = event_tx.send(ChannelEvent::Message(txt));
                }
                Err(_) => log::warn!("Dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Live channel peer closed the connection");
                return Ok(SessionEnd::Lost);
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Live channel read error: {}", e);
                return Ok(SessionEnd::Lost);
            }
        }
    }
}
