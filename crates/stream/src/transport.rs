//! Stream Transport
//!
//! One persistent WebSocket session per transport, owned by a single driver
//! task. Handles talk to the driver over a command channel and observe its
//! state through a `watch` channel.
//!
//! ```text
//!                 connect()
//!  Disconnected ─────────────► Connecting ──── handshake ok ────► Connected
//!       ▲                        ▲     │                           │    │
//!       │ disconnect() or        │     │ handshake failed          │    │ abnormal close,
//!       │ normal close           │     ▼                           │    │ read error or
//!       │                     Reconnecting { attempt } ◄───────────┼────┘ missed pong
//!       │                            │                             │
//!       └────────────────────────────┼─────────────────────────────┘
//!                                    │ attempt > max
//!                                    ▼
//!                            PermanentlyFailed
//! ```
//!
//! While connected the driver sends `ping` every heartbeat interval and
//! expects `pong` within the heartbeat timeout. Frames sent while not
//! connected wait in the outbound queue; session subscriptions are replayed
//! first on every connection, then the queue is flushed in order.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_core::BackoffPolicy;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, trace, warn};

use crate::config::StreamConfig;
use crate::connector::{Connector, FrameSink, FrameStream, TungsteniteConnector};
use crate::error::{StreamError, StreamResult};
use crate::handlers::{HandlerId, HandlerRegistry};
use crate::message::{Envelope, Inbound, PING, decode, encode};
use crate::observer::StreamObserver;
use crate::queue::OutboundQueue;
use crate::state::ConnectionState;

enum Command {
    Connect,
    Disconnect,
    Send(String),
    Subscribe { key: String, frame: String },
    Unsubscribe { key: String },
}

/// Handle to a streaming connection. Cheap to clone; every clone drives the
/// same session.
#[derive(Clone)]
pub struct StreamTransport {
    url: Arc<str>,
    max_reconnect_attempts: u32,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    handlers: Arc<HandlerRegistry>,
}

impl StreamTransport {
    /// Create a transport over real WebSocket connections. The transport
    /// starts disconnected; call [`connect`](Self::connect) to open it.
    pub fn new(config: StreamConfig, observer: Arc<dyn StreamObserver>) -> StreamResult<Self> {
        Self::with_connector(config, observer, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(
        config: StreamConfig,
        observer: Arc<dyn StreamObserver>,
        connector: Arc<dyn Connector>,
    ) -> StreamResult<Self> {
        config.validate()?;

        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let handlers = Arc::new(HandlerRegistry::new());

        let transport = StreamTransport {
            url: Arc::from(config.url.as_str()),
            max_reconnect_attempts: config.max_reconnect_attempts,
            commands,
            state,
            handlers: Arc::clone(&handlers),
        };

        let driver = Driver {
            policy: BackoffPolicy::new(config.reconnect),
            config,
            connector,
            observer,
            handlers,
            state: state_tx,
            commands: rx,
            outbound: OutboundQueue::new(),
            subscriptions: Vec::new(),
        };
        tokio::spawn(driver.run());

        Ok(transport)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start connecting. Returns immediately; watch [`state`](Self::state)
    /// or use [`connect_and_wait`](Self::connect_and_wait) for the outcome.
    pub fn connect(&self) -> StreamResult<()> {
        self.command(Command::Connect)
    }

    /// Connect and wait until the session is open, or until the reconnect
    /// budget is exhausted.
    pub async fn connect_and_wait(&self) -> StreamResult<()> {
        let mut state = self.state.clone();
        if state.borrow_and_update().is_connected() {
            return Ok(());
        }
        self.connect()?;

        loop {
            state.changed().await.map_err(|_| StreamError::Closed)?;
            match *state.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::PermanentlyFailed => {
                    return Err(StreamError::ReconnectExhausted {
                        attempts: self.max_reconnect_attempts,
                    });
                }
                ConnectionState::Disconnected => return Err(StreamError::Closed),
                ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {}
            }
        }
    }

    /// Close the session normally. No reconnect follows.
    pub fn disconnect(&self) -> StreamResult<()> {
        self.command(Command::Disconnect)
    }

    /// Serialize `message` and write it, or queue it until the next
    /// connection if the transport is not connected.
    pub fn send<T: Serialize>(&self, message: &T) -> StreamResult<()> {
        let frame = encode(message)?;
        self.send_text(frame)
    }

    pub fn send_text(&self, frame: impl Into<String>) -> StreamResult<()> {
        self.command(Command::Send(frame.into()))
    }

    /// Send `message` now and again after every reconnect, until
    /// [`unsubscribe`](Self::unsubscribe) is called with the same key.
    /// Subscribing again under a key replaces its frame.
    pub fn subscribe<T: Serialize>(&self, key: impl Into<String>, message: &T) -> StreamResult<()> {
        let frame = encode(message)?;
        self.command(Command::Subscribe {
            key: key.into(),
            frame,
        })
    }

    pub fn unsubscribe(&self, key: impl Into<String>) -> StreamResult<()> {
        self.command(Command::Unsubscribe { key: key.into() })
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Register a handler for inbound envelopes of type `kind`
    pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.handlers.on(kind, handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    fn command(&self, command: Command) -> StreamResult<()> {
        self.commands.send(command).map_err(|_| StreamError::Closed)
    }
}

/// How a connected session ended
enum SessionEnd {
    /// Normal closure by either side
    Closed,
    Lost(StreamError),
    /// Every handle was dropped
    Shutdown,
}

/// How a reconnect wait ended
enum Wake {
    Retry,
    Stop,
    Shutdown,
}

struct Driver {
    config: StreamConfig,
    policy: BackoffPolicy,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn StreamObserver>,
    handlers: Arc<HandlerRegistry>,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: OutboundQueue,
    /// Replayed on every connection, in registration order
    subscriptions: Vec<(String, String)>,
}

impl Driver {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Connect => {
                    if !self.run_session().await {
                        break;
                    }
                }
                // Also clears PermanentlyFailed
                Command::Disconnect => self.set_state(ConnectionState::Disconnected),
                other => self.buffer(other),
            }
        }
        debug!(url = %self.config.url, "stream transport stopped");
    }

    /// Handle a command that needs no open connection
    fn buffer(&mut self, command: Command) {
        match command {
            Command::Send(frame) => self.outbound.push(frame),
            Command::Subscribe { key, frame } => self.remember(key, frame),
            Command::Unsubscribe { key } => self.forget(&key),
            Command::Connect | Command::Disconnect => {}
        }
    }

    fn remember(&mut self, key: String, frame: String) {
        match self.subscriptions.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = frame,
            None => self.subscriptions.push((key, frame)),
        }
    }

    fn forget(&mut self, key: &str) {
        self.subscriptions.retain(|(k, _)| k != key);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(url = %self.config.url, from = %previous, to = %state, "state change");
        }
    }

    /// Connect, reconnecting after every abnormal end, until the session is
    /// closed normally or the reconnect budget runs out. Returns false once
    /// every handle is gone.
    async fn run_session(&mut self) -> bool {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            let end = match self.open().await {
                Ok((sink, stream)) => {
                    attempt = 0;
                    self.connected(sink, stream).await
                }
                Err(err) => SessionEnd::Lost(err),
            };

            let err = match end {
                SessionEnd::Closed => {
                    self.set_state(ConnectionState::Disconnected);
                    self.observer.on_disconnected(&StreamError::Closed);
                    return true;
                }
                SessionEnd::Shutdown => {
                    self.set_state(ConnectionState::Disconnected);
                    return false;
                }
                SessionEnd::Lost(err) => err,
            };
            self.observer.on_disconnected(&err);

            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                let exhausted = StreamError::ReconnectExhausted {
                    attempts: self.config.max_reconnect_attempts,
                };
                error!(url = %self.config.url, error = %err, "{exhausted}");
                self.set_state(ConnectionState::PermanentlyFailed);
                self.observer.on_error(&exhausted);
                return true;
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                url = %self.config.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "connection lost, reconnecting"
            );
            self.set_state(ConnectionState::Reconnecting { attempt });

            match self.wait(delay).await {
                Wake::Retry => {}
                Wake::Stop => {
                    self.set_state(ConnectionState::Disconnected);
                    return true;
                }
                Wake::Shutdown => return false,
            }
        }
    }

    async fn open(&self) -> StreamResult<(FrameSink, FrameStream)> {
        info!(url = %self.config.url, "connecting");
        let limit = self.config.connect_timeout;
        match timeout(limit, self.connector.connect(&self.config.url)).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Connect(format!("timed out after {limit:?}"))),
        }
    }

    /// Sit out a reconnect delay while still accepting commands
    async fn wait(&mut self, delay: Duration) -> Wake {
        let deadline = sleep(delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    None => return Wake::Shutdown,
                    Some(Command::Disconnect) => return Wake::Stop,
                    Some(Command::Connect) => return Wake::Retry,
                    Some(other) => self.buffer(other),
                },
                _ = &mut deadline => return Wake::Retry,
            }
        }
    }

    async fn connected(&mut self, mut sink: FrameSink, mut stream: FrameStream) -> SessionEnd {
        info!(url = %self.config.url, "connected");
        self.set_state(ConnectionState::Connected);
        self.observer.on_connected();

        if let Err(err) = self.replay(&mut sink).await {
            return SessionEnd::Lost(err);
        }

        let heartbeat_timeout = self.config.heartbeat_timeout;
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watchdog = sleep(heartbeat_timeout);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    None => {
                        close(&mut sink).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Disconnect) => {
                        info!(url = %self.config.url, "disconnecting");
                        close(&mut sink).await;
                        return SessionEnd::Closed;
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Send(frame)) => {
                        if let Err(err) = sink.send(Message::text(frame.clone())).await {
                            self.outbound.requeue(frame);
                            return SessionEnd::Lost(err);
                        }
                    }
                    Some(Command::Subscribe { key, frame }) => {
                        self.remember(key, frame.clone());
                        if let Err(err) = sink.send(Message::text(frame)).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    Some(Command::Unsubscribe { key }) => self.forget(&key),
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.receive(text.as_str()) {
                            watchdog.as_mut().reset(Instant::now() + heartbeat_timeout);
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            if self.receive(text) {
                                watchdog.as_mut().reset(Instant::now() + heartbeat_timeout);
                            }
                        }
                        Err(e) => self.report(StreamError::Decode(e.to_string())),
                    },
                    Some(Ok(Message::Pong(_))) => {
                        watchdog.as_mut().reset(Instant::now() + heartbeat_timeout);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) if frame.code == CloseCode::Normal => {
                                info!(url = %self.config.url, "server closed the connection");
                                SessionEnd::Closed
                            }
                            Some(frame) => SessionEnd::Lost(StreamError::ConnectionLost(format!(
                                "closed by server with code {}: {}",
                                u16::from(frame.code),
                                frame.reason.as_str()
                            ))),
                            None => SessionEnd::Lost(StreamError::ConnectionLost(
                                "closed by server without a close code".to_string(),
                            )),
                        };
                    }
                    // Protocol pings are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return SessionEnd::Lost(err),
                    None => {
                        return SessionEnd::Lost(StreamError::ConnectionLost(
                            "stream ended".to_string(),
                        ));
                    }
                },
                _ = heartbeat.tick() => {
                    trace!(url = %self.config.url, "ping");
                    if let Err(err) = sink.send(Message::text(PING)).await {
                        return SessionEnd::Lost(err);
                    }
                }
                _ = &mut watchdog => {
                    warn!(
                        url = %self.config.url,
                        timeout_ms = heartbeat_timeout.as_millis() as u64,
                        "heartbeat timed out"
                    );
                    return SessionEnd::Lost(StreamError::ConnectionLost(format!(
                        "no pong within {heartbeat_timeout:?}"
                    )));
                }
            }
        }
    }

    /// Write session subscriptions, then everything queued while offline
    async fn replay(&mut self, sink: &mut FrameSink) -> StreamResult<()> {
        for (_, frame) in &self.subscriptions {
            sink.send(Message::text(frame.clone())).await?;
        }

        let queued = self.outbound.len();
        while let Some(frame) = self.outbound.pop() {
            if let Err(err) = sink.send(Message::text(frame.clone())).await {
                self.outbound.requeue(frame);
                return Err(err);
            }
        }

        if queued > 0 || !self.subscriptions.is_empty() {
            debug!(
                url = %self.config.url,
                subscriptions = self.subscriptions.len(),
                queued,
                "replayed outbound frames"
            );
        }
        Ok(())
    }

    /// Route one inbound text frame. Returns true for a heartbeat reply.
    fn receive(&self, text: &str) -> bool {
        match decode(text) {
            Ok(Inbound::Pong) => true,
            Ok(Inbound::Message(envelope)) => {
                self.observer.on_message(&envelope);
                let handled = self.handlers.dispatch(&envelope);
                trace!(kind = %envelope.kind, handled, "inbound message");
                false
            }
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    fn report(&self, err: StreamError) {
        warn!(url = %self.config.url, error = %err, "dropping inbound frame");
        self.observer.on_error(&err);
    }
}

async fn close(sink: &mut FrameSink) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    if let Err(err) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %err, "close frame not delivered");
    }
    let _ = sink.close().await;
}
