//! Session controller.
//!
//! Owns the single relay connection for the life of the process:
//!
//! - `Disconnected → Connecting → Handshaking → Joined` on every (re)connect
//! - steady state: frame, classify, answer probes inline, hand chat lines to
//!   the transcript worker
//! - transport failures drop back to `Disconnected` and retry with backoff;
//!   any other error ends the session
//! - the shutdown token drives `Joined → Closing → Disconnected` with a QUIT
//!
//! The read loop is the only reader and the only writer on the transport, so
//! outbound lines never interleave.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Local};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
    time::{sleep, timeout, Duration},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::Backoff,
    classify::{ClassifiedLine, LineClassifier},
    config::Config,
    domain::ServerAddr,
    errors::Error,
    extract::MessageExtractor,
    framing::{LineFramer, ProtocolLine},
    ports::{BoxedTransport, Connector},
    protocol::{handshake, respond_to_probe, OutboundCommand},
    sink::{LogSink, SinkWorker, Submitted},
    Result,
};

const READ_CHUNK: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Joined,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Joined => "joined",
            ConnectionState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Counters reported when the controller stops.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub started_at: DateTime<Local>,
    pub connections: u32,
    pub lines_seen: u64,
    pub probes_answered: u64,
    pub messages_extracted: u64,
    pub framing_errors: u64,
    pub records_written: u64,
    pub records_failed: u64,
    pub records_dropped: u64,
}

impl SessionSummary {
    fn new() -> Self {
        Self {
            started_at: Local::now(),
            connections: 0,
            lines_seen: 0,
            probes_answered: 0,
            messages_extracted: 0,
            framing_errors: 0,
            records_written: 0,
            records_failed: 0,
            records_dropped: 0,
        }
    }
}

struct Connection {
    transport: BoxedTransport,
    remote: ServerAddr,
    connected_at: DateTime<Local>,
}

/// How a connection that reached the handshake came to an end.
enum Ended {
    Shutdown,
    Lost(Error),
}

pub struct SessionController {
    cfg: Arc<Config>,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
    state: ConnectionState,
    observers: Vec<mpsc::UnboundedSender<ConnectionState>>,
    classifier: LineClassifier,
    extractor: MessageExtractor,
    backoff: Backoff,
    summary: SessionSummary,
}

impl SessionController {
    pub fn new(
        cfg: Arc<Config>,
        connector: Arc<dyn Connector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            classifier: LineClassifier::new(cfg.channel.clone()),
            extractor: MessageExtractor::new(cfg.channel.clone()),
            backoff: Backoff::new(cfg.reconnect_initial, cfg.reconnect_max),
            cfg,
            connector,
            shutdown,
            state: ConnectionState::Disconnected,
            observers: Vec::new(),
            summary: SessionSummary::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Cancelling this token asks the controller to QUIT and return.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Receive every state transition from now on.
    pub fn subscribe_states(&mut self) -> mpsc::UnboundedReceiver<ConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Run until shutdown.
    ///
    /// Returns an error when the very first connection attempt fails or when
    /// any failure is not a transport error; transport failures after the
    /// first connection are retried.
    pub async fn run(mut self) -> Result<SessionSummary> {
        let sink = SinkWorker::spawn(
            LogSink::new(self.cfg.log_path.clone(), self.cfg.log_format),
            self.cfg.sink_queue,
        );

        let result = self.run_connections(&sink).await;

        let stats = sink.close().await;
        self.summary.records_written = stats.written;
        self.summary.records_failed = stats.failed;
        self.summary.records_dropped = stats.dropped;

        result?;

        let s = &self.summary;
        tracing::info!(
            connections = s.connections,
            probes = s.probes_answered,
            records = s.records_written,
            failed = s.records_failed,
            dropped = s.records_dropped,
            "session ended (running since {})",
            s.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(self.summary)
    }

    async fn run_connections(&mut self, sink: &SinkWorker) -> Result<()> {
        while !self.shutdown.is_cancelled() {
            let conn = match self.connect().await {
                Ok(Some(conn)) => conn,
                Ok(None) => break,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    if self.summary.connections == 0 {
                        tracing::error!("initial connection failed: {e}");
                        return Err(e);
                    }
                    if !e.is_transport() {
                        tracing::error!("reconnect failed, giving up: {e}");
                        return Err(e);
                    }
                    tracing::warn!("reconnect failed: {e}");
                    if !self.wait_backoff().await {
                        break;
                    }
                    continue;
                }
            };

            self.summary.connections += 1;
            match self.drive(conn, sink).await {
                Ended::Shutdown => break,
                Ended::Lost(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    if !e.is_transport() {
                        tracing::error!("connection ended: {e}");
                        return Err(e);
                    }
                    tracing::warn!("connection lost: {e}");
                    if !self.wait_backoff().await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn connect(&mut self) -> Result<Option<Connection>> {
        self.set_state(ConnectionState::Connecting);
        let addr = self.cfg.server.clone();
        tracing::info!("connecting to {addr} ({})", self.connector.describe());

        let attempt = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(None),
            r = timeout(self.cfg.connect_timeout, self.connector.connect(&addr)) => r,
        };
        let transport = match attempt {
            Ok(r) => r?,
            Err(_) => {
                return Err(Error::Connect {
                    addr: addr.to_string(),
                    reason: format!("timed out after {:?}", self.cfg.connect_timeout),
                })
            }
        };

        Ok(Some(Connection {
            transport,
            remote: addr,
            connected_at: Local::now(),
        }))
    }

    async fn drive(&mut self, mut conn: Connection, sink: &SinkWorker) -> Ended {
        self.set_state(ConnectionState::Handshaking);
        // No acknowledgement is awaited; JOIN going out is enough to start reading.
        for cmd in handshake(&self.cfg.identity, &self.cfg.channel) {
            if let Err(e) = send(&mut conn.transport, &cmd, self.cfg.write_timeout).await {
                return Ended::Lost(e);
            }
        }
        self.set_state(ConnectionState::Joined);
        tracing::info!(remote = %conn.remote, "joined {}", self.cfg.channel);

        let ended = self.read_loop(&mut conn, sink).await;
        if let Ended::Shutdown = ended {
            self.close(conn).await;
        }
        ended
    }

    async fn read_loop(&mut self, conn: &mut Connection, sink: &SinkWorker) -> Ended {
        let mut framer = LineFramer::new(self.cfg.max_line_len);
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ended::Shutdown,
                r = timeout(self.cfg.idle_timeout, conn.transport.read(&mut buf)) => r,
            };
            let n = match read {
                Err(_) => {
                    return Ended::Lost(Error::Transport(format!(
                        "no data for {:?}",
                        self.cfg.idle_timeout
                    )))
                }
                Ok(Err(e)) => return Ended::Lost(Error::Io(e)),
                Ok(Ok(0)) => {
                    return Ended::Lost(Error::Transport("connection closed by peer".to_string()))
                }
                Ok(Ok(n)) => n,
            };

            for item in framer.feed(&buf[..n]) {
                match item {
                    Ok(line) => {
                        if let Err(e) = self.dispatch(line, conn, sink).await {
                            return Ended::Lost(e);
                        }
                    }
                    Err(e) => {
                        self.summary.framing_errors += 1;
                        let e = Error::from(e);
                        tracing::warn!("{e}; dropped");
                    }
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        line: ProtocolLine,
        conn: &mut Connection,
        sink: &SinkWorker,
    ) -> Result<()> {
        self.summary.lines_seen += 1;
        tracing::debug!("[RECEIVED] {line}");

        match self.classifier.classify(line) {
            ClassifiedLine::Probe { token } => {
                send(
                    &mut conn.transport,
                    &respond_to_probe(&token),
                    self.cfg.write_timeout,
                )
                .await?;
                self.summary.probes_answered += 1;
                // Servers only probe registered clients: the connection is healthy.
                self.backoff.reset();
            }
            ClassifiedLine::ChannelMessage(line) => match self.extractor.extract(&line) {
                Some(msg) => {
                    self.summary.messages_extracted += 1;
                    if sink.submit(msg) == Submitted::Closed {
                        tracing::error!("transcript worker stopped; message dropped");
                    }
                }
                None => tracing::debug!("not a record: {line}"),
            },
            ClassifiedLine::Other(_) => {}
        }
        Ok(())
    }

    async fn close(&mut self, mut conn: Connection) {
        self.set_state(ConnectionState::Closing);

        let quit = OutboundCommand::Quit(self.cfg.quit_message.clone());
        if let Err(e) = send(&mut conn.transport, &quit, self.cfg.write_timeout).await {
            tracing::debug!("QUIT not delivered: {e}");
        }
        let _ = timeout(self.cfg.write_timeout, conn.transport.shutdown()).await;

        let uptime = Local::now() - conn.connected_at;
        tracing::info!(
            remote = %conn.remote,
            "closed after {}s",
            uptime.num_seconds()
        );
    }

    /// Sleep for the next backoff delay. False when shutdown interrupted it.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        tracing::info!("reconnecting in {delay:?}");
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::debug!("state {} -> {}", self.state, next);
        self.state = next;
        self.observers.retain(|tx| tx.send(next).is_ok());
    }
}

async fn send(
    transport: &mut BoxedTransport,
    cmd: &OutboundCommand,
    write_timeout: Duration,
) -> Result<()> {
    tracing::debug!("[SENT] {}", cmd.redacted());
    let wire = cmd.to_wire();

    let write = async {
        transport.write_all(wire.as_bytes()).await?;
        transport.flush().await
    };
    match timeout(write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Transport(format!("write failed: {e}"))),
        Err(_) => Err(Error::Transport(format!(
            "write timed out after {write_timeout:?}"
        ))),
    }
}
