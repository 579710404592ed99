//! Transcript persistence.
//!
//! Records are appended one per line and never rewritten. The read loop hands
//! messages to a [`SinkWorker`] so disk latency never sits in front of a PONG.
//! The worker queue is bounded; while the disk is stalled and the queue is
//! full, new records are dropped and counted.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{domain::ExtractedMessage, Result};

/// Default capacity of the [`SinkWorker`] queue.
pub const DEFAULT_SINK_QUEUE: usize = 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordFormat {
    /// `<b>&lt;nick&gt;</b> text`, ready to drop into an HTML page.
    #[default]
    Html,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRecord {
    timestamp: String,
    channel: String,
    nick: String,
    text: String,
}

/// Render a message as a single record line (no trailing newline).
pub fn format_record(msg: &ExtractedMessage, format: RecordFormat) -> Result<String> {
    match format {
        RecordFormat::Html => Ok(format!("<b>&lt;{}&gt;</b> {}", msg.sender, msg.text)),
        RecordFormat::Json => Ok(serde_json::to_string(&JsonRecord {
            timestamp: Utc::now().to_rfc3339(),
            channel: msg.channel.clone(),
            nick: msg.sender.clone(),
            text: msg.text.clone(),
        })?),
    }
}

/// Inverse of [`format_record`]: recover `(sender, text)` from a record line.
pub fn parse_record(line: &str, format: RecordFormat) -> Option<(String, String)> {
    match format {
        RecordFormat::Html => {
            static HTML_RECORD: OnceLock<Regex> = OnceLock::new();
            let re = HTML_RECORD.get_or_init(|| {
                Regex::new(r"^<b>&lt;([^\s&]+)&gt;</b> (.*)$").expect("valid regex")
            });
            let caps = re.captures(line)?;
            Some((caps[1].to_string(), caps[2].to_string()))
        }
        RecordFormat::Json => {
            let rec: JsonRecord = serde_json::from_str(line).ok()?;
            Some((rec.nick, rec.text))
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogSink {
    path: PathBuf,
    format: RecordFormat,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>, format: RecordFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and push it to disk. The file is opened per call and
    /// closed on every return path.
    pub fn append(&self, msg: &ExtractedMessage) -> Result<()> {
        let mut line = format_record(msg, self.format)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub failed: u64,
    /// Rejected at submit time because the queue was full.
    pub dropped: u64,
}

/// Outcome of [`SinkWorker::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// Queue full; the message was discarded.
    Dropped,
    /// The worker has stopped.
    Closed,
}

/// Background task owning the [`LogSink`].
pub struct SinkWorker {
    tx: mpsc::Sender<ExtractedMessage>,
    dropped: AtomicU64,
    handle: JoinHandle<SinkStats>,
}

impl SinkWorker {
    pub fn spawn(sink: LogSink, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_sink(sink, rx));
        Self {
            tx,
            dropped: AtomicU64::new(0),
            handle,
        }
    }

    /// Queue a message; never waits.
    pub fn submit(&self, msg: ExtractedMessage) -> Submitted {
        match self.tx.try_send(msg) {
            Ok(()) => Submitted::Queued,
            Err(TrySendError::Full(msg)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(nick = %msg.sender, "transcript queue full; record dropped");
                Submitted::Dropped
            }
            Err(TrySendError::Closed(_)) => Submitted::Closed,
        }
    }

    /// Flush everything queued so far and stop the worker.
    pub async fn close(self) -> SinkStats {
        let dropped = self.dropped.load(Ordering::Relaxed);
        drop(self.tx);
        let mut stats = match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("transcript worker crashed: {e}");
                SinkStats::default()
            }
        };
        stats.dropped = dropped;
        stats
    }
}

async fn run_sink(sink: LogSink, mut rx: mpsc::Receiver<ExtractedMessage>) -> SinkStats {
    let mut stats = SinkStats::default();

    while let Some(msg) = rx.recv().await {
        let s = sink.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let res = s.append(&msg);
            (msg, res)
        })
        .await;

        match outcome {
            Ok((msg, Ok(()))) => {
                stats.written += 1;
                tracing::info!(nick = %msg.sender, "[LOGGING] {}", msg.text);
            }
            Ok((_, Err(e))) => {
                stats.failed += 1;
                tracing::error!(path = %sink.path().display(), "transcript append failed: {e}");
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!("transcript append task failed: {e}");
            }
        }
    }

    stats
}
