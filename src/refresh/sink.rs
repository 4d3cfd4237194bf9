//! Destinations for refresh outcomes

use super::RefreshOutcome;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Receiving side is gone
    Closed,
    /// Consumer is behind; the outcome was dropped
    Full,
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SinkError::Closed => write!(f, "Sink closed"),
            SinkError::Full => write!(f, "Sink full, outcome dropped"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Consumer of refresh outcomes (the rendering layer's side of the loop)
#[async_trait]
pub trait RollupSink: Send {
    async fn publish(&mut self, outcome: &RefreshOutcome) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Sink type for logging
    fn sink_type(&self) -> &'static str;
}

/// Appends one JSON object per refresh to a file
pub struct JsonlRollupSink {
    path: PathBuf,
    writer: BufWriter<std::fs::File>,
    last_flush: Instant,
}

impl JsonlRollupSink {
    const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("📝 Writing rollups to: {}", path.display());

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            last_flush: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_outcome(&mut self, outcome: &RefreshOutcome) -> Result<(), SinkError> {
        let json = serde_json::to_string(outcome)?;
        writeln!(self.writer, "{}", json)?;

        if self.last_flush.elapsed() > Self::FLUSH_INTERVAL {
            self.writer.flush()?;
            self.last_flush = Instant::now();
        }

        Ok(())
    }
}

impl Drop for JsonlRollupSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[async_trait]
impl RollupSink for JsonlRollupSink {
    async fn publish(&mut self, outcome: &RefreshOutcome) -> Result<(), SinkError> {
        self.write_outcome(outcome)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "JSONL"
    }
}

/// Forwards outcomes to an in-process consumer
///
/// Never waits on the consumer: a full channel drops the outcome.
pub struct ChannelRollupSink {
    tx: mpsc::Sender<RefreshOutcome>,
}

impl ChannelRollupSink {
    pub fn new(tx: mpsc::Sender<RefreshOutcome>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end, bounded at `capacity`
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RefreshOutcome>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl RollupSink for ChannelRollupSink {
    async fn publish(&mut self, outcome: &RefreshOutcome) -> Result<(), SinkError> {
        self.tx.try_send(outcome.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "Channel"
    }
}

/// Logs a one-line summary per refresh
#[derive(Debug, Default)]
pub struct LogRollupSink;

#[async_trait]
impl RollupSink for LogRollupSink {
    async fn publish(&mut self, outcome: &RefreshOutcome) -> Result<(), SinkError> {
        match outcome {
            RefreshOutcome::Ready(rollups) => {
                let summary = &rollups.summary;
                log::info!(
                    "📊 [{}] {} movements | in {} ({} items) | out {} ({} items) | net {:+}",
                    rollups.window,
                    summary.total_movements,
                    summary.incoming_count,
                    summary.incoming_items,
                    summary.outgoing_count,
                    summary.outgoing_items,
                    summary.net_change
                );
                for stock in &rollups.product_snapshot {
                    log::info!("   └─ {} ({}): {}", stock.name, stock.category, stock.current_stock);
                }
            }
            RefreshOutcome::Unavailable { window, reason } => {
                log::warn!("⚠️  [{}] data temporarily unavailable: {}", window, reason);
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "Log"
    }
}
