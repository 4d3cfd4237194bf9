//! Refresh coordinator
//!
//! Drives repeated aggregator calls on a fixed cadence for an external
//! consumer, plus on-demand refreshes and window changes through a
//! `RefreshHandle`. Every cycle is independent: a failed read becomes a
//! `RefreshOutcome::Unavailable` for that cycle and the loop keeps going.

pub mod sink;

pub use sink::{ChannelRollupSink, JsonlRollupSink, LogRollupSink, RollupSink, SinkError};

use crate::aggregator::{parse_window_label, Aggregator, Rollups, WindowError, WindowLabel, WindowSpec};
use crate::store::StoreReader;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

/// What the consumer receives each cycle: complete rollups or an explicit gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Ready(Rollups),
    Unavailable { window: WindowSpec, reason: String },
}

impl RefreshOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, RefreshOutcome::Ready(_))
    }

    pub fn window(&self) -> WindowSpec {
        match self {
            RefreshOutcome::Ready(rollups) => rollups.window,
            RefreshOutcome::Unavailable { window, .. } => *window,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub cycles: u64,
    pub ready: u64,
    pub unavailable: u64,
    pub sink_failures: u64,
}

/// Validate a user-facing window label
pub fn validate_window(label: &str) -> Result<WindowSpec, WindowError> {
    parse_window_label(label)
}

/// Resolve a label, falling back to the minimum window when it is not recognized
pub fn resolve_window(label: &str) -> WindowSpec {
    match validate_window(label) {
        Ok(window) => window,
        Err(e) => {
            log::warn!("⚠️  {}; falling back to {}", e, WindowLabel::FALLBACK.as_str());
            WindowLabel::FALLBACK.spec()
        }
    }
}

pub struct RefreshCoordinator {
    reader: Arc<StoreReader>,
    aggregator: Aggregator,
    interval: Duration,
}

impl RefreshCoordinator {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

    pub fn new(reader: Arc<StoreReader>, aggregator: Aggregator, interval: Duration) -> Self {
        Self {
            reader,
            aggregator,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One read for `label`, resolved with fallback (blocking)
    pub fn get_rollups(&self, label: &str) -> RefreshOutcome {
        read_outcome(&self.reader, &self.aggregator, resolve_window(label))
    }

    /// Start the periodic loop, publishing each outcome to `sink`
    pub fn spawn(self, initial_label: &str, sink: Box<dyn RollupSink>) -> RefreshHandle {
        let initial = resolve_window(initial_label);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (window_tx, window_rx) = watch::channel(initial);
        let refresh = Arc::new(Notify::new());

        let join = tokio::spawn(self.run(window_rx, Arc::clone(&refresh), shutdown_rx, sink));

        RefreshHandle {
            shutdown_tx,
            window_tx,
            refresh,
            join,
        }
    }

    async fn run(
        self,
        mut window_rx: watch::Receiver<WindowSpec>,
        refresh: Arc<Notify>,
        mut shutdown: watch::Receiver<bool>,
        mut sink: Box<dyn RollupSink>,
    ) -> RefreshReport {
        log::info!(
            "⏰ Starting refresh coordinator (interval: {}ms, window: {}, sink: {})",
            self.interval.as_millis(),
            *window_rx.borrow(),
            sink.sink_type()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = RefreshReport::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wake = tokio::select! {
                biased;
                changed = shutdown.changed() => Wake::Shutdown { closed: changed.is_err() },
                changed = window_rx.changed() => Wake::WindowChanged { closed: changed.is_err() },
                _ = refresh.notified() => Wake::Refresh,
                _ = ticker.tick() => Wake::Refresh,
            };

            match wake {
                Wake::Shutdown { closed: true } | Wake::WindowChanged { closed: true } => break,
                Wake::Shutdown { closed: false } => continue,
                Wake::WindowChanged { closed: false } => ticker.reset(),
                Wake::Refresh => {}
            }

            let window = *window_rx.borrow_and_update();
            let outcome = self.refresh_cycle(window).await;

            report.cycles += 1;
            if outcome.is_ready() {
                report.ready += 1;
            } else {
                report.unavailable += 1;
            }

            if let Err(e) = sink.publish(&outcome).await {
                report.sink_failures += 1;
                log::warn!("⚠️  {} sink rejected refresh outcome: {}", sink.sink_type(), e);
            }
        }

        if let Err(e) = sink.flush().await {
            log::error!("❌ Failed to flush {} sink: {}", sink.sink_type(), e);
        }

        log::info!(
            "✅ Refresh coordinator stopped: {} cycles ({} ready, {} unavailable, {} sink failures)",
            report.cycles,
            report.ready,
            report.unavailable,
            report.sink_failures
        );

        report
    }

    async fn refresh_cycle(&self, window: WindowSpec) -> RefreshOutcome {
        let reader = Arc::clone(&self.reader);
        let aggregator = self.aggregator.clone();

        match tokio::task::spawn_blocking(move || read_outcome(&reader, &aggregator, window)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ Refresh task failed: {}", e);
                RefreshOutcome::Unavailable {
                    window,
                    reason: e.to_string(),
                }
            }
        }
    }
}

enum Wake {
    Shutdown { closed: bool },
    WindowChanged { closed: bool },
    Refresh,
}

fn read_outcome(reader: &StoreReader, aggregator: &Aggregator, window: WindowSpec) -> RefreshOutcome {
    match aggregator.get_rollups(reader, window) {
        Ok(rollups) => {
            log::debug!(
                "📊 Refreshed [{}]: {} movements, {} timeline buckets",
                window,
                rollups.summary.total_movements,
                rollups.timeline.buckets.len()
            );
            RefreshOutcome::Ready(rollups)
        }
        Err(e) => {
            log::error!(
                "❌ Refresh [{}] failed ({}): {}",
                window,
                if e.is_transient() { "transient" } else { "fatal" },
                e
            );
            RefreshOutcome::Unavailable {
                window,
                reason: e.to_string(),
            }
        }
    }
}

/// Control side of a running refresh loop
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    window_tx: watch::Sender<WindowSpec>,
    refresh: Arc<Notify>,
    join: JoinHandle<RefreshReport>,
}

impl RefreshHandle {
    /// Switch the window and refresh immediately
    ///
    /// An unrecognized label still switches, to the fallback window, and the
    /// `InvalidWindow` error is returned so the caller can report it.
    pub fn set_window(&self, label: &str) -> Result<WindowSpec, WindowError> {
        match validate_window(label) {
            Ok(window) => {
                self.window_tx.send_replace(window);
                Ok(window)
            }
            Err(e) => {
                log::warn!("⚠️  {}; falling back to {}", e, WindowLabel::FALLBACK.as_str());
                self.window_tx.send_replace(WindowLabel::FALLBACK.spec());
                Err(e)
            }
        }
    }

    pub fn window(&self) -> WindowSpec {
        *self.window_tx.borrow()
    }

    /// Run one cycle now instead of waiting for the next tick
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn stop(self) -> Result<RefreshReport, JoinError> {
        let _ = self.shutdown_tx.send(true);
        self.join.await
    }
}
