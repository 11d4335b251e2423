//! Periodic health monitoring of fallback frequency.
//!
//! A background sampler re-evaluates a trailing wall-clock window of the
//! fallback log at a fixed cadence and raises a warning when the rate
//! crosses a threshold. The sampler is fire-and-forget: starting it never
//! blocks the caller, ticks are strictly serialized by the thread, and a
//! misbehaving warning callback cannot kill the loop.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use indexwatch_core::timestamps::now_ms;

use crate::telemetry::FallbackTracker;

/// Warning callback invoked with a human-readable summary.
pub type WarningCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for a health monitor run.
#[derive(Clone)]
pub struct MonitorConfig {
    /// Fallback events per minute before a warning fires. Clamped to >= 1.
    pub threshold_per_minute: u32,
    /// Time between checks. Production default is 30 s; tests shrink it.
    pub tick: Duration,
    /// Trailing window evaluated at each tick, anchored at tick time.
    pub window: Duration,
    /// Invoked with the warning summary when the threshold is crossed.
    pub on_warning: Option<WarningCallback>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_per_minute: 20,
            tick: Duration::from_secs(30),
            window: Duration::from_secs(60),
            on_warning: None,
        }
    }
}

impl std::fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("threshold_per_minute", &self.threshold_per_minute)
            .field("tick", &self.tick)
            .field("window", &self.window)
            .field("on_warning", &self.on_warning.is_some())
            .finish()
    }
}

impl MonitorConfig {
    /// Build a config from the process [`indexwatch_core::Config`].
    #[must_use]
    pub fn from_config(config: &indexwatch_core::Config) -> Self {
        Self {
            threshold_per_minute: config.health_threshold_per_minute,
            tick: Duration::from_secs(config.health_tick_seconds),
            window: Duration::from_secs(config.health_window_seconds),
            on_warning: None,
        }
    }

    /// Attach a warning callback.
    #[must_use]
    pub fn with_warning_callback(mut self, callback: WarningCallback) -> Self {
        self.on_warning = Some(callback);
        self
    }
}

/// Handle to a running health monitor. Stopping (or dropping) the handle
/// guarantees no further warning callbacks after it returns.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop the monitor. Idempotent; safe to call mid-tick. Joins the
    /// sampler thread, so once this returns no callback can still run.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.thread.take() {
            // A callback that reaches back into stop() runs on the sampler
            // thread itself; joining there would self-deadlock.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a health monitor over `tracker`.
///
/// The threshold is clamped to at least 1. Replacement semantics (stopping
/// any previously running monitor) live in the owning
/// [`crate::context::TelemetryHub`], which holds the single handle slot.
#[must_use]
pub fn start(tracker: Arc<FallbackTracker>, config: MonitorConfig) -> MonitorHandle {
    let threshold = config.threshold_per_minute.max(1);
    let tick = config.tick;
    let window_ms = i64::try_from(config.window.as_millis()).unwrap_or(i64::MAX);
    let on_warning = config.on_warning;

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let thread = std::thread::Builder::new()
        .name("indexwatch-health".to_string())
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(tick) {
                    // Stop requested, or every sender dropped: either way,
                    // the monitor winds down without another check.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        check_window(&tracker, threshold, window_ms, on_warning.as_ref());
                    }
                }
            }
        })
        .expect("spawning the health monitor thread");

    MonitorHandle {
        stop_tx,
        thread: Some(thread),
    }
}

/// One tick: count events in the trailing window (anchored at now, not at
/// event insertion) and emit a warning when the threshold is crossed.
fn check_window(
    tracker: &FallbackTracker,
    threshold: u32,
    window_ms: i64,
    on_warning: Option<&WarningCallback>,
) {
    let cutoff = now_ms().saturating_sub(window_ms);
    let observed = tracker.count_events_since(cutoff);
    if observed < threshold as usize {
        return;
    }

    let summary = format!(
        "high index-fallback rate: {observed} events in the trailing {}s (threshold {threshold}/min)",
        window_ms / 1_000
    );
    tracing::warn!("{summary}");

    if let Some(callback) = on_warning {
        // Caller code must not be able to kill the sampler loop.
        if catch_unwind(AssertUnwindSafe(|| callback(&summary))).is_err() {
            tracing::warn!("health warning callback panicked; ignoring");
        }
    }
}
