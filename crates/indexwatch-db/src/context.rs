//! Process-level telemetry context.
//!
//! [`TelemetryHub`] is the explicit owner of the shared fallback tracker and
//! the (at most one) running health monitor. Callers construct a hub and
//! pass it where needed; there is no module-level singleton, so tests and
//! embedders can run isolated instances side by side.

use std::sync::Arc;

use indexwatch_core::{Config, LockLevel, OrderedMutex};

use crate::monitor::{self, MonitorConfig, MonitorHandle};
use crate::telemetry::FallbackTracker;

/// Owner of the fallback tracker and the health monitor slot.
#[derive(Debug)]
pub struct TelemetryHub {
    tracker: Arc<FallbackTracker>,
    monitor: OrderedMutex<Option<MonitorHandle>>,
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryHub {
    /// Hub with default capacity, telemetry enabled, no monitor running.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(FallbackTracker::new())
    }

    /// Hub configured from the process [`Config`] (capacity and the
    /// telemetry enable flag).
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let tracker = FallbackTracker::with_capacity(config.telemetry_capacity);
        tracker.set_enabled(config.telemetry_enabled);
        Self::with_tracker(tracker)
    }

    fn with_tracker(tracker: FallbackTracker) -> Self {
        Self {
            tracker: Arc::new(tracker),
            monitor: OrderedMutex::new(LockLevel::TelemetryMonitorHandle, None),
        }
    }

    /// The shared tracker. Clone the `Arc` to record from other threads.
    #[must_use]
    pub fn tracker(&self) -> &Arc<FallbackTracker> {
        &self.tracker
    }

    /// Start a health monitor over this hub's tracker, replacing (and
    /// stopping) any monitor already running.
    pub fn start_health_monitor(&self, config: MonitorConfig) {
        let handle = monitor::start(Arc::clone(&self.tracker), config);
        // Take the old handle out before stopping it so the join does not
        // happen while the slot lock is held.
        let previous = self.monitor.lock().replace(handle);
        if let Some(mut old) = previous {
            old.stop();
        }
    }

    /// Stop the running health monitor, if any. Idempotent.
    pub fn stop_health_monitor(&self) {
        let handle = self.monitor.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
    }

    /// Stop the monitor and leave the tracker intact for final snapshots.
    pub fn shutdown(&self) {
        self.stop_health_monitor();
    }
}

impl Drop for TelemetryHub {
    fn drop(&mut self) {
        self.stop_health_monitor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{FallbackRecord, OperationKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn record() -> FallbackRecord {
        FallbackRecord {
            database: "posDB".into(),
            store: "products".into(),
            index: None,
            operation: OperationKind::Query,
            reason: "missing index \"barcode\"".into(),
        }
    }

    #[test]
    fn hub_respects_config_flags() {
        let config = Config {
            telemetry_enabled: false,
            telemetry_capacity: 5,
            ..Config::default()
        };
        let hub = TelemetryHub::from_config(&config);
        assert!(!hub.tracker().is_enabled());

        hub.tracker().record_fallback(record());
        assert!(hub.tracker().is_empty(), "disabled tracker records nothing");
    }

    #[test]
    fn starting_a_monitor_replaces_the_previous_one() {
        let hub = TelemetryHub::new();
        for _ in 0..5 {
            hub.tracker().record_fallback(record());
        }

        let first_hits = Arc::new(AtomicUsize::new(0));
        let first_hits_cb = Arc::clone(&first_hits);
        hub.start_health_monitor(MonitorConfig {
            threshold_per_minute: 1,
            tick: Duration::from_millis(20),
            window: Duration::from_secs(60),
            on_warning: Some(Arc::new(move |_| {
                first_hits_cb.fetch_add(1, Ordering::SeqCst);
            })),
        });
        std::thread::sleep(Duration::from_millis(60));

        // Replace; the first monitor must stop firing.
        hub.start_health_monitor(MonitorConfig {
            threshold_per_minute: 1,
            tick: Duration::from_millis(20),
            window: Duration::from_secs(60),
            on_warning: None,
        });
        let after_replace = first_hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(first_hits.load(Ordering::SeqCst), after_replace);

        hub.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent_and_keeps_the_tracker() {
        let hub = TelemetryHub::new();
        hub.tracker().record_fallback(record());
        hub.start_health_monitor(MonitorConfig::default());
        hub.shutdown();
        hub.shutdown();
        assert_eq!(hub.tracker().len(), 1);
    }
}
