//! Fallback telemetry for unindexed scans.
//!
//! Whenever the storage layer cannot satisfy an operation through a secondary
//! index and degrades to a full scan, it reports a [`FallbackRecord`] here.
//! The tracker keeps a bounded FIFO log of those events; the advisor and the
//! health monitor read (never mutate) it.
//!
//! ## Hot-Path Design
//!
//! `record_fallback` checks an `AtomicBool` first, so a disabled tracker
//! costs one atomic load. The event log sits behind an `OrderedMutex` held
//! only long enough to append and, on overflow, evict the oldest entry —
//! the buffer never grows past its capacity, so recording never reallocates
//! once the ring is warm.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use indexwatch_core::timestamps::now_ms;
use indexwatch_core::{LockLevel, OrderedMutex};
use serde::{Deserialize, Serialize};

/// Default maximum number of fallback events retained.
pub const DEFAULT_CAPACITY: usize = 2000;

/// Placeholder used in stat keys for events without a structured index name.
const NO_INDEX: &str = "no-index";

// =============================================================================
// Event model
// =============================================================================

/// The kind of storage operation that fell back to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Delete,
    Query,
}

impl OperationKind {
    /// Human-readable operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Query => "query",
        }
    }
}

/// A fallback report as submitted by the storage layer — everything except
/// the timestamp, which the tracker stamps on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRecord {
    /// Logical database name (e.g. `posDB`).
    pub database: String,
    /// Object store within the database.
    pub store: String,
    /// The index the operation wanted, when the storage layer knows it.
    pub index: Option<String>,
    /// Operation kind that degraded to a scan.
    pub operation: OperationKind,
    /// Free-text reason from the storage layer.
    pub reason: String,
}

/// A recorded fallback event. Immutable once buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub database: String,
    pub store: String,
    pub index: Option<String>,
    pub operation: OperationKind,
    pub reason: String,
    /// Milliseconds since Unix epoch, stamped at `record_fallback` time.
    pub recorded_at_ms: i64,
}

impl FallbackEvent {
    /// The aggregation key used by [`FallbackSnapshot::counts_by_key`]:
    /// `"db.store.index-or-no-index.operation"`.
    #[must_use]
    pub fn stat_key(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.database,
            self.store,
            self.index.as_deref().unwrap_or(NO_INDEX),
            self.operation.as_str()
        )
    }
}

// =============================================================================
// FallbackTracker
// =============================================================================

/// Bounded FIFO log of fallback events.
///
/// Thread-safe: the enabled flag is atomic, the event ring sits behind an
/// ordered mutex. A shared `&FallbackTracker` is all callers need.
#[derive(Debug)]
pub struct FallbackTracker {
    enabled: AtomicBool,
    capacity: usize,
    events: OrderedMutex<VecDeque<FallbackEvent>>,
}

impl Default for FallbackTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackTracker {
    /// Create an enabled tracker with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an enabled tracker retaining at most `capacity` events.
    ///
    /// A capacity of 0 is raised to 1 so the invariant "length never exceeds
    /// capacity" stays meaningful.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            enabled: AtomicBool::new(true),
            capacity,
            events: OrderedMutex::new(
                LockLevel::TelemetryEvents,
                VecDeque::with_capacity(capacity),
            ),
        }
    }

    /// Maximum number of events retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enable or disable recording. Disabling drops new events outright;
    /// already-buffered events stay untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether recording is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record a fallback occurrence.
    ///
    /// Total by definition: a disabled tracker returns immediately with no
    /// observable effect, and no input shape can make this fail. On overflow
    /// the oldest event is evicted before the new one is appended.
    pub fn record_fallback(&self, record: FallbackRecord) {
        if !self.is_enabled() {
            return;
        }

        let event = FallbackEvent {
            database: record.database,
            store: record.store,
            index: record.index,
            operation: record.operation,
            reason: record.reason,
            recorded_at_ms: now_ms(),
        };

        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Clear all buffered events. The enabled flag is untouched.
    pub fn reset(&self) {
        self.events.lock().clear();
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Count buffered events recorded at or after `cutoff_ms`.
    ///
    /// Used by the health monitor to evaluate its trailing window without
    /// copying the whole buffer.
    #[must_use]
    pub fn count_events_since(&self, cutoff_ms: i64) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.recorded_at_ms >= cutoff_ms)
            .count()
    }

    /// Get an immutable snapshot of the buffer.
    ///
    /// The returned events are copies — mutating the snapshot never affects
    /// the tracker.
    #[must_use]
    pub fn snapshot(&self) -> FallbackSnapshot {
        let events: Vec<FallbackEvent> = self.events.lock().iter().cloned().collect();

        let mut counts_by_key: HashMap<String, u64> = HashMap::new();
        for event in &events {
            *counts_by_key.entry(event.stat_key()).or_insert(0) += 1;
        }

        let total = events.len();
        FallbackSnapshot {
            events,
            counts_by_key,
            total,
        }
    }
}

/// Immutable snapshot of tracker state, suitable for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSnapshot {
    /// Buffered events in insertion order (oldest first).
    pub events: Vec<FallbackEvent>,
    /// Occurrence counts keyed by `"db.store.index-or-no-index.operation"`.
    pub counts_by_key: HashMap<String, u64>,
    /// Number of buffered events.
    pub total: usize,
}

impl FallbackSnapshot {
    /// Convert the snapshot into a JSON-friendly dictionary with the count
    /// map ordered count-desc, key-asc (legacy diagnostics output shape).
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let mut pairs: Vec<(&String, &u64)> = Vec::with_capacity(self.counts_by_key.len());
        pairs.extend(self.counts_by_key.iter());
        pairs.sort_by(|(a_key, a_count), (b_key, b_count)| {
            b_count.cmp(a_count).then_with(|| a_key.cmp(b_key))
        });

        let mut counts = serde_json::Map::with_capacity(pairs.len());
        for (key, count) in pairs {
            counts.insert(key.clone(), serde_json::Value::Number((*count).into()));
        }

        serde_json::json!({
            "total": self.total,
            "counts_by_key": counts,
            "events": self.events,
        })
    }
}
