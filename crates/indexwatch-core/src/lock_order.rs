//! Lock ordering + debug-only deadlock prevention utilities.
//!
//! This module defines a **global lock hierarchy** for the small set of
//! process-global locks shared across the telemetry and schema-engine
//! subsystems. A single inconsistent acquisition order between the fallback
//! log, the monitor handle, and the in-memory engine state can deadlock the
//! process under contention.
//!
//! Design goals:
//! - **Zero release overhead**: ordering checks compile to no-ops outside
//!   `debug_assertions`.
//! - **Fail fast in debug**: panic *before* attempting an out-of-order lock.
//! - **Incremental adoption**: wrap only the locks that matter.
//!
//! Rule (strict):
//! - When a thread already holds any lock(s), it may only acquire locks with a
//!   strictly higher `LockLevel::rank()`.
//!
//! If you need multiple locks, acquire them in ascending rank order, keep the
//! critical section tiny, and never hold these locks across blocking IO.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// Global lock hierarchy.
///
/// Lower rank must be acquired before higher rank when locks are nested.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockLevel {
    // ---------------------------------------------------------------------
    // Telemetry layer
    // ---------------------------------------------------------------------
    TelemetryEvents,
    TelemetryMonitorHandle,

    // ---------------------------------------------------------------------
    // Schema engine layer (in-memory engine + version store)
    // ---------------------------------------------------------------------
    EngineVersions,
    EngineCatalog,
}

impl LockLevel {
    /// Total order rank. Must be unique per variant.
    #[must_use]
    pub const fn rank(self) -> u16 {
        match self {
            // Telemetry
            Self::TelemetryEvents => 10,
            Self::TelemetryMonitorHandle => 20,

            // Engine
            Self::EngineVersions => 30,
            Self::EngineCatalog => 40,
        }
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}@{}", self.rank())
    }
}

#[cfg(debug_assertions)]
thread_local! {
    static HELD_LOCKS: RefCell<Vec<LockLevel>> = const { RefCell::new(Vec::new()) };
}

#[inline]
fn check_before_acquire(level: LockLevel) {
    #[cfg(debug_assertions)]
    HELD_LOCKS.with(|held| {
        let held = held.borrow();
        let Some(&last) = held.last() else {
            return;
        };
        assert!(
            level.rank() > last.rank(),
            "lock order violation: attempting to acquire {} while holding {}. held={:?}",
            level,
            last,
            held.as_slice()
        );
    });
    #[cfg(not(debug_assertions))]
    let _ = level;
}

#[inline]
fn did_acquire(level: LockLevel) {
    #[cfg(debug_assertions)]
    HELD_LOCKS.with(|held| held.borrow_mut().push(level));
    #[cfg(not(debug_assertions))]
    let _ = level;
}

#[inline]
fn did_release(level: LockLevel) {
    #[cfg(debug_assertions)]
    HELD_LOCKS.with(|held| {
        let mut held = held.borrow_mut();
        let last = held.pop();
        assert!(
            last == Some(level),
            "lock tracking corrupted: expected to release {}, popped={:?}, held={:?}",
            level,
            last,
            held.as_slice()
        );
    });
    #[cfg(not(debug_assertions))]
    let _ = level;
}

/// Mutex wrapper that enforces the global lock hierarchy in debug builds.
#[derive(Debug)]
pub struct OrderedMutex<T> {
    level: LockLevel,
    inner: Mutex<T>,
}

impl<T> OrderedMutex<T> {
    #[must_use]
    pub const fn new(level: LockLevel, value: T) -> Self {
        Self {
            level,
            inner: Mutex::new(value),
        }
    }

    #[must_use]
    pub const fn level(&self) -> LockLevel {
        self.level
    }

    pub fn lock(&self) -> OrderedMutexGuard<'_, T> {
        check_before_acquire(self.level);
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        did_acquire(self.level);
        OrderedMutexGuard {
            level: self.level,
            guard,
        }
    }

    pub fn try_lock(&self) -> Option<OrderedMutexGuard<'_, T>> {
        check_before_acquire(self.level);
        let guard = self.inner.try_lock().ok()?;
        did_acquire(self.level);
        Some(OrderedMutexGuard {
            level: self.level,
            guard,
        })
    }
}

pub struct OrderedMutexGuard<'a, T> {
    level: LockLevel,
    guard: MutexGuard<'a, T>,
}

impl<T> Drop for OrderedMutexGuard<'_, T> {
    fn drop(&mut self) {
        did_release(self.level);
    }
}

impl<T> Deref for OrderedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for OrderedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn ordered_mutex_allows_increasing_order() {
        let events = OrderedMutex::new(LockLevel::TelemetryEvents, ());
        let catalog = OrderedMutex::new(LockLevel::EngineCatalog, ());

        let _e = events.lock();
        let _c = catalog.lock();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore = "ordering checks are debug-only")]
    #[should_panic(expected = "lock order violation")]
    fn ordered_mutex_panics_on_out_of_order() {
        let catalog = OrderedMutex::new(LockLevel::EngineCatalog, ());
        let events = OrderedMutex::new(LockLevel::TelemetryEvents, ());

        let _c = catalog.lock();
        let _e = events.lock();
    }

    #[test]
    fn try_lock_contended_returns_none() {
        let events = Arc::new(OrderedMutex::new(LockLevel::TelemetryEvents, 0u32));
        let _held = events.lock();

        let events2 = Arc::clone(&events);
        let handle = thread::spawn(move || events2.try_lock().is_none());
        assert!(handle.join().expect("thread panicked"));
    }

    #[test]
    fn stress_no_deadlock_under_contention_short() {
        let events = Arc::new(OrderedMutex::new(LockLevel::TelemetryEvents, ()));
        let monitor = Arc::new(OrderedMutex::new(LockLevel::TelemetryMonitorHandle, ()));
        let versions = Arc::new(OrderedMutex::new(LockLevel::EngineVersions, ()));
        let catalog = Arc::new(OrderedMutex::new(LockLevel::EngineCatalog, ()));

        let start = Instant::now();
        let run_for = Duration::from_millis(150);
        let threads: usize = 50;

        let handles = (0..threads)
            .map(|_| {
                let events = Arc::clone(&events);
                let monitor = Arc::clone(&monitor);
                let versions = Arc::clone(&versions);
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || {
                    while start.elapsed() < run_for {
                        let _e = events.lock();
                        let _m = monitor.lock();
                        let _v = versions.lock();
                        let _c = catalog.lock();
                    }
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().expect("thread panicked");
        }
    }
}
