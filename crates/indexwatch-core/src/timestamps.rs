//! Timestamp helpers with clock skew detection.
//!
//! The telemetry buffer stamps fallback events with `i64` milliseconds since
//! the Unix epoch, and the health monitor slices that log by wall-clock
//! windows. This module provides conversion to/from chrono types, plus
//! monotonic protection against wall-clock jumps (NTP corrections, VM
//! migration, etc.).
//!
//! # Clock Skew Protection
//!
//! [`now_ms`] tracks the last observed wall-clock value. On a backward jump
//! (>1 s), it returns `max(current, last_seen)` so buffered event timestamps
//! never regress. Forward jumps (>5 min) are counted and logged as warnings.

#![allow(clippy::missing_const_for_fn)]

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds per second.
const MILLIS_PER_SECOND: i64 = 1_000;

/// Backward jump threshold: 1 second in milliseconds.
const BACKWARD_JUMP_THRESHOLD_MS: i64 = 1_000;

/// Forward jump threshold: 5 minutes in milliseconds.
const FORWARD_JUMP_THRESHOLD_MS: i64 = 300_000;

/// Last observed wall-clock value (milliseconds since epoch).
/// Initialized to 0; updated on every `now_ms()` call.
static LAST_SYSTEM_TIME_MS: AtomicI64 = AtomicI64::new(0);

/// Convert chrono `NaiveDateTime` to milliseconds since Unix epoch.
#[inline]
#[must_use]
pub fn naive_to_ms(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

/// Convert milliseconds since Unix epoch to chrono `NaiveDateTime`.
///
/// For extreme values outside chrono's representable range, clamps to
/// chrono's min/max instead of panicking.
#[inline]
#[must_use]
pub fn ms_to_naive(ms: i64) -> NaiveDateTime {
    let secs = ms.div_euclid(MILLIS_PER_SECOND);
    let sub_ms = ms.rem_euclid(MILLIS_PER_SECOND);
    let nsecs = u32::try_from(sub_ms * 1_000_000).unwrap_or(0);
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or(if ms < 0 {
            chrono::DateTime::<Utc>::MIN_UTC
        } else {
            chrono::DateTime::<Utc>::MAX_UTC
        })
        .naive_utc()
}

/// Format milliseconds since epoch as an ISO-8601 UTC string.
#[must_use]
pub fn ms_to_iso(ms: i64) -> String {
    ms_to_naive(ms)
        .and_utc()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Get current time as milliseconds since Unix epoch, with clock skew
/// protection.
///
/// If the wall clock jumped backward by more than 1 second, returns the last
/// observed value (monotonic guarantee for buffered timestamps). Forward
/// jumps over 5 minutes are counted.
#[inline]
#[must_use]
pub fn now_ms() -> i64 {
    let current = Utc::now().timestamp_millis();
    let last = LAST_SYSTEM_TIME_MS.load(Ordering::Relaxed);

    if last != 0 {
        let delta = current - last;
        if delta < -BACKWARD_JUMP_THRESHOLD_MS {
            // Clock jumped backward — prevent timestamp regression.
            CLOCK_SKEW_BACKWARD_COUNT.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "clock moved backward by {}ms; clamping to high-water mark",
                -delta
            );
            // Don't update LAST_SYSTEM_TIME_MS so we keep the high-water mark.
            return last;
        }
        if delta > FORWARD_JUMP_THRESHOLD_MS {
            // Clock jumped forward — likely NTP correction or resume from suspend.
            CLOCK_SKEW_FORWARD_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    LAST_SYSTEM_TIME_MS.store(current, Ordering::Relaxed);
    current
}

/// Get the raw wall-clock time without skew protection.
///
/// Use this only when you need the actual system time (e.g., for display).
/// For buffered timestamps, always use [`now_ms`].
#[inline]
#[must_use]
pub fn now_ms_raw() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Clock skew metrics
// ---------------------------------------------------------------------------

/// Number of detected backward clock jumps.
static CLOCK_SKEW_BACKWARD_COUNT: AtomicI64 = AtomicI64::new(0);

/// Number of detected forward clock jumps.
static CLOCK_SKEW_FORWARD_COUNT: AtomicI64 = AtomicI64::new(0);

/// Snapshot of clock skew detection metrics.
#[derive(Debug, Clone, Default)]
pub struct ClockSkewMetrics {
    /// Number of backward clock jumps detected (>1s regression).
    pub backward_jumps: i64,
    /// Number of forward clock jumps detected (>5min advance).
    pub forward_jumps: i64,
    /// Last observed wall-clock value (milliseconds since epoch).
    pub last_system_time_ms: i64,
}

/// Return a snapshot of clock skew metrics.
#[must_use]
pub fn clock_skew_metrics() -> ClockSkewMetrics {
    ClockSkewMetrics {
        backward_jumps: CLOCK_SKEW_BACKWARD_COUNT.load(Ordering::Relaxed),
        forward_jumps: CLOCK_SKEW_FORWARD_COUNT.load(Ordering::Relaxed),
        last_system_time_ms: LAST_SYSTEM_TIME_MS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_roundtrip() {
        let dt = chrono::NaiveDate::from_ymd_opt(2026, 2, 24)
            .unwrap()
            .and_hms_milli_opt(15, 30, 0, 123)
            .unwrap();
        let ms = naive_to_ms(dt);
        assert_eq!(ms_to_naive(ms), dt);
    }

    #[test]
    fn epoch_is_zero() {
        let dt = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(naive_to_ms(dt), 0);
    }

    #[test]
    fn pre_epoch_is_negative() {
        let dt = chrono::NaiveDate::from_ymd_opt(1969, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(naive_to_ms(dt), -1_000);
        assert_eq!(ms_to_naive(-1_000), dt);
    }

    #[test]
    fn iso_formatting() {
        let dt = chrono::NaiveDate::from_ymd_opt(2026, 2, 24)
            .unwrap()
            .and_hms_milli_opt(15, 30, 0, 123)
            .unwrap();
        assert_eq!(ms_to_iso(naive_to_ms(dt)), "2026-02-24T15:30:00.123Z");
    }

    #[test]
    fn extreme_values_do_not_panic() {
        let _ = ms_to_naive(i64::MAX);
        let _ = ms_to_naive(i64::MIN);
    }

    #[test]
    fn now_ms_is_recent_and_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a - 1_000, "no large regression between calls");
        // Sanity: after 2020-01-01 in ms.
        assert!(a > 1_577_836_800_000);
    }

    #[test]
    fn skew_metrics_snapshot_is_consistent() {
        let _ = now_ms();
        let metrics = clock_skew_metrics();
        assert!(metrics.backward_jumps >= 0);
        assert!(metrics.forward_jumps >= 0);
        assert!(metrics.last_system_time_ms > 0);
    }
}
