//! Core utilities for Indexwatch
//!
//! This crate provides:
//! - Environment-driven configuration (`config`)
//! - Debug-only lock ordering primitives (`lock_order`)
//! - Millisecond timestamp helpers with clock-skew protection (`timestamps`)
//!
//! # Timestamp Convention
//!
//! All timestamps in the telemetry and migration layers are `i64` milliseconds
//! since the Unix epoch. Helpers are provided to convert to/from chrono types
//! for display.

#![forbid(unsafe_code)]

pub mod config;
pub mod lock_order;
pub mod timestamps;

pub use config::{Config, config};
pub use lock_order::{LockLevel, OrderedMutex, OrderedMutexGuard};
pub use timestamps::{
    ClockSkewMetrics, clock_skew_metrics, ms_to_iso, ms_to_naive, naive_to_ms, now_ms, now_ms_raw,
};
