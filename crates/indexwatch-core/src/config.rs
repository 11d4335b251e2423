//! Configuration management for Indexwatch.
//!
//! Configuration is loaded from environment variables. Every knob has a
//! sensible default so the subsystem runs unconfigured; deployments override
//! individual keys (`INDEXWATCH_*`) rather than supplying a config file.

use std::env;

/// Main configuration struct for the telemetry and migration subsystem.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether fallback telemetry recording is enabled at startup.
    pub telemetry_enabled: bool,
    /// Maximum number of fallback events retained (FIFO eviction beyond this).
    pub telemetry_capacity: usize,
    /// Health alert threshold: fallback events per minute (clamped to >= 1).
    pub health_threshold_per_minute: u32,
    /// Seconds between health monitor checks.
    pub health_tick_seconds: u64,
    /// Trailing window evaluated at each health check, in seconds.
    pub health_window_seconds: u64,
    /// Simulated mode: schema migration returns a success stub and mutates
    /// nothing. Intended for automated UI tests and preview environments.
    pub simulated: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telemetry_enabled: true,
            telemetry_capacity: 2000,
            health_threshold_per_minute: 20,
            health_tick_seconds: 30,
            health_window_seconds: 60,
            simulated: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            telemetry_enabled: env_bool("INDEXWATCH_TELEMETRY", defaults.telemetry_enabled),
            telemetry_capacity: env_usize(
                "INDEXWATCH_TELEMETRY_CAPACITY",
                defaults.telemetry_capacity,
            )
            .max(1),
            health_threshold_per_minute: env_u32(
                "INDEXWATCH_HEALTH_THRESHOLD",
                defaults.health_threshold_per_minute,
            )
            .max(1),
            health_tick_seconds: env_u64(
                "INDEXWATCH_HEALTH_TICK_SECONDS",
                defaults.health_tick_seconds,
            )
            .max(1),
            health_window_seconds: env_u64(
                "INDEXWATCH_HEALTH_WINDOW_SECONDS",
                defaults.health_window_seconds,
            )
            .max(1),
            simulated: env_bool("INDEXWATCH_SIMULATED", defaults.simulated),
        }
    }

    /// Get the cached process-wide configuration, loading it on first use.
    #[must_use]
    pub fn get() -> Self {
        global_config_cache_get()
    }

    /// Drop the cached configuration so the next [`Config::get`] reloads it.
    /// Test hook; production code loads once and keeps it.
    pub fn reset_cached() {
        let mut guard = CONFIG_CACHE
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }
}

/// Convenience accessor for the cached process-wide [`Config`].
#[must_use]
pub fn config() -> Config {
    Config::get()
}

// Module-level shared config cache (used by `Config::get` and `Config::reset_cached`).
static CONFIG_CACHE: std::sync::RwLock<Option<Config>> = std::sync::RwLock::new(None);

fn global_config_cache_get() -> Config {
    // Fast path: read lock, return clone if present
    {
        let guard = CONFIG_CACHE
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref c) = *guard {
            return c.clone();
        }
    }
    let loaded = Config::from_env();
    let mut guard = CONFIG_CACHE
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.get_or_insert_with(|| loaded).clone()
}

// Helper functions for environment variable parsing

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
