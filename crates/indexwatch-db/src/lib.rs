//! Index telemetry and schema migration for versioned embedded databases.
//!
//! When a read/write/delete/query has to fall back to a table scan because a
//! secondary index is missing, the host records a [`FallbackRecord`] into a
//! bounded [`FallbackTracker`]. The [`advisor`] ranks those events into
//! concrete missing-index candidates, the [`monitor`] raises an alert when
//! the fallback rate spikes, and the [`optimizer`] brings every registered
//! database up to its target index set via idempotent versioned upgrades.
//!
//! There is no global state: a [`TelemetryHub`] owns the tracker and the
//! monitor slot, and the coordinator takes its engine seams
//! ([`SchemaConnector`], [`VersionStore`]) as explicit arguments.

#![forbid(unsafe_code)]

pub mod advisor;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod optimizer;
pub mod registry;
pub mod telemetry;

pub use advisor::{Candidate, PhraseMatcher, ReasonMatcher, missing_index_candidates};
pub use context::TelemetryHub;
pub use engine::{IndexSpec, SchemaConnector, UpgradeTx, VersionStore};
pub use error::{EngineError, EngineResult};
pub use memory::{MemoryEngine, MemoryVersionStore};
pub use monitor::{MonitorConfig, MonitorHandle};
pub use optimizer::{
    IndexReport, MigrationReport, OptimizeOptions, list_current_indexes, optimize_all_databases,
};
pub use registry::DATABASES;
pub use telemetry::{
    FallbackEvent, FallbackRecord, FallbackSnapshot, FallbackTracker, OperationKind,
};
