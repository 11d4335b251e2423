//! Migration coordinator.
//!
//! Walks the registry's databases in fixed order and brings each one up to
//! its target index set inside a single versioned upgrade transaction.
//! Re-running is safe: indexes that already exist are skipped, a database
//! whose schema is already complete is not touched at all, and the schema
//! version only advances when an upgrade actually runs. Failures are
//! isolated per database; one broken database never blocks the rest.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::engine::{SchemaConnector, VersionStore};
use crate::error::EngineResult;
use crate::registry::{self, DATABASES};

/// Performance gain granted per created index, capped at [`MAX_GAIN_PERCENT`].
const GAIN_PER_INDEX_PERCENT: usize = 15;
const MAX_GAIN_PERCENT: usize = 80;

/// Aggregate outcome of one migration run across all databases.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// True only when every database succeeded (or was already complete).
    pub success: bool,
    /// Stores touched by an upgrade, across all databases.
    pub optimized_stores: BTreeSet<String>,
    /// `"store.indexName"` labels of indexes created this run.
    pub added_indexes: Vec<String>,
    /// One `"<database>: <message>"` entry per failed database.
    pub errors: Vec<String>,
    /// Human-readable estimate, set on overall success.
    pub performance_gain: Option<String>,
}

impl MigrationReport {
    fn stub() -> Self {
        Self {
            success: true,
            optimized_stores: BTreeSet::new(),
            added_indexes: Vec::new(),
            errors: Vec::new(),
            performance_gain: Some("simulated mode: no changes applied".to_string()),
        }
    }
}

/// Options for a migration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeOptions {
    /// Skip all engine work and report a deterministic success stub.
    /// Used by preview/simulated deployments that carry no real storage.
    pub simulated: bool,
}

impl OptimizeOptions {
    /// Build options from the process [`indexwatch_core::Config`].
    #[must_use]
    pub const fn from_config(config: &indexwatch_core::Config) -> Self {
        Self {
            simulated: config.simulated,
        }
    }
}

/// Per-database entry in the [`list_current_indexes`] diagnostic map.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndexReport {
    /// Store name -> declared index names.
    Stores(BTreeMap<String, Vec<String>>),
    /// The database could not be inspected.
    Error { error: String },
}

/// Run the full migration cycle over every registry database.
///
/// Databases are processed in [`DATABASES`] order. A failure in one database
/// is recorded and the walk continues; partial progress (stores and indexes
/// from databases that succeeded) is always retained in the report.
pub fn optimize_all_databases(
    connector: &dyn SchemaConnector,
    versions: &dyn VersionStore,
    options: OptimizeOptions,
) -> MigrationReport {
    if options.simulated {
        tracing::debug!("simulated mode: skipping schema migration");
        return MigrationReport::stub();
    }

    let mut report = MigrationReport {
        success: true,
        optimized_stores: BTreeSet::new(),
        added_indexes: Vec::new(),
        errors: Vec::new(),
        performance_gain: None,
    };

    for database in DATABASES {
        match optimize_database(connector, versions, database) {
            Ok((stores, added)) => {
                report.optimized_stores.extend(stores);
                report.added_indexes.extend(added);
            }
            Err(err) => {
                tracing::warn!(database, error = %err, "database migration failed");
                report.success = false;
                report.errors.push(format!("{database}: {err}"));
            }
        }
    }

    if report.success {
        report.performance_gain = Some(estimate_gain(report.added_indexes.len()));
    }
    report
}

/// Bring one database up to its registry targets.
///
/// Returns the stores touched and the `"store.indexName"` labels created.
/// When the current schema already contains every target index, the database
/// is skipped without opening an upgrade transaction, so its version does
/// not move.
fn optimize_database(
    connector: &dyn SchemaConnector,
    versions: &dyn VersionStore,
    database: &str,
) -> EngineResult<(BTreeSet<String>, Vec<String>)> {
    let targets = registry::target_indexes(database);
    if targets.is_empty() {
        return Ok((BTreeSet::new(), Vec::new()));
    }

    // A describe() failure here usually means the database does not exist
    // yet; the upgrade below creates it.
    if let Ok(schema) = connector.describe(database) {
        let missing = targets.iter().any(|spec| {
            !schema
                .get(spec.store)
                .is_some_and(|names| names.iter().any(|n| n == spec.name))
        });
        if !missing {
            tracing::debug!(database, "schema already complete, skipping");
            return Ok((BTreeSet::new(), Vec::new()));
        }
    }

    let current = versions.get_version(database)?;
    let target_version = current + 1;

    let mut touched = BTreeSet::new();
    let mut added = Vec::new();
    connector.upgrade(database, target_version, &mut |tx| {
        for spec in targets {
            tx.ensure_store(spec.store)?;
            touched.insert(spec.store.to_string());
            let existing = tx.index_names(spec.store)?;
            if existing.iter().any(|n| n == spec.name) {
                continue;
            }
            tx.create_index(spec.store, spec)?;
            added.push(spec.label());
        }
        Ok(())
    })?;

    versions.set_version(database, target_version)?;
    tracing::info!(
        database,
        version = target_version,
        added = added.len(),
        "database schema upgraded"
    );
    Ok((touched, added))
}

fn estimate_gain(added: usize) -> String {
    if added == 0 {
        return "no indexes added; schema already optimal".to_string();
    }
    let percent = (added * GAIN_PER_INDEX_PERCENT).min(MAX_GAIN_PERCENT);
    format!("~{percent}% faster indexed lookups ({added} indexes added)")
}

/// Current schema of every registry database, for diagnostics.
///
/// A database that cannot be inspected contributes an [`IndexReport::Error`]
/// entry instead of hiding the rest.
#[must_use]
pub fn list_current_indexes(connector: &dyn SchemaConnector) -> BTreeMap<String, IndexReport> {
    DATABASES
        .iter()
        .map(|database| {
            let report = match connector.describe(database) {
                Ok(schema) => IndexReport::Stores(schema),
                Err(err) => IndexReport::Error {
                    error: err.to_string(),
                },
            };
            ((*database).to_string(), report)
        })
        .collect()
}
