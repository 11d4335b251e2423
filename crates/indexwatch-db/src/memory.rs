//! In-memory schema engine and version store.
//!
//! A faithful stand-in for the embedded storage engine: logical databases
//! with object stores, named secondary indexes, and an exclusive upgrade
//! gate behind a monotonically increasing per-database version. Backs the
//! test suite and the simulated/preview deployments; also the reference for
//! what a real connector must guarantee (abort leaves the schema untouched).

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use indexwatch_core::{LockLevel, OrderedMutex};

use crate::engine::{IndexSpec, SchemaConnector, UpgradeFn, UpgradeTx, VersionStore};
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Version store
// =============================================================================

/// In-memory [`VersionStore`]: one integer per database name, 0 when unset.
#[derive(Debug)]
pub struct MemoryVersionStore {
    versions: OrderedMutex<BTreeMap<String, u32>>,
}

impl Default for MemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVersionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: OrderedMutex::new(LockLevel::EngineVersions, BTreeMap::new()),
        }
    }
}

impl VersionStore for MemoryVersionStore {
    fn get_version(&self, database: &str) -> EngineResult<u32> {
        Ok(self.versions.lock().get(database).copied().unwrap_or(0))
    }

    fn set_version(&self, database: &str, version: u32) -> EngineResult<()> {
        self.versions.lock().insert(database.to_string(), version);
        Ok(())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// One secondary index as the engine stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexDef {
    key_paths: Vec<String>,
    unique: bool,
}

/// An object store: named indexes in declaration order.
#[derive(Debug, Clone, Default)]
struct StoreState {
    indexes: IndexMap<String, IndexDef>,
}

/// A logical database: engine-side version plus its stores.
#[derive(Debug, Clone, Default)]
struct DatabaseState {
    version: u32,
    stores: IndexMap<String, StoreState>,
}

/// Everything behind one lock: the databases plus injected failures.
#[derive(Debug, Default)]
struct CatalogState {
    databases: BTreeMap<String, DatabaseState>,
    failing: BTreeSet<String>,
}

/// In-memory [`SchemaConnector`].
#[derive(Debug)]
pub struct MemoryEngine {
    catalog: OrderedMutex<CatalogState>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: OrderedMutex::new(LockLevel::EngineCatalog, CatalogState::default()),
        }
    }

    /// Make every future upgrade of `database` abort. Test hook for
    /// fault-isolation scenarios.
    pub fn fail_database(&self, database: &str) {
        self.catalog.lock().failing.insert(database.to_string());
    }

    /// Clear an injected failure.
    pub fn heal_database(&self, database: &str) {
        self.catalog.lock().failing.remove(database);
    }

    /// Engine-side version of `database`, if the engine has seen it.
    #[must_use]
    pub fn engine_version(&self, database: &str) -> Option<u32> {
        self.catalog
            .lock()
            .databases
            .get(database)
            .map(|db| db.version)
    }
}

/// Upgrade transaction over a staged copy of the stores. Committed by the
/// engine only when the apply callback returns `Ok`.
struct MemoryUpgradeTx<'a> {
    database: &'a str,
    stores: &'a mut IndexMap<String, StoreState>,
}

impl UpgradeTx for MemoryUpgradeTx<'_> {
    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        let state = self
            .stores
            .get(store)
            .ok_or_else(|| EngineError::UnknownStore {
                database: self.database.to_string(),
                store: store.to_string(),
            })?;
        Ok(state.indexes.keys().cloned().collect())
    }

    fn ensure_store(&mut self, store: &str) -> EngineResult<()> {
        self.stores.entry(store.to_string()).or_default();
        Ok(())
    }

    fn create_index(&mut self, store: &str, spec: &IndexSpec) -> EngineResult<()> {
        let state = self
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::UnknownStore {
                database: self.database.to_string(),
                store: store.to_string(),
            })?;
        if state.indexes.contains_key(spec.name) {
            return Err(EngineError::DuplicateIndex {
                store: store.to_string(),
                index: spec.name.to_string(),
            });
        }
        state.indexes.insert(
            spec.name.to_string(),
            IndexDef {
                key_paths: spec.key_paths.iter().map(|p| (*p).to_string()).collect(),
                unique: spec.unique,
            },
        );
        Ok(())
    }
}

impl SchemaConnector for MemoryEngine {
    fn upgrade(
        &self,
        database: &str,
        target_version: u32,
        apply: UpgradeFn<'_>,
    ) -> EngineResult<()> {
        let mut catalog = self.catalog.lock();

        if catalog.failing.contains(database) {
            return Err(EngineError::transaction(database, "injected failure"));
        }

        let db = catalog.databases.entry(database.to_string()).or_default();
        if target_version <= db.version {
            return Err(EngineError::VersionConflict {
                database: database.to_string(),
                current: db.version,
                target: target_version,
            });
        }

        // Run the callback against a staged copy; commit only on success so
        // an abort leaves the schema untouched.
        let mut staged = db.stores.clone();
        let mut tx = MemoryUpgradeTx {
            database,
            stores: &mut staged,
        };
        apply(&mut tx)?;

        db.stores = staged;
        db.version = target_version;
        Ok(())
    }

    fn describe(&self, database: &str) -> EngineResult<BTreeMap<String, Vec<String>>> {
        let catalog = self.catalog.lock();
        let db = catalog
            .databases
            .get(database)
            .ok_or_else(|| EngineError::open(database, "no such database"))?;
        Ok(db
            .stores
            .iter()
            .map(|(store, state)| (store.clone(), state.indexes.keys().cloned().collect()))
            .collect())
    }
}
