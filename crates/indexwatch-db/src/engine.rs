//! Narrow seams to the storage engine and the version store.
//!
//! The migration coordinator never talks to a concrete engine. It consumes
//! two capabilities: a [`VersionStore`] that owns the per-database schema
//! version, and a [`SchemaConnector`] that opens an exclusive upgrade
//! transaction at a target version. Both are small traits so the coordinator
//! can be exercised against the in-memory engine without real storage.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::EngineResult;

/// Declarative target for one secondary index.
///
/// The per-database target schemas in [`crate::registry`] are ordered lists
/// of these, consumed by one generic idempotent-create routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    /// Object store the index lives on.
    pub store: &'static str,
    /// Index name, unique within the store.
    pub name: &'static str,
    /// Field path(s) the index derives its keys from.
    pub key_paths: &'static [&'static str],
    /// Whether the index enforces key uniqueness.
    pub unique: bool,
}

impl IndexSpec {
    /// The `"store.indexName"` label reported in migration results.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}.{}", self.store, self.name)
    }
}

/// Owner of the per-database schema version.
///
/// The single source of truth for "what version is this database at". The
/// coordinator always reads fresh, never caches across databases or
/// invocations.
pub trait VersionStore: Send + Sync {
    /// Current version of `database`; 0 when unset.
    fn get_version(&self, database: &str) -> EngineResult<u32>;

    /// Persist `version` for `database`.
    fn set_version(&self, database: &str, version: u32) -> EngineResult<()>;
}

/// Mutation surface available inside an exclusive upgrade transaction.
pub trait UpgradeTx {
    /// Names of the object stores currently declared in the database.
    fn store_names(&self) -> Vec<String>;

    /// Names of the indexes declared on `store`.
    fn index_names(&self, store: &str) -> EngineResult<Vec<String>>;

    /// Create `store` if it does not exist yet.
    fn ensure_store(&mut self, store: &str) -> EngineResult<()>;

    /// Create a new index on `store` per `spec`.
    fn create_index(&mut self, store: &str, spec: &IndexSpec) -> EngineResult<()>;
}

/// Callback run inside the upgrade transaction.
pub type UpgradeFn<'a> = &'a mut dyn FnMut(&mut dyn UpgradeTx) -> EngineResult<()>;

/// Connection opener for versioned logical databases.
pub trait SchemaConnector: Send + Sync {
    /// Open `database` at `target_version` and run `apply` inside an
    /// exclusive upgrade transaction.
    ///
    /// The engine guarantees `apply` completes (commit) or the schema is
    /// left untouched (abort) before any other connection can observe the
    /// new version. `target_version` must exceed the database's current
    /// engine-side version.
    fn upgrade(
        &self,
        database: &str,
        target_version: u32,
        apply: UpgradeFn<'_>,
    ) -> EngineResult<()>;

    /// Read-only schema description: store name -> declared index names.
    fn describe(&self, database: &str) -> EngineResult<BTreeMap<String, Vec<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_spec_label() {
        let spec = IndexSpec {
            store: "products",
            name: "barcode",
            key_paths: &["barcode"],
            unique: true,
        };
        assert_eq!(spec.label(), "products.barcode");
    }

    #[test]
    fn index_spec_serializes() {
        let spec = IndexSpec {
            store: "sales",
            name: "date",
            key_paths: &["date"],
            unique: false,
        };
        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json["store"], "sales");
        assert_eq!(json["unique"], false);
    }
}
