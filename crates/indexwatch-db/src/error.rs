//! Error types for the schema engine layer

use thiserror::Error;

/// Schema engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// The logical database could not be opened.
    #[error("cannot open database {database}: {message}")]
    Open { database: String, message: String },

    /// The exclusive upgrade transaction aborted.
    #[error("upgrade transaction failed for {database}: {message}")]
    Transaction { database: String, message: String },

    /// Target version does not advance the database's current version.
    ///
    /// The engine gates schema changes behind a monotonically increasing
    /// version; an upgrade at `target <= current` must be rejected.
    #[error("version conflict on {database}: current {current}, requested {target}")]
    VersionConflict {
        database: String,
        current: u32,
        target: u32,
    },

    /// An index with this name already exists on the store.
    #[error("index {index} already exists on store {store}")]
    DuplicateIndex { store: String, index: String },

    /// The object store does not exist in the database.
    #[error("no such store {store} in database {database}")]
    UnknownStore { database: String, store: String },

    /// Storage quota exceeded or backing storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for schema engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Create an open failure for a database.
    pub fn open(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Create a transaction abort for a database.
    pub fn transaction(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a per-database schema conflict (as opposed to a
    /// storage-level failure).
    #[must_use]
    pub const fn is_schema_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::DuplicateIndex { .. } | Self::UnknownStore { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_database_name() {
        let err = EngineError::open("posDB", "blocked by another connection");
        assert_eq!(
            err.to_string(),
            "cannot open database posDB: blocked by another connection"
        );
    }

    #[test]
    fn version_conflict_is_schema_conflict() {
        let err = EngineError::VersionConflict {
            database: "posDB".into(),
            current: 3,
            target: 3,
        };
        assert!(err.is_schema_conflict());
        assert!(!EngineError::Storage("disk full".into()).is_schema_conflict());
    }
}
