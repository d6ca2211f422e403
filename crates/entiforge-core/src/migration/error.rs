//! Migration-specific error types.

use thiserror::Error;

/// Errors raised while generating or applying migration scripts.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A script could not be synthesized for one entity. Collected per
    /// entity; never aborts the rest of a generation run.
    #[error("generation failed for entity '{entity}' (id {entity_id}): {reason}")]
    Generation {
        /// The entity id.
        entity_id: i64,
        /// The entity name.
        entity: String,
        /// What went wrong.
        reason: String,
    },

    /// A script failed against the physical store. The marker stays at the
    /// last revision that committed.
    #[error("applying revision {revision} to table '{table}' failed: {source}")]
    Apply {
        /// The failing revision.
        revision: String,
        /// The table it targets.
        table: String,
        /// Underlying failure.
        #[source]
        source: crate::error::Error,
    },

    /// The scripts do not form one linear chain.
    #[error("broken migration chain: {reason}")]
    BrokenChain {
        /// Description of the defect.
        reason: String,
    },

    /// A revision is not part of the chain.
    #[error("unknown revision: {revision}")]
    UnknownRevision {
        /// The revision that was asked for.
        revision: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

impl From<rusqlite::Error> for MigrationError {
    fn from(err: rusqlite::Error) -> Self {
        MigrationError::Storage(err.into())
    }
}
