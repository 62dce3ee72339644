use scoutq_core::{CoreError, TaskStatus};
use scoutq_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed JSON at {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid task transition for {key}: expected status {expected}, found {found}")]
    InvalidTransition {
        key: String,
        expected: TaskStatus,
        found: TaskStatus,
    },

    /// A conditional write lost against a concurrent writer.
    #[error("concurrent update to {key}")]
    Conflict { key: String },

    #[error("task {key} already exists")]
    AlreadyExists { key: String },

    #[error("task {key} not found")]
    NotFound { key: String },

    #[error("invalid artifact kind \"{0}\"")]
    InvalidArtifactKind(String),

    #[error("could not reserve a sequence number under {dir} after {attempts} attempts")]
    SequenceContention { dir: String, attempts: u32 },

    #[error(transparent)]
    Core(#[from] CoreError),
}
