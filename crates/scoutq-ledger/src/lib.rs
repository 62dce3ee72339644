//! Durable task ledger, profile reconciliation, artifact sequencing and
//! expiry sweeping on top of an [`scoutq_store::ObjectStore`].

pub mod error;
pub mod ledger;
pub mod reaper;
pub mod reconcile;
pub mod sequence;

pub use error::LedgerError;
pub use ledger::{
    ClaimedTask, CompleteOutcome, Completion, NewTask, ReclaimReport, StatusCounts, TaskEntry,
    TaskLedger,
};
pub use reaper::{ExpiryReaper, SweepReport, EXPIRATION_METADATA};
pub use reconcile::{is_complete, merge, ProfileStore};
pub use sequence::{ArtifactSequencer, ArtifactWriter, WrittenArtifact};
