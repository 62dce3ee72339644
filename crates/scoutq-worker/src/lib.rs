//! Polling worker: claims tasks from the ledger in platform priority order,
//! hands them to a [`Processor`], and records the outcome.

pub mod pipeline;
pub mod processor;
pub mod scheduler;

pub use pipeline::Pipeline;
pub use processor::{ArtifactPayload, HttpProcessor, ProcessOutput, Processor, ProcessorError};
pub use scheduler::{
    IterationOutcome, PlatformScheduler, ReapSchedule, SchedulerConfig, SchedulerStats,
};
