//! Drives one claimed task through the processor and persists its outputs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use scoutq_core::ProfileRecord;
use scoutq_ledger::{ArtifactWriter, ClaimedTask, Completion, ProfileStore};
use scoutq_store::ObjectStore;

use crate::processor::{ProcessOutput, Processor};

pub struct Pipeline {
    processor: Arc<dyn Processor>,
    profiles: ProfileStore,
    artifacts: ArtifactWriter,
    artifact_ttl: Option<Duration>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Arc<dyn Processor>,
        artifact_ttl: Option<Duration>,
    ) -> Self {
        Self {
            processor,
            profiles: ProfileStore::new(Arc::clone(&store)),
            artifacts: ArtifactWriter::new(store),
            artifact_ttl,
        }
    }

    /// Run `task` to a terminal outcome. Never panics and never errors: every
    /// failure mode collapses into [`Completion::Failed`].
    pub async fn run(&self, task: &ClaimedTask) -> Completion {
        let output = match AssertUnwindSafe(self.processor.process(task))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Completion::Failed(e.to_string()),
            Err(panic_info) => {
                let message = extract_panic_message(&*panic_info);
                tracing::error!(
                    platform = %task.platform,
                    subject = %task.subject,
                    panic = %message,
                    "scheduler: processor panicked"
                );
                return Completion::Failed(format!("processor panicked: {message}"));
            }
        };

        if !output.success {
            let message = if output.message.trim().is_empty() {
                "processor reported failure".to_string()
            } else {
                output.message
            };
            return Completion::Failed(message);
        }

        match self.persist(task, output).await {
            Ok(()) => Completion::Succeeded,
            Err(message) => Completion::Failed(message),
        }
    }

    async fn persist(&self, task: &ClaimedTask, output: ProcessOutput) -> Result<(), String> {
        if let Some(raw) = output.profile {
            let profile = ProfileRecord::from_upstream(task.platform, &task.subject, raw)
                .map_err(|e| format!("profile rejected: {e}"))?;
            self.profiles
                .reconcile(profile)
                .await
                .map_err(|e| format!("profile write failed: {e}"))?;
        }

        for artifact in output.artifacts {
            let body = serde_json::to_vec_pretty(&artifact.body)
                .map_err(|e| format!("artifact {} encode failed: {e}", artifact.kind))?;
            let written = self
                .artifacts
                .write(
                    &artifact.kind,
                    task.platform,
                    &task.subject,
                    Bytes::from(body),
                    self.artifact_ttl,
                )
                .await
                .map_err(|e| format!("artifact {} write failed: {e}", artifact.kind))?;
            tracing::debug!(
                platform = %task.platform,
                subject = %task.subject,
                key = %written.key,
                "scheduler: artifact stored"
            );
        }
        Ok(())
    }
}

fn extract_panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
