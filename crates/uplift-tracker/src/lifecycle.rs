/*
[INPUT]:  Task id + payload, TaskRegistry, Preprocessor, TransferGateway
[OUTPUT]: Exactly one terminal status write per task
[POS]:    Execution layer - per-task pipeline (pre-process -> transfer -> terminal)
[UPDATE]: When changing pipeline stages or failure classification
*/

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uplift_adapter::{PreprocessError, PreprocessOptions, Preprocessor, TransferGateway, UploadError, UploadPayload};
use url::Url;

use crate::record::{TaskId, TaskPatch, TaskStatus};
use crate::registry::TaskRegistry;

/// What to do when the pre-processor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessFailurePolicy {
    /// End the task as `failed`.
    #[default]
    Fail,
    /// Transfer the original payload instead.
    SendOriginal,
}

/// Why a task did not succeed.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("canceled")]
    Canceled,

    #[error("transfer failed: {0}")]
    TransferFailed(#[source] UploadError),

    #[error("pre-processing failed: {0}")]
    PreprocessingFailed(#[source] PreprocessError),
}

impl TaskFailure {
    /// Terminal status this failure maps to.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskFailure::Canceled => TaskStatus::Canceled,
            TaskFailure::TransferFailed(_) | TaskFailure::PreprocessingFailed(_) => {
                TaskStatus::Failed
            }
        }
    }

    fn into_patch(self) -> TaskPatch {
        match self {
            TaskFailure::Canceled => TaskPatch::canceled(),
            other => TaskPatch::failed(other.to_string()),
        }
    }
}

impl From<UploadError> for TaskFailure {
    fn from(err: UploadError) -> Self {
        if err.is_canceled() {
            TaskFailure::Canceled
        } else {
            TaskFailure::TransferFailed(err)
        }
    }
}

/// Static settings shared by every controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerSettings {
    pub preprocess: PreprocessOptions,
    pub on_preprocess_failure: PreprocessFailurePolicy,
}

/// Drives a single task from submission to its terminal status.
///
/// Cheap to clone; one clone runs per task.
#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    gateway: Arc<dyn TransferGateway>,
    preprocessor: Arc<dyn Preprocessor>,
    settings: RunnerSettings,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("preprocessor", &self.preprocessor.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    pub fn new(
        registry: Arc<TaskRegistry>,
        gateway: Arc<dyn TransferGateway>,
        preprocessor: Arc<dyn Preprocessor>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            registry,
            gateway,
            preprocessor,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Run the pipeline for `id` and write its terminal status.
    pub async fn run(self, id: TaskId, payload: UploadPayload) {
        let Some(cancel) = self.registry.cancellation_token(&id) else {
            tracing::debug!(task_id = %id, "task vanished before start");
            return;
        };

        tracing::info!(
            task_id = %id,
            name = %payload.name,
            bytes = payload.size(),
            preprocessor = self.preprocessor.name(),
            "task starting"
        );

        let patch = match self.pipeline(id, payload, &cancel).await {
            Ok(location) => {
                tracing::info!(task_id = %id, location = %location, "task succeeded");
                TaskPatch::succeeded(location)
            }
            Err(TaskFailure::Canceled) => {
                tracing::info!(task_id = %id, "task canceled");
                TaskPatch::canceled()
            }
            Err(failure) => {
                tracing::warn!(task_id = %id, error = %failure, "task failed");
                failure.into_patch()
            }
        };

        self.registry.update(&id, patch);
    }

    async fn pipeline(
        &self,
        id: TaskId,
        payload: UploadPayload,
        cancel: &CancellationToken,
    ) -> Result<Url, TaskFailure> {
        if cancel.is_cancelled() {
            return Err(TaskFailure::Canceled);
        }

        let payload = self.preprocess(id, payload, cancel).await?;

        // The gateway must honor a signaled token too; this keeps the outcome
        // deterministic for gateways that only poll between operations.
        if cancel.is_cancelled() {
            return Err(TaskFailure::Canceled);
        }

        let registry = self.registry.clone();
        let on_progress = move |bytes: u64| {
            tracing::debug!(task_id = %id, bytes, "transfer progress");
            registry.update(&id, TaskPatch::transferred(bytes));
        };

        let location = self.gateway.transfer(&payload, &on_progress, cancel).await?;
        Ok(location)
    }

    async fn preprocess(
        &self,
        id: TaskId,
        payload: UploadPayload,
        cancel: &CancellationToken,
    ) -> Result<UploadPayload, TaskFailure> {
        let original_size = payload.size();
        let processed = self.run_preprocessor(payload.bytes.clone()).await;

        match processed {
            Ok(bytes) => {
                let processed_size = bytes.len() as u64;
                tracing::debug!(
                    task_id = %id,
                    original_size,
                    processed_size,
                    "pre-processing complete"
                );
                self.registry.update(&id, TaskPatch::processed(processed_size));
                Ok(payload.with_bytes(bytes))
            }
            // A cancel signaled while the codec ran outranks its error.
            Err(err) if cancel.is_cancelled() => {
                tracing::debug!(task_id = %id, error = %err, "pre-processing failed after cancel");
                Err(TaskFailure::Canceled)
            }
            Err(err) => match self.settings.on_preprocess_failure {
                PreprocessFailurePolicy::Fail => Err(TaskFailure::PreprocessingFailed(err)),
                PreprocessFailurePolicy::SendOriginal => {
                    tracing::warn!(
                        task_id = %id,
                        error = %err,
                        "pre-processing failed; sending original payload"
                    );
                    self.registry.update(&id, TaskPatch::processed(original_size));
                    Ok(payload)
                }
            },
        }
    }

    async fn run_preprocessor(&self, input: Bytes) -> Result<Bytes, PreprocessError> {
        let preprocessor = self.preprocessor.clone();
        let options = self.settings.preprocess;

        tokio::task::spawn_blocking(move || preprocessor.process(input, &options))
            .await
            .map_err(|err| PreprocessError::Worker(err.to_string()))?
    }
}
