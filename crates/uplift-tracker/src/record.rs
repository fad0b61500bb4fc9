/*
[INPUT]:  Submission metadata and partial field updates from task controllers
[OUTPUT]: Task records with guarded merge semantics
[POS]:    State layer - per-task record and status machine
[UPDATE]: When record fields or merge rules change
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Opaque task identifier, generated at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Task status. `InProgress` covers both pre-processing and transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Returns true for absorbing states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One submitted file and everything known about its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub original_size: u64,
    pub processed_size: Option<u64>,
    pub transferred_bytes: u64,
    pub status: TaskStatus,
    pub remote_location: Option<Url>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(id: TaskId, name: impl Into<String>, original_size: u64) -> Self {
        Self {
            id,
            name: name.into(),
            original_size,
            processed_size: None,
            transferred_bytes: 0,
            status: TaskStatus::InProgress,
            remote_location: None,
            failure: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Upper bound for `transferred_bytes` at this point of the pipeline.
    pub fn transfer_limit(&self) -> u64 {
        self.processed_size.unwrap_or(self.original_size)
    }

    /// Merge a patch into the record. Returns true if any field changed.
    ///
    /// Terminal records are frozen, `processed_size` is write-once,
    /// `transferred_bytes` only moves forward within the current limit and
    /// `remote_location` is only taken together with a `succeeded` status.
    pub fn apply(&mut self, patch: TaskPatch) -> bool {
        if self.is_terminal() {
            return false;
        }

        let mut changed = false;

        if let Some(size) = patch.processed_size {
            if self.processed_size.is_none() {
                self.processed_size = Some(size);
                self.transferred_bytes = self.transferred_bytes.min(size);
                changed = true;
            }
        }

        if let Some(bytes) = patch.transferred_bytes {
            let next = bytes.min(self.transfer_limit());
            if next > self.transferred_bytes {
                self.transferred_bytes = next;
                changed = true;
            }
        }

        // A location only makes sense on the write that marks success.
        if let Some(location) = patch.remote_location {
            if patch.status == Some(TaskStatus::Succeeded) {
                self.remote_location = Some(location);
                changed = true;
            }
        }

        if let Some(failure) = patch.failure {
            self.failure = Some(failure);
            changed = true;
        }

        if let Some(status) = patch.status {
            if status != self.status {
                self.status = status;
                if status.is_terminal() {
                    self.finished_at = Some(Utc::now());
                }
                changed = true;
            }
        }

        changed
    }
}

/// Partial update of a task record; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub processed_size: Option<u64>,
    pub transferred_bytes: Option<u64>,
    pub status: Option<TaskStatus>,
    pub remote_location: Option<Url>,
    pub failure: Option<String>,
}

impl TaskPatch {
    pub fn processed(size: u64) -> Self {
        Self {
            processed_size: Some(size),
            ..Self::default()
        }
    }

    pub fn transferred(bytes: u64) -> Self {
        Self {
            transferred_bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn succeeded(location: Url) -> Self {
        Self {
            status: Some(TaskStatus::Succeeded),
            remote_location: Some(location),
            ..Self::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: Some(TaskStatus::Canceled),
            ..Self::default()
        }
    }
}
