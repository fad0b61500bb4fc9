/*
[INPUT]:  Cancellation requests keyed by task id
[OUTPUT]: Signaled per-task tokens observed by the transfer gateway
[POS]:    Cancellation layer - cooperative stop requests
[UPDATE]: When cancellation semantics change
*/

use crate::record::TaskId;
use crate::registry::TaskRegistry;

/// What a cancellation request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task's token is now signaled.
    Signaled,
    /// The task already reached a terminal status; nothing changed.
    AlreadyTerminal,
    /// No task with this id exists.
    Unknown,
}

impl TaskRegistry {
    /// Request early termination of one task.
    ///
    /// Signaling is idempotent. The controller observes the token and writes
    /// the `canceled` status itself; this call never touches the record.
    pub fn cancel(&self, id: &TaskId) -> CancelOutcome {
        let outcome = self.with_entry(id, |entry| {
            if entry.record.is_terminal() {
                CancelOutcome::AlreadyTerminal
            } else {
                entry.cancel.cancel();
                CancelOutcome::Signaled
            }
        });

        let outcome = outcome.unwrap_or(CancelOutcome::Unknown);
        tracing::debug!(task_id = %id, outcome = ?outcome, "cancel requested");
        outcome
    }

    /// Signal every task that is still in progress. Returns how many were signaled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.in_progress_tokens();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }
}
