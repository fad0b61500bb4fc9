/*
[INPUT]:  Task submissions, partial updates from controllers, eviction requests
[OUTPUT]: Atomic point lookups, ordered snapshots, revision notifications
[POS]:    State layer - sole owner of all task records
[UPDATE]: When the mutation protocol or snapshot guarantees change
*/

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::record::{TaskId, TaskPatch, TaskRecord};

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) record: TaskRecord,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<TaskId, Entry>,
    order: Vec<TaskId>,
}

/// Concurrent-safe collection of task records keyed by id.
///
/// Every operation takes the lock, works on plain data and releases it
/// before returning; callers only ever see clones of stored records.
#[derive(Debug)]
pub struct TaskRegistry {
    inner: RwLock<Inner>,
    root: CancellationToken,
    revision: watch::Sender<u64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            root: CancellationToken::new(),
            revision,
        }
    }

    /// Insert a fresh in-progress record and return its id.
    pub fn create(&self, name: impl Into<String>, original_size: u64) -> TaskId {
        let id = TaskId::new();
        let entry = Entry {
            record: TaskRecord::new(id, name, original_size),
            cancel: self.root.child_token(),
        };

        {
            let mut inner = self.inner.write();
            inner.entries.insert(id, entry);
            inner.order.push(id);
        }

        self.bump();
        id
    }

    /// Merge `patch` into the record as one atomic step.
    ///
    /// Unknown ids are ignored: the record may have been removed concurrently.
    pub fn update(&self, id: &TaskId, patch: TaskPatch) -> bool {
        let changed = {
            let mut inner = self.inner.write();
            match inner.entries.get_mut(id) {
                Some(entry) => entry.record.apply(patch),
                None => {
                    tracing::trace!(task_id = %id, "update for unknown task ignored");
                    return false;
                }
            }
        };

        if changed {
            self.bump();
        }
        changed
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.inner.read().entries.get(id).map(|entry| entry.record.clone())
    }

    /// Point-in-time copy of every record, in submission order.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn cancellation_token(&self, id: &TaskId) -> Option<CancellationToken> {
        self.inner.read().entries.get(id).map(|entry| entry.cancel.clone())
    }

    /// Token every task token derives from.
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Receiver whose value changes after every successful mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Remove one record. An in-progress task is canceled on the way out.
    pub fn remove(&self, id: &TaskId) -> Option<TaskRecord> {
        let removed = {
            let mut inner = self.inner.write();
            let entry = inner.entries.remove(id)?;
            inner.order.retain(|other| other != id);
            entry
        };

        if !removed.record.is_terminal() {
            removed.cancel.cancel();
        }
        self.bump();
        Some(removed.record)
    }

    /// Drop every terminal record. Returns how many were removed.
    pub fn evict_finished(&self) -> usize {
        let evicted = {
            let mut inner = self.inner.write();
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| !entry.record.is_terminal());
            let Inner { entries, order } = &mut *inner;
            order.retain(|id| entries.contains_key(id));
            before - entries.len()
        };

        if evicted > 0 {
            self.bump();
        }
        evicted
    }

    pub(crate) fn with_entry<R>(&self, id: &TaskId, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        self.inner.read().entries.get(id).map(f)
    }

    pub(crate) fn in_progress_tokens(&self) -> Vec<CancellationToken> {
        self.inner
            .read()
            .entries
            .values()
            .filter(|entry| !entry.record.is_terminal())
            .map(|entry| entry.cancel.clone())
            .collect()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
