/*
[INPUT]:  Upload payloads, cancel requests, TrackerConfig
[OUTPUT]: Spawned task controllers, progress summaries, bounded shutdown
[POS]:    Facade layer - wires registry, controllers and gateway together
[UPDATE]: When changing submission or shutdown guarantees
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use uplift_adapter::{Passthrough, Preprocessor, TransferGateway, UploadClient, UploadPayload, ZlibCompressor};

use crate::cancel::CancelOutcome;
use crate::config::{PreprocessCodec, TrackerConfig};
use crate::lifecycle::{RunnerSettings, TaskRunner};
use crate::progress::{ProgressSummary, aggregate};
use crate::record::{TaskId, TaskPatch, TaskRecord};
use crate::registry::TaskRegistry;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const STRAY_POLL: Duration = Duration::from_millis(50);

/// Entry point for callers: submit files, cancel them, watch progress.
pub struct UploadManager {
    registry: Arc<TaskRegistry>,
    runner: TaskRunner,
    /// Join handles nobody is waiting on yet.
    handles: Mutex<Vec<(TaskId, JoinHandle<()>)>>,
    /// Every controller that has not been joined, wherever its handle is.
    aborts: Mutex<HashMap<TaskId, AbortHandle>>,
}

/// Join handles taken out of the manager by one waiter.
///
/// Whatever is still pending when the waiter is dropped goes back to the
/// manager, so a later wait or shutdown sees it.
struct Reclaim<'a> {
    manager: &'a UploadManager,
    pending: Vec<(TaskId, JoinHandle<()>)>,
}

impl Drop for Reclaim<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.manager.handles.lock().append(&mut self.pending);
        }
    }
}

impl UploadManager {
    pub fn new(
        gateway: Arc<dyn TransferGateway>,
        preprocessor: Arc<dyn Preprocessor>,
        settings: RunnerSettings,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let runner = TaskRunner::new(registry.clone(), gateway, preprocessor, settings);
        Self {
            registry,
            runner,
            handles: Mutex::new(Vec::new()),
            aborts: Mutex::new(HashMap::new()),
        }
    }

    /// Build a manager that talks to the configured HTTP upload endpoint.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let client = UploadClient::with_config(config.client_config(), &config.gateway.base_url)
            .with_context(|| format!("create UploadClient for {}", config.gateway.base_url))?;
        let preprocessor: Arc<dyn Preprocessor> = match config.preprocess.codec {
            PreprocessCodec::None => Arc::new(Passthrough),
            PreprocessCodec::Zlib => Arc::new(ZlibCompressor),
        };

        Ok(Self::new(Arc::new(client), preprocessor, config.runner_settings()))
    }

    /// Register one task per payload and start their controllers.
    ///
    /// Every record exists before this returns; must be called within a
    /// Tokio runtime.
    pub fn submit(&self, payloads: impl IntoIterator<Item = UploadPayload>) -> Vec<TaskId> {
        let mut ids = Vec::new();
        let mut spawned = Vec::new();
        let mut aborts = Vec::new();

        for payload in payloads {
            let id = self.registry.create(payload.name.clone(), payload.size());
            tracing::debug!(task_id = %id, name = %payload.name, "task submitted");

            let handle = tokio::spawn(self.runner.clone().run(id, payload));
            aborts.push((id, handle.abort_handle()));
            spawned.push((id, handle));
            ids.push(id);
        }

        self.aborts.lock().extend(aborts);
        self.handles.lock().extend(spawned);
        ids
    }

    pub fn cancel(&self, id: &TaskId) -> CancelOutcome {
        self.registry.cancel(id)
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    pub fn progress(&self) -> ProgressSummary {
        aggregate(&self.registry.snapshot())
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.registry.get(id)
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.registry.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.registry.subscribe()
    }

    pub fn remove(&self, id: &TaskId) -> Option<TaskRecord> {
        self.registry.remove(id)
    }

    pub fn evict_finished(&self) -> usize {
        self.registry.evict_finished()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Wait until every controller submitted so far has exited.
    ///
    /// A controller that panicked leaves its task marked `failed`. Dropping
    /// the future early hands unfinished controllers back to the manager.
    pub async fn wait_idle(&self) {
        loop {
            let mut batch = self.reclaim();
            if batch.pending.is_empty() {
                return;
            }

            while let Some(entry) = batch.pending.last_mut() {
                let id = entry.0;
                let res = (&mut entry.1).await;
                batch.pending.pop();
                self.joined(&id, res);
            }
        }
    }

    /// Cancel every task and wait for the controllers to exit.
    ///
    /// Guarantees a bounded shutdown time (30s). On timeout every controller
    /// still running is aborted and its task marked `canceled`, including
    /// controllers another `wait_idle` is currently waiting on.
    pub async fn shutdown_and_wait(&self) -> Result<()> {
        self.registry.root_token().cancel();
        self.join_all_with_deadline(SHUTDOWN_TIMEOUT).await
    }

    async fn join_all_with_deadline(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut batch = self.reclaim();
            while let Some(entry) = batch.pending.last_mut() {
                let id = entry.0;
                tokio::select! {
                    res = &mut entry.1 => {
                        batch.pending.pop();
                        self.joined(&id, res);
                    }
                    _ = tokio::time::sleep_until(deadline) => return self.expire(timeout),
                }
            }
            drop(batch);

            // Controllers held by a concurrent waiter are not in the batch.
            if self.aborts.lock().values().all(AbortHandle::is_finished) {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(STRAY_POLL) => {}
                _ = tokio::time::sleep_until(deadline) => return self.expire(timeout),
            }
        }
    }

    fn expire(&self, timeout: Duration) -> Result<()> {
        let stuck = self.abort_all();
        tracing::warn!(stuck, "shutdown deadline reached; controllers aborted");
        Err(anyhow!("shutdown timed out after {timeout:?}"))
    }

    fn reclaim(&self) -> Reclaim<'_> {
        Reclaim {
            manager: self,
            pending: std::mem::take(&mut *self.handles.lock()),
        }
    }

    fn joined(&self, id: &TaskId, res: Result<(), tokio::task::JoinError>) {
        self.aborts.lock().remove(id);
        if let Err(join_err) = res {
            self.record_join_error(id, &join_err);
        }
    }

    /// Abort every unjoined controller and mark its task canceled.
    /// Returns how many were still running.
    fn abort_all(&self) -> usize {
        let aborts = std::mem::take(&mut *self.aborts.lock());
        let mut stuck = 0;
        for (id, abort) in aborts {
            if !abort.is_finished() {
                stuck += 1;
            }
            abort.abort();
            self.registry.update(&id, TaskPatch::canceled());
        }
        stuck
    }

    fn record_join_error(&self, id: &TaskId, join_err: &tokio::task::JoinError) {
        if join_err.is_panic() {
            tracing::error!(task_id = %id, "task controller panicked: {join_err}");
            self.registry
                .update(id, TaskPatch::failed(format!("controller panicked: {join_err}")));
        } else {
            self.registry.update(id, TaskPatch::canceled());
        }
    }
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("tasks", &self.registry.len())
            .field("runner", &self.runner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TaskStatus;
    use async_trait::async_trait;
    use tokio_test::assert_ok;
    use tokio_util::sync::CancellationToken;
    use uplift_adapter::{ProgressFn, UploadError};
    use url::Url;

    /// Blocks until canceled.
    struct StalledGateway;

    #[async_trait]
    impl TransferGateway for StalledGateway {
        async fn transfer(
            &self,
            _payload: &UploadPayload,
            _on_progress: ProgressFn<'_>,
            cancel: &CancellationToken,
        ) -> uplift_adapter::Result<Url> {
            cancel.cancelled().await;
            Err(UploadError::Canceled)
        }
    }

    /// Reports the whole payload at once.
    struct InstantGateway;

    #[async_trait]
    impl TransferGateway for InstantGateway {
        async fn transfer(
            &self,
            payload: &UploadPayload,
            on_progress: ProgressFn<'_>,
            _cancel: &CancellationToken,
        ) -> uplift_adapter::Result<Url> {
            on_progress(payload.size());
            Ok(Url::parse(&format!("https://cdn.example.com/{}", payload.name))?)
        }
    }

    /// Never returns and ignores cancellation.
    struct StuckGateway {
        entered: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl TransferGateway for StuckGateway {
        async fn transfer(
            &self,
            _payload: &UploadPayload,
            _on_progress: ProgressFn<'_>,
            _cancel: &CancellationToken,
        ) -> uplift_adapter::Result<Url> {
            self.entered.notify_one();
            std::future::pending::<()>().await;
            Err(UploadError::Canceled)
        }
    }

    fn manager(gateway: Arc<dyn TransferGateway>) -> UploadManager {
        UploadManager::new(gateway, Arc::new(Passthrough), RunnerSettings::default())
    }

    #[tokio::test]
    async fn submit_creates_records_before_returning() {
        let manager = manager(Arc::new(StalledGateway));
        let ids = manager.submit(vec![
            UploadPayload::new("a.bin", vec![0u8; 10]),
            UploadPayload::new("b.bin", vec![0u8; 20]),
        ]);

        assert_eq!(ids.len(), 2);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|record| record.status == TaskStatus::InProgress));
        assert!(manager.progress().has_pending);

        manager.shutdown_and_wait().await.expect("shutdown");
    }

    #[tokio::test]
    async fn wait_idle_drives_all_tasks_to_success() {
        let manager = manager(Arc::new(InstantGateway));
        let ids = manager.submit((0..5).map(|n| UploadPayload::new(format!("f{n}"), vec![1u8; 8])));

        manager.wait_idle().await;

        for id in &ids {
            let record = manager.get(id).expect("record");
            assert_eq!(record.status, TaskStatus::Succeeded);
            assert_eq!(record.transferred_bytes, 8);
        }
        assert_eq!(
            manager.progress(),
            ProgressSummary {
                has_pending: false,
                percentage: 100
            }
        );
        assert_eq!(manager.evict_finished(), 5);
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn cancel_one_leaves_others_running() {
        let manager = manager(Arc::new(StalledGateway));
        let ids = manager.submit(vec![
            UploadPayload::new("keep", vec![0u8; 4]),
            UploadPayload::new("drop", vec![0u8; 4]),
        ]);

        assert_eq!(manager.cancel(&ids[1]), CancelOutcome::Signaled);
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.get(&ids[1]).map(|r| r.status) != Some(TaskStatus::Canceled) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("canceled task settles");

        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::InProgress);
        assert_eq!(manager.cancel(&ids[1]), CancelOutcome::AlreadyTerminal);

        manager.shutdown_and_wait().await.expect("shutdown");
        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_stuck_controllers() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let manager = manager(Arc::new(StuckGateway {
            entered: entered.clone(),
        }));
        let ids = manager.submit(vec![UploadPayload::new("stuck", vec![0u8; 4])]);
        entered.notified().await;

        let result = manager.shutdown_and_wait().await;
        assert!(result.is_err());
        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_after_expired_wait_cancels_stuck_controllers() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let manager = manager(Arc::new(StuckGateway {
            entered: entered.clone(),
        }));
        let ids = manager.submit(vec![UploadPayload::new("stuck", vec![0u8; 4])]);
        entered.notified().await;

        let idle = manager.wait_idle();
        tokio::pin!(idle);
        assert!(tokio::time::timeout(Duration::from_secs(30), &mut idle).await.is_err());

        // The expired waiter is still alive and holds the join handle.
        let result = manager.shutdown_and_wait().await;
        assert!(result.is_err());
        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::Canceled);

        tokio::time::timeout(Duration::from_secs(1), &mut idle)
            .await
            .expect("aborted controller releases the waiter");
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_wait_returns_handles_to_manager() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let manager = manager(Arc::new(StuckGateway {
            entered: entered.clone(),
        }));
        let ids = manager.submit(vec![UploadPayload::new("stuck", vec![0u8; 4])]);
        entered.notified().await;

        let expired = tokio::time::timeout(Duration::from_secs(30), manager.wait_idle()).await;
        assert!(expired.is_err());
        assert_eq!(manager.handles.lock().len(), 1);

        let result = manager.shutdown_and_wait().await;
        assert!(result.is_err());
        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::Canceled);
        assert!(manager.aborts.lock().is_empty());

        tokio::time::timeout(Duration::from_secs(1), manager.wait_idle())
            .await
            .expect("aborted controller joins");
    }

    #[tokio::test]
    async fn shutdown_with_concurrent_waiter_finishes_cleanly() {
        let manager = Arc::new(manager(Arc::new(StalledGateway)));
        let ids = manager.submit(vec![UploadPayload::new("a.bin", vec![0u8; 4])]);

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_idle().await })
        };
        tokio::task::yield_now().await;

        assert_ok!(manager.shutdown_and_wait().await);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter finishes")
            .expect("waiter task");
        assert_eq!(manager.get(&ids[0]).expect("record").status, TaskStatus::Canceled);
    }

    #[test]
    fn from_config_selects_codec() {
        let yaml = "gateway:\n  base_url: http://127.0.0.1:9/\npreprocess:\n  codec: none\n";
        let config = TrackerConfig::from_yaml_str(yaml).expect("config");
        let manager = UploadManager::from_config(&config).expect("manager");
        assert!(format!("{manager:?}").contains("\"none\""));
    }
}
