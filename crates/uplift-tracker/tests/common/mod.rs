/*
[INPUT]:  Test scenarios needing controllable transfer gateways
[OUTPUT]: Scripted gateways and manager builders
[POS]:    Test infrastructure - shared across tracker integration tests
[UPDATE]: When adding new gateway behaviors to test against
*/

//! Common test utilities for uplift-tracker tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uplift_adapter::{Passthrough, ProgressFn, TransferGateway, UploadError, UploadPayload};
use uplift_tracker::{RunnerSettings, UploadManager};
use url::Url;

/// Reports progress in `step`-sized increments, then succeeds.
pub struct SteppedGateway {
    pub step: u64,
    pub calls: AtomicUsize,
}

impl SteppedGateway {
    pub fn new(step: u64) -> Self {
        Self {
            step,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TransferGateway for SteppedGateway {
    async fn transfer(
        &self,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> uplift_adapter::Result<Url> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = payload.size();
        let mut sent = 0;
        while sent < total {
            if cancel.is_cancelled() {
                return Err(UploadError::Canceled);
            }
            sent = (sent + self.step).min(total);
            on_progress(sent);
            tokio::task::yield_now().await;
        }
        Ok(Url::parse(&format!("https://cdn.example.com/{}", payload.name))?)
    }
}

/// Holds every transfer until opened or canceled.
pub struct GatedGateway {
    gate: watch::Sender<bool>,
    pub entered: AtomicUsize,
}

impl GatedGateway {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            gate,
            entered: AtomicUsize::new(0),
        }
    }

    /// Let every waiting and future transfer complete.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Yield until `count` transfers are parked at the gate.
    pub async fn wait_entered(&self, count: usize) {
        while self.entered.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl TransferGateway for GatedGateway {
    async fn transfer(
        &self,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> uplift_adapter::Result<Url> {
        let mut gate = self.gate.subscribe();
        on_progress(payload.size() / 2);
        self.entered.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Canceled),
            _ = gate.wait_for(|open| *open) => {
                on_progress(payload.size());
                Ok(Url::parse(&format!("https://cdn.example.com/{}", payload.name))?)
            }
        }
    }
}

/// Fails every transfer with the given HTTP status.
pub struct RejectingGateway(pub u16);

#[async_trait]
impl TransferGateway for RejectingGateway {
    async fn transfer(
        &self,
        _payload: &UploadPayload,
        _on_progress: ProgressFn<'_>,
        _cancel: &CancellationToken,
    ) -> uplift_adapter::Result<Url> {
        Err(UploadError::Api {
            code: self.0,
            message: "rejected".to_string(),
        })
    }
}

/// Manager without pre-processing in front of `gateway`
pub fn passthrough_manager(gateway: Arc<dyn TransferGateway>) -> UploadManager {
    UploadManager::new(gateway, Arc::new(Passthrough), RunnerSettings::default())
}

pub fn payload(name: &str, size: usize) -> UploadPayload {
    UploadPayload::new(name, vec![0x5au8; size])
}
