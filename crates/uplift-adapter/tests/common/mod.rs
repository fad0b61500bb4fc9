/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for uplift-adapter tests

use std::sync::{Arc, Mutex};
use uplift_adapter::{ClientConfig, UploadClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client against the mock server with a tiny chunk size
pub fn client_with_chunk_size(server: &MockServer, chunk_size: usize) -> UploadClient {
    let config = ClientConfig {
        chunk_size,
        ..ClientConfig::default()
    };
    UploadClient::with_config(config, &server.uri()).expect("client init")
}

/// Mount `POST /uploads` answering with the given session id
pub async fn mount_create(server: &MockServer, upload_id: &str) {
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "upload_id": upload_id,
        })))
        .mount(server)
        .await;
}

/// Shared sink collecting progress callbacks
#[derive(Clone, Default)]
pub struct ProgressLog(Arc<Mutex<Vec<u64>>>);

impl ProgressLog {
    pub fn record(&self, bytes: u64) {
        self.0.lock().expect("progress lock").push(bytes);
    }

    pub fn values(&self) -> Vec<u64> {
        self.0.lock().expect("progress lock").clone()
    }
}
