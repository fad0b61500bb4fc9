/*
[INPUT]:  Upload payload, progress callback, cancellation token
[OUTPUT]: Remote URL of the stored file
[POS]:    HTTP layer - chunked upload endpoints
[UPDATE]: When the upload protocol or progress reporting changes
*/

// ### Upload Endpoints
//
// POST   uploads                          -> { upload_id }
// PUT    uploads/{id}/chunks?offset={n}   -> { received }
// POST   uploads/{id}/complete            -> { url }
// DELETE uploads/{id}                     (best effort, on cancel)

use crate::gateway::{ProgressFn, TransferGateway};
use crate::http::{Result, UploadClient, UploadError};
use crate::types::{ChunkAck, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse, UploadPayload};
use async_trait::async_trait;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

impl UploadClient {
    /// Upload a payload in chunks, reporting cumulative acknowledged bytes.
    pub async fn upload(
        &self,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        if cancel.is_cancelled() {
            return Err(UploadError::Canceled);
        }

        let session = self.create_upload(payload, cancel).await?;
        tracing::debug!(
            upload_id = %session.upload_id,
            name = %payload.name,
            size = payload.size(),
            "upload session opened"
        );

        match self.send_chunks(&session.upload_id, payload, on_progress, cancel).await {
            Ok(location) => Ok(location),
            Err(err) => {
                if err.is_canceled() {
                    self.abort_upload(&session.upload_id).await;
                }
                Err(err)
            }
        }
    }

    /// POST uploads
    async fn create_upload(
        &self,
        payload: &UploadPayload,
        cancel: &CancellationToken,
    ) -> Result<CreateUploadResponse> {
        let body = CreateUploadRequest {
            name: payload.name.clone(),
            size: payload.size(),
            content_type: payload.content_type.clone(),
        };
        let builder = self.request(Method::POST, "uploads")?.json(&body);
        self.send_json(builder, cancel).await
    }

    async fn send_chunks(
        &self,
        upload_id: &str,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        let total = payload.bytes.len();
        let endpoint = format!("uploads/{upload_id}/chunks");
        let mut offset = 0;

        while offset < total {
            let end = (offset + self.chunk_size()).min(total);
            let chunk = payload.bytes.slice(offset..end);
            let builder = self
                .request(Method::PUT, &endpoint)?
                .query(&[("offset", offset)])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(chunk);

            let ack: ChunkAck = self.send_json(builder, cancel).await?;
            if ack.received != end as u64 {
                return Err(UploadError::InvalidResponse(format!(
                    "server acknowledged {} bytes, expected {end}",
                    ack.received
                )));
            }

            on_progress(ack.received);
            offset = end;
        }

        self.complete_upload(upload_id, cancel).await
    }

    /// POST uploads/{id}/complete
    async fn complete_upload(&self, upload_id: &str, cancel: &CancellationToken) -> Result<Url> {
        let endpoint = format!("uploads/{upload_id}/complete");
        let builder = self.request(Method::POST, &endpoint)?;
        let response: CompleteUploadResponse = self.send_json(builder, cancel).await?;
        self.resolve(&response.url)
    }

    /// DELETE uploads/{id}, ignoring failures
    async fn abort_upload(&self, upload_id: &str) {
        let endpoint = format!("uploads/{upload_id}");
        let builder = match self.request(Method::DELETE, &endpoint) {
            Ok(builder) => builder,
            Err(err) => {
                tracing::debug!(upload_id = %upload_id, error = %err, "abort request not built");
                return;
            }
        };

        match builder.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(upload_id = %upload_id, "upload session aborted");
            }
            Ok(response) => {
                tracing::debug!(
                    upload_id = %upload_id,
                    status = %response.status(),
                    "abort rejected by server"
                );
            }
            Err(err) => {
                tracing::debug!(upload_id = %upload_id, error = %err, "abort request failed");
            }
        }
    }
}

#[async_trait]
impl TransferGateway for UploadClient {
    async fn transfer(
        &self,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        self.upload(payload, on_progress, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{ClientConfig, UploadClient, UploadError};
    use crate::types::UploadPayload;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn small_chunks(server: &MockServer) -> UploadClient {
        let config = ClientConfig {
            chunk_size: 4,
            ..ClientConfig::default()
        };
        UploadClient::with_config(config, &server.uri()).expect("client init")
    }

    #[tokio::test]
    async fn test_upload_reports_each_chunk() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/uploads"))
            .and(body_json(serde_json::json!({ "name": "notes.txt", "size": 10 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "upload_id": "up-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        for (offset, received) in [("0", 4), ("4", 8), ("8", 10)] {
            Mock::given(method("PUT"))
                .and(path("/uploads/up-1/chunks"))
                .and(query_param("offset", offset))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "received": received
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        Mock::given(method("POST"))
            .and(path("/uploads/up-1/complete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "files/up-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = small_chunks(&server);
        let payload = UploadPayload::new("notes.txt", b"0123456789".to_vec());
        let seen = Mutex::new(Vec::new());
        let on_progress = |bytes: u64| seen.lock().expect("progress lock").push(bytes);

        let url = client
            .upload(&payload, &on_progress, &CancellationToken::new())
            .await
            .expect("upload failed");

        assert_eq!(url.as_str(), format!("{}/files/up-1", server.uri()));
        assert_eq!(*seen.lock().expect("progress lock"), vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn test_short_ack_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/uploads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "upload_id": "up-2"
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/uploads/up-2/chunks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "received": 1
            })))
            .mount(&server)
            .await;

        let client = small_chunks(&server);
        let payload = UploadPayload::new("a.bin", vec![0u8; 6]);
        let err = client
            .upload(&payload, &|_| {}, &CancellationToken::new())
            .await
            .expect_err("short ack must fail");

        assert!(matches!(err, UploadError::InvalidResponse(_)));
        assert!(!err.is_canceled());
    }
}
