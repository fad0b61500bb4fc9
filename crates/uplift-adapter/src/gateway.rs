/*
[INPUT]:  Payload, progress callback, cancellation token
[OUTPUT]: Remote location of the stored payload or a classified UploadError
[POS]:    Transfer seam - contract between the task lifecycle and any transport
[UPDATE]: When the transfer contract changes
*/

use crate::http::Result;
use crate::types::UploadPayload;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Callback invoked with the cumulative number of bytes acknowledged so far.
pub type ProgressFn<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Sends a payload to remote storage.
///
/// Implementations must observe `cancel` for the whole operation and fail with
/// [`UploadError::Canceled`](crate::UploadError::Canceled) once it fires. A
/// token that is already signaled on entry must fail immediately without
/// transferring anything.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn transfer(
        &self,
        payload: &UploadPayload,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Url>;
}
