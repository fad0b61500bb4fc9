/*
[INPUT]:  Local file contents handed over by callers
[OUTPUT]: Payload values shared by the pre-processor and the transfer gateway
[POS]:    Data layer - in-process payload model
[UPDATE]: When payload metadata changes
*/

use bytes::Bytes;

/// One file to transfer: its name, optional MIME type and contents.
///
/// `Bytes` keeps clones cheap, so the same payload can be handed to a blocking
/// pre-processing thread and later to the gateway without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadPayload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Byte size of the payload
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Same name and content type, different contents
    pub fn with_bytes(&self, bytes: Bytes) -> Self {
        Self {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            bytes,
        }
    }
}
