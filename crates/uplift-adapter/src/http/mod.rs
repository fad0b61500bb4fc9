/*
[INPUT]:  HTTP client configuration and upload endpoints
[OUTPUT]: HTTP responses and typed upload results
[POS]:    HTTP layer - chunked upload API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod upload;

pub use error::{Result, UploadError};

pub use client::{ClientConfig, DEFAULT_CHUNK_SIZE, UploadClient};
