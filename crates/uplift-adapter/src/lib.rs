/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public uplift adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod gateway;
pub mod http;
pub mod preprocess;
pub mod types;

pub use gateway::{ProgressFn, TransferGateway};

// Re-export commonly used types from http
pub use http::{ClientConfig, Result, UploadClient, UploadError};

// Re-export commonly used types from preprocess
pub use preprocess::{
    Passthrough,
    PreprocessError,
    PreprocessOptions,
    Preprocessor,
    ZlibCompressor,
};

// Re-export all types
pub use types::*;
