/*
[INPUT]:  Raw payload bytes and opaque size/quality bounds
[OUTPUT]: Transformed payload bytes ready for transfer
[POS]:    Pre-processing layer - local transform before upload
[UPDATE]: When adding codecs or changing the pre-processing contract
*/

pub mod zlib;

use bytes::Bytes;
use thiserror::Error;

pub use zlib::ZlibCompressor;

/// Bounds handed to every pre-processor unchanged.
///
/// Codecs interpret the fields they understand and ignore the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Output quality in `(0.0, 1.0]`
    pub quality: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_width: 1000,
            max_height: 1000,
            quality: 0.8,
        }
    }
}

/// Error raised by a pre-processor
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// The codec failed while encoding
    #[error("encoding failed: {0}")]
    Encode(#[from] std::io::Error),

    /// Options outside the range the codec accepts
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The blocking worker running the codec died
    #[error("pre-processing worker failed: {0}")]
    Worker(String),
}

/// Pure, deterministic transform from input bytes to output bytes.
///
/// Called on a blocking thread; implementations may be CPU heavy.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, input: Bytes, options: &PreprocessOptions) -> Result<Bytes, PreprocessError>;
}

/// Hands the payload through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Preprocessor for Passthrough {
    fn name(&self) -> &'static str {
        "none"
    }

    fn process(&self, input: Bytes, _options: &PreprocessOptions) -> Result<Bytes, PreprocessError> {
        Ok(input)
    }
}
