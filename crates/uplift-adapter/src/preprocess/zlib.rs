/*
[INPUT]:  Raw payload bytes and a quality factor
[OUTPUT]: Zlib-compressed payload bytes
[POS]:    Pre-processing layer - zlib codec
[UPDATE]: When changing the quality to compression level mapping
*/

use std::io::Write;

use bytes::Bytes;
use flate2::{Compression, write::ZlibEncoder};

use super::{PreprocessError, PreprocessOptions, Preprocessor};

/// Compresses payloads with zlib.
///
/// `quality` selects the compression level: higher quality spends more CPU
/// for a smaller output. Dimension bounds do not apply to byte streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCompressor;

impl ZlibCompressor {
    /// Maps a quality in `(0.0, 1.0]` onto zlib levels `1..=9`.
    pub fn level_for_quality(quality: f32) -> Result<Compression, PreprocessError> {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(PreprocessError::InvalidOptions(format!(
                "quality {quality} is outside (0, 1]"
            )));
        }
        let level = (quality * 9.0).round().clamp(1.0, 9.0) as u32;
        Ok(Compression::new(level))
    }
}

impl Preprocessor for ZlibCompressor {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn process(&self, input: Bytes, options: &PreprocessOptions) -> Result<Bytes, PreprocessError> {
        let level = Self::level_for_quality(options.quality)?;
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(input.len() / 2), level);
        encoder.write_all(&input)?;
        Ok(Bytes::from(encoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn options(quality: f32) -> PreprocessOptions {
        PreprocessOptions {
            quality,
            ..PreprocessOptions::default()
        }
    }

    #[test]
    fn compressible_input_shrinks_and_decodes() {
        let input = Bytes::from(vec![b'a'; 64 * 1024]);
        let output = ZlibCompressor
            .process(input.clone(), &options(0.8))
            .expect("compress");
        assert!(output.len() < input.len());

        let mut decoded = Vec::new();
        ZlibDecoder::new(&output[..])
            .read_to_end(&mut decoded)
            .expect("decode");
        assert_eq!(decoded, input);
    }

    #[test]
    fn output_size_is_deterministic() {
        let input = Bytes::from((0..10_000u32).flat_map(|n| n.to_le_bytes()).collect::<Vec<_>>());
        let first = ZlibCompressor.process(input.clone(), &options(0.5)).expect("first");
        let second = ZlibCompressor.process(input, &options(0.5)).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn quality_maps_to_level() {
        assert_eq!(ZlibCompressor::level_for_quality(1.0).expect("max").level(), 9);
        assert_eq!(ZlibCompressor::level_for_quality(0.8).expect("default").level(), 7);
        assert_eq!(ZlibCompressor::level_for_quality(0.01).expect("min").level(), 1);
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        for quality in [0.0, -0.5, 1.5, f32::NAN] {
            let err = ZlibCompressor
                .process(Bytes::from_static(b"x"), &options(quality))
                .expect_err("invalid quality");
            assert!(matches!(err, PreprocessError::InvalidOptions(_)));
        }
    }
}
