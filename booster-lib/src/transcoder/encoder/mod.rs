//! Output encoders driven by the asset writer's encoder thread.

use std::path::Path;

use crate::audio::buffer::{BufferFormat, SampleBuffer};
use crate::config::{OutputFormat, WriterSettings};
use crate::error::BoostError;

#[cfg(feature = "m4a")]
mod m4a;
mod wav;

pub use wav::WavEncoder;

#[cfg(feature = "m4a")]
pub use m4a::M4aEncoder;

/// Sink for processed buffers.
///
/// Encoders are created, used and finished on a single thread, so they need
/// not be `Send`.
pub trait SampleEncoder {
    /// Encode one buffer. Errors are reported as `EncodeAppendFailed`.
    fn encode(&mut self, buffer: &SampleBuffer) -> Result<(), BoostError>;

    /// Flush and close the output. Errors are reported as `FinalizeFailed`.
    ///
    /// `session_end` is the end of the source timeline in frames, when the
    /// writer was told about it.
    fn finish(self: Box<Self>, session_end: Option<u64>) -> Result<(), BoostError>;
}

/// Opens the encoder for each output an [`AssetWriter`](super::AssetWriter)
/// writes. Called on the writer's encoder thread.
pub trait EncoderFactory: Send + Sync {
    fn open(
        &self,
        path: &Path,
        format: OutputFormat,
        settings: &WriterSettings,
        input: BufferFormat,
    ) -> Result<Box<dyn SampleEncoder>, BoostError>;
}

/// The encoders built into this crate, picked by [`OutputFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEncoders;

impl EncoderFactory for DefaultEncoders {
    fn open(
        &self,
        path: &Path,
        format: OutputFormat,
        settings: &WriterSettings,
        input: BufferFormat,
    ) -> Result<Box<dyn SampleEncoder>, BoostError> {
        open_encoder(path, format, settings, input)
    }
}

/// Open an encoder for `format` at `path`.
fn open_encoder(
    path: &Path,
    format: OutputFormat,
    settings: &WriterSettings,
    input: BufferFormat,
) -> Result<Box<dyn SampleEncoder>, BoostError> {
    match format {
        OutputFormat::Wav => Ok(Box::new(WavEncoder::create(path, input)?)),
        #[cfg(feature = "m4a")]
        OutputFormat::M4a => Ok(Box::new(M4aEncoder::create(path, input, settings.bit_rate)?)),
        #[cfg(not(feature = "m4a"))]
        OutputFormat::M4a => {
            let _ = settings;
            Err(BoostError::WriterConstructionFailed(
                "m4a output requires the `m4a` feature".to_string(),
            ))
        }
    }
}
