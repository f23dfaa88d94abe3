//! 16-bit linear PCM WAV output.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::audio::buffer::{BufferFormat, SampleBuffer};
use crate::error::BoostError;

use super::SampleEncoder;

/// Writes buffers sample for sample into a RIFF/WAVE file.
pub struct WavEncoder {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavEncoder {
    pub fn create(path: &Path, format: BufferFormat) -> Result<Self, BoostError> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|err| BoostError::WriterConstructionFailed(err.to_string()))?;
        Ok(Self { writer })
    }
}

impl SampleEncoder for WavEncoder {
    fn encode(&mut self, buffer: &SampleBuffer) -> Result<(), BoostError> {
        let mut samples = self.writer.get_i16_writer(buffer.sample_count() as u32);
        for &sample in buffer.samples() {
            samples.write_sample(sample);
        }
        samples
            .flush()
            .map_err(|err| BoostError::EncodeAppendFailed(err.to_string()))
    }

    fn finish(self: Box<Self>, _session_end: Option<u64>) -> Result<(), BoostError> {
        self.writer
            .finalize()
            .map_err(|err| BoostError::FinalizeFailed(err.to_string()))
    }
}
