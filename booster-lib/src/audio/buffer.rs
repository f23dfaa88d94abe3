//! Owned, timestamped blocks of 16-bit PCM passed from reader to writer.

use crate::error::BoostError;

/// Sample layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Timing carried unchanged from decode to encode.
///
/// `pts` and `duration` count frames from the start of the track; `dts` is the
/// source packet timestamp in the track's own time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTiming {
    pub pts: u64,
    pub dts: u64,
    pub duration: u64,
}

/// Interleaved 16-bit signed PCM with its timing and format.
///
/// The sample vector length is fixed at construction: processing stages get a
/// mutable slice, never the vector, so the frame count cannot drift.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
    timing: BufferTiming,
    format: BufferFormat,
}

impl SampleBuffer {
    /// Build a buffer, checking that `samples` holds exactly `timing.duration` frames.
    pub fn new(
        samples: Vec<i16>,
        timing: BufferTiming,
        format: BufferFormat,
    ) -> Result<Self, BoostError> {
        if format.channels == 0 {
            return Err(BoostError::FormatMismatch(
                "buffer must have at least one channel".to_string(),
            ));
        }
        let expected = timing.duration as usize * format.channels as usize;
        if samples.len() != expected {
            return Err(BoostError::FormatMismatch(format!(
                "buffer at frame {} holds {} samples, expected {}",
                timing.pts,
                samples.len(),
                expected
            )));
        }
        Ok(Self {
            samples,
            timing,
            format,
        })
    }

    /// Swap in new sample content, keeping timing and format.
    ///
    /// Fails if the replacement would change the sample count.
    pub fn replace_samples(self, samples: Vec<i16>) -> Result<Self, BoostError> {
        if samples.len() != self.samples.len() {
            return Err(BoostError::FormatMismatch(format!(
                "replacement for buffer at frame {} holds {} samples, expected {}",
                self.timing.pts,
                samples.len(),
                self.samples.len()
            )));
        }
        Ok(Self { samples, ..self })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn timing(&self) -> BufferTiming {
        self.timing
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.timing.duration
    }

    /// Length of the sample data in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.timing.duration as f64 / self.format.sample_rate.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono() -> BufferFormat {
        BufferFormat {
            sample_rate: 8_000,
            channels: 1,
        }
    }

    fn timing(duration: u64) -> BufferTiming {
        BufferTiming {
            pts: 16,
            dts: 16,
            duration,
        }
    }

    #[test]
    fn rejects_sample_count_that_disagrees_with_duration() {
        let err = SampleBuffer::new(vec![0; 3], timing(4), mono()).unwrap_err();
        assert_eq!(err.kind(), "format_mismatch");
    }

    #[test]
    fn replacement_keeps_timing_and_format() {
        let buffer = SampleBuffer::new(vec![1, 2, 3, 4], timing(4), mono()).expect("buffer");
        let replaced = buffer.replace_samples(vec![2, 4, 6, 8]).expect("replace");
        assert_eq!(replaced.samples(), &[2, 4, 6, 8]);
        assert_eq!(replaced.timing(), timing(4));
        assert_eq!(replaced.format(), mono());
        assert_eq!(replaced.byte_len(), 8);
        assert!((replaced.duration_seconds() - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn replacement_must_not_change_length() {
        let buffer = SampleBuffer::new(vec![1, 2], timing(2), mono()).expect("buffer");
        let err = buffer.replace_samples(vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), "format_mismatch");
    }
}
