//! Peak bucketing of PCM data for waveform display.

use std::path::Path;

use log::debug;

use crate::audio::reader::{AssetReader, ReaderStatus};
use crate::audio::samples::samples_from_le_bytes;
use crate::config::ReaderSettings;
use crate::error::BoostError;

/// Reduce little-endian 16-bit PCM `bytes` to `width` peak bins.
///
/// Bins hold the largest absolute sample of their window, scaled so the
/// loudest bin reaches `height / 2`. Returns no bins when there are fewer
/// samples than `width`.
pub fn bucket(bytes: &[u8], width: usize, height: f32) -> Vec<f32> {
    bucket_samples(&samples_from_le_bytes(bytes), width, height)
}

/// [`bucket`] over already decoded samples.
///
/// Each bin covers `samples.len() / width` samples; the last bin also takes
/// the remainder so every sample is represented.
pub fn bucket_samples(samples: &[i16], width: usize, height: f32) -> Vec<f32> {
    if width == 0 {
        return Vec::new();
    }
    let bin_size = samples.len() / width;
    if bin_size == 0 {
        return Vec::new();
    }

    let peaks: Vec<u16> = (0..width)
        .map(|bin| {
            let start = bin * bin_size;
            let end = if bin + 1 == width {
                samples.len()
            } else {
                start + bin_size
            };
            samples[start..end]
                .iter()
                .map(|sample| sample.unsigned_abs())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let global_max = peaks.iter().copied().max().unwrap_or(0);
    if global_max == 0 {
        return vec![0.0; peaks.len()];
    }

    let factor = (height / 2.0) / global_max as f32;
    peaks.into_iter().map(|peak| peak as f32 * factor).collect()
}

/// Decode `path` to mono PCM and bucket it.
pub fn load_waveform(
    path: impl AsRef<Path>,
    width: usize,
    height: f32,
) -> Result<Vec<f32>, BoostError> {
    let path = path.as_ref();
    let mut reader = AssetReader::open(path, &ReaderSettings::default())?;
    let mut samples = Vec::new();
    while let Some(buffer) = reader.copy_next_sample_buffer() {
        samples.extend(buffer.into_samples());
    }
    if reader.status() != ReaderStatus::Completed {
        return Err(reader.take_error().unwrap_or_else(|| {
            BoostError::DecodeFailed("waveform decode stopped early".to_string())
        }));
    }

    debug!(
        "waveform for {}: samples={} width={}",
        path.display(),
        samples.len(),
        width
    );
    Ok(bucket_samples(&samples, width, height))
}
