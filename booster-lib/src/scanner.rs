//! Full-length peak measurement and scale-factor derivation.
//!
//! The scan visits every decoded sample: a single transient anywhere in the
//! clip bounds the boost, so sampling a subset would let the rewrite clip.

use std::path::Path;

use log::{debug, info};

use crate::audio::reader::{AssetReader, ReaderStatus};
use crate::config::{BoostPolicy, BoosterConfig, ReaderSettings};
use crate::error::BoostError;

/// Magnitude of a full-scale 16-bit sample.
pub const FULL_SCALE: f32 = i16::MAX as f32;

/// Positive gain applied to every sample of a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f32);

impl ScaleFactor {
    /// No boost.
    pub const UNITY: ScaleFactor = ScaleFactor(1.0);

    /// Accept an explicit scale; it must be finite and positive.
    pub fn new(value: f32) -> Result<Self, BoostError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(BoostError::InvalidConfig(format!(
                "scale must be a positive number, got {}",
                value
            )))
        }
    }

    /// Derive `1 / peak`, with silence mapping to unity and `policy` capping the result.
    pub fn from_peak(peak: f32, policy: &BoostPolicy) -> Self {
        let raw = if peak > 0.0 && peak.is_finite() {
            1.0 / peak
        } else {
            1.0
        };
        let capped = match policy.max_scale {
            Some(max_scale) if max_scale > 0.0 && raw > max_scale => {
                debug!("scale {:.3} capped at {:.3}", raw, max_scale);
                max_scale
            }
            _ => raw,
        };
        Self(capped)
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Result of a peak scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakScan {
    /// Loudest sample magnitude, normalized to `[0, 1]`.
    pub peak: f32,
    pub scale: ScaleFactor,
    /// Loudest raw sample magnitude.
    pub max_sample: u16,
    /// Frames decoded during the scan.
    pub frames: u64,
    pub sample_rate: u32,
}

impl PeakScan {
    /// Safe "no boost" result for callers that continue past a failed scan.
    pub fn inert() -> Self {
        Self {
            peak: 1.0,
            scale: ScaleFactor::UNITY,
            max_sample: i16::MAX as u16,
            frames: 0,
            sample_rate: 0,
        }
    }
}

/// Largest absolute sample in `samples`, saturating `i16::MIN` to `i16::MAX`.
pub fn max_abs_sample(samples: &[i16]) -> u16 {
    samples
        .iter()
        .map(|sample| sample.unsigned_abs().min(i16::MAX as u16))
        .max()
        .unwrap_or(0)
}

/// Decodes an asset end to end and measures its peak.
#[derive(Debug, Clone, Default)]
pub struct PeakScanner {
    reader: ReaderSettings,
    policy: BoostPolicy,
}

impl PeakScanner {
    pub fn new(reader: ReaderSettings, policy: BoostPolicy) -> Self {
        Self { reader, policy }
    }

    pub fn from_config(config: &BoosterConfig) -> Self {
        Self::new(config.reader.clone(), config.policy.clone())
    }

    /// Scan every sample of the first audio track of `path`.
    ///
    /// Blocks until the whole asset has been decoded; run it off any
    /// latency-sensitive thread.
    ///
    /// # Errors
    /// `NoAudioTrack` / `ReaderConstructionFailed` if the asset cannot be
    /// opened for decoding, `DecodeFailed` if decoding stops before the end.
    pub fn scan(&self, path: impl AsRef<Path>) -> Result<PeakScan, BoostError> {
        let path = path.as_ref();
        let mut reader = AssetReader::open(path, &self.reader)?;
        let sample_rate = reader.asset().sample_rate();

        let mut max_sample = 0_u16;
        while reader.status() == ReaderStatus::Reading {
            if let Some(buffer) = reader.copy_next_sample_buffer() {
                max_sample = max_sample.max(max_abs_sample(buffer.samples()));
            }
        }

        match reader.status() {
            ReaderStatus::Completed => {}
            ReaderStatus::Failed => {
                return Err(reader.take_error().unwrap_or_else(|| {
                    BoostError::DecodeFailed("reader failed without an error".to_string())
                }));
            }
            ReaderStatus::Cancelled | ReaderStatus::Reading => {
                return Err(BoostError::DecodeFailed(
                    "scan ended before the asset completed".to_string(),
                ));
            }
        }

        let peak = max_sample as f32 / FULL_SCALE;
        let scale = ScaleFactor::from_peak(peak, &self.policy);
        let frames = reader.frames_read();

        info!(
            "scanned {}: frames={} peak={:.4} scale={:.4}",
            path.display(),
            frames,
            peak,
            scale.value()
        );

        Ok(PeakScan {
            peak,
            scale,
            max_sample,
            frames,
            sample_rate,
        })
    }
}
