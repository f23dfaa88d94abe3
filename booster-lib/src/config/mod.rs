//! Immutable per-job configuration for reading, writing and boosting.
//!
//! A [`BoosterConfig`] is built once (defaults, JSON file, CLI overrides) and
//! handed by reference to the scanner and by value to each transcode job.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BoostError;

pub mod level;

const DEFAULT_QUEUE_DEPTH: usize = 2;
const DEFAULT_BIT_RATE: u32 = 128_000;
const DEFAULT_CHANNELS: u16 = 1;

/// Decode-side settings. Output is always interleaved 16-bit signed PCM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Average all source channels into one.
    pub downmix_to_mono: bool,
    /// Log and skip packets that fail to decode instead of failing the read.
    pub skip_corrupt_packets: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            downmix_to_mono: true,
            skip_corrupt_packets: false,
        }
    }
}

/// Container and codec of the boosted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 16-bit linear PCM in a RIFF/WAVE container.
    Wav,
    /// AAC-LC in an MPEG-4 audio container.
    M4a,
}

impl OutputFormat {
    /// Infer the format from an output path's extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("m4a") | Some("mp4") | Some("aac") => Self::M4a,
            _ => Self::Wav,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "m4a" | "aac" | "mp4" => Some(Self::M4a),
            _ => None,
        }
    }
}

/// Encode-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    /// Explicit output format. `None` infers it from the output extension.
    pub format: Option<OutputFormat>,
    /// Required output sample rate. `None` follows the source.
    pub sample_rate: Option<u32>,
    pub channels: u16,
    /// Target bit rate for compressed output, in bits per second.
    pub bit_rate: u32,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            format: None,
            sample_rate: None,
            channels: DEFAULT_CHANNELS,
            bit_rate: DEFAULT_BIT_RATE,
        }
    }
}

impl WriterSettings {
    /// Resolve the output format for `path`.
    pub fn format_for(&self, path: &Path) -> OutputFormat {
        self.format.unwrap_or_else(|| OutputFormat::from_path(path))
    }
}

/// Limits applied when turning a measured peak into a scale factor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostPolicy {
    /// Upper bound for the scale factor, linear or `"26db"`. `None` means no cap.
    #[serde(deserialize_with = "level::deserialize_optional_linear_gain")]
    pub max_scale: Option<f32>,
}

/// Full configuration for one scan + transcode run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterConfig {
    pub reader: ReaderSettings,
    pub writer: WriterSettings,
    pub policy: BoostPolicy,
    /// Maximum number of buffers queued between the reader and the encoder.
    pub queue_depth: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            reader: ReaderSettings::default(),
            writer: WriterSettings::default(),
            policy: BoostPolicy::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl BoosterConfig {
    /// Parse and validate a JSON configuration payload.
    pub fn from_json_str(json: &str) -> Result<Self, BoostError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BoostError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, BoostError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), BoostError> {
        if self.queue_depth == 0 {
            return Err(BoostError::InvalidConfig(
                "queue_depth must be greater than zero".to_string(),
            ));
        }
        if !(1..=2).contains(&self.writer.channels) {
            return Err(BoostError::InvalidConfig(format!(
                "writer channels must be 1 or 2, got {}",
                self.writer.channels
            )));
        }
        if self.writer.bit_rate == 0 {
            return Err(BoostError::InvalidConfig(
                "writer bit_rate must be greater than zero".to_string(),
            ));
        }
        if self.writer.sample_rate == Some(0) {
            return Err(BoostError::InvalidConfig(
                "writer sample_rate must be greater than zero".to_string(),
            ));
        }
        if let Some(max_scale) = self.policy.max_scale {
            if !max_scale.is_finite() || max_scale <= 0.0 {
                return Err(BoostError::InvalidConfig(format!(
                    "max_scale must be a positive number, got {}",
                    max_scale
                )));
            }
        }
        Ok(())
    }
}
