//! # Booster Audio Library
//!
//! This library measures the peak of an audio asset and rewrites it with a constant gain so the
//! loudest sample reaches full scale. It includes the peak scanner, the saturating sample
//! processor, a readiness-driven streaming transcoder and waveform bucketing for display.

pub mod audio;
pub mod booster;
pub mod config;
pub mod error;
pub mod processor;
pub mod scanner;
#[cfg(test)]
mod test_support;
mod tools;
pub mod transcoder;
pub mod waveform;

pub use booster::{BoostReport, BoostRequest, BoostResult, Booster};
pub use config::BoosterConfig;
pub use error::BoostError;
pub use scanner::{PeakScan, PeakScanner, ScaleFactor};
pub use transcoder::{StreamingTranscoder, TranscodeHandle, TranscodeResult, TranscodeSummary};
