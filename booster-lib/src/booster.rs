//! Scan-then-rewrite flow for one asset.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use log::debug;

use crate::config::BoosterConfig;
use crate::error::BoostError;
use crate::scanner::{PeakScan, PeakScanner, ScaleFactor};
use crate::transcoder::{Dispatch, StreamingTranscoder, TranscodeHandle, TranscodeSummary};

/// Paths and overrides for one boost.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostRequest {
    /// Asset whose peak determines the scale. Defaults to `input_path`.
    pub scan_path: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Skip the scan and apply this scale.
    pub scale: Option<ScaleFactor>,
}

impl BoostRequest {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let input_path = input.as_ref().to_path_buf();
        Self {
            scan_path: input_path.clone(),
            input_path,
            output_path: output.as_ref().to_path_buf(),
            scale: None,
        }
    }

    /// Measure the peak on `path` instead of the input.
    pub fn scan_from(mut self, path: impl AsRef<Path>) -> Self {
        self.scan_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_scale(mut self, scale: ScaleFactor) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// Outcome of a successful boost.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostReport {
    /// The scan that produced the scale, absent when the scale was given.
    pub scan: Option<PeakScan>,
    pub transcode: TranscodeSummary,
}

pub type BoostResult = Result<BoostReport, BoostError>;

/// Peak scanner and transcoder sharing one configuration.
#[derive(Debug, Clone)]
pub struct Booster {
    scanner: PeakScanner,
    transcoder: StreamingTranscoder,
}

impl Booster {
    pub fn new(config: BoosterConfig) -> Self {
        Self {
            scanner: PeakScanner::from_config(&config),
            transcoder: StreamingTranscoder::new(config),
        }
    }

    pub fn with_dispatch(config: BoosterConfig, dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            scanner: PeakScanner::from_config(&config),
            transcoder: StreamingTranscoder::with_dispatch(config, dispatch),
        }
    }

    pub fn scanner(&self) -> &PeakScanner {
        &self.scanner
    }

    pub fn transcoder(&self) -> &StreamingTranscoder {
        &self.transcoder
    }

    /// Scan `request.scan_path` on the calling thread, then start rewriting
    /// the input with the derived scale.
    ///
    /// `on_complete` runs exactly once. A failed scan is reported through it
    /// and no output is written.
    pub fn process_asset<F>(&self, request: BoostRequest, on_complete: F) -> TranscodeHandle
    where
        F: FnOnce(BoostResult) + Send + 'static,
    {
        let (scan, scale) = match request.scale {
            Some(scale) => (None, scale),
            None => match self.scanner.scan(&request.scan_path) {
                Ok(scan) => (Some(scan), scan.scale),
                Err(err) => {
                    return self.transcoder.reject(
                        &request.input_path,
                        &request.output_path,
                        err,
                        move |result| {
                            on_complete(result.map(|transcode| BoostReport {
                                scan: None,
                                transcode,
                            }))
                        },
                    );
                }
            },
        };
        debug!(
            "boosting {} with scale {:.4}",
            request.input_path.display(),
            scale.value()
        );

        self.transcoder.transcode(
            &request.input_path,
            &request.output_path,
            scale.value(),
            move |result| on_complete(result.map(|transcode| BoostReport { scan, transcode })),
        )
    }

    /// [`Booster::process_asset`] that waits for the result.
    pub fn process_asset_blocking(&self, request: BoostRequest) -> BoostResult {
        let (sender, receiver) = mpsc::channel();
        let worker = Booster {
            scanner: self.scanner.clone(),
            transcoder: self.transcoder.on_worker(),
        };
        let handle = worker.process_asset(request, move |result| {
            let _ = sender.send(result);
        });
        handle.join();
        receiver.recv().unwrap_or_else(|_| {
            Err(BoostError::FinalizeFailed(
                "boost finished without reporting".to_string(),
            ))
        })
    }
}

impl Default for Booster {
    fn default() -> Self {
        Self::new(BoosterConfig::default())
    }
}
