//! Pull-based decoder that yields 16-bit PCM [`SampleBuffer`]s.

use std::ops::Range;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer as PcmScratch;
use symphonia::core::codecs::Decoder;
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatReader;

use crate::config::ReaderSettings;
use crate::error::BoostError;
use crate::tools::tools::make_decoder;

use super::asset::AudioAsset;
use super::buffer::{BufferFormat, BufferTiming, SampleBuffer};
use super::samples::downmix_to_mono;

/// Lifecycle of an [`AssetReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    Reading,
    Completed,
    Failed,
    Cancelled,
}

/// Decoded frames still to drop and to hand out.
#[derive(Debug, Clone, Copy, Default)]
struct Presentation {
    skip: u64,
    remaining: Option<u64>,
}

impl Presentation {
    /// Frames of a `frames`-long decoded buffer that are presented.
    fn clip(&mut self, frames: u64) -> Range<u64> {
        let start = self.skip.min(frames);
        self.skip -= start;
        let mut end = frames;
        if let Some(remaining) = self.remaining.as_mut() {
            end = start + (frames - start).min(*remaining);
            *remaining -= end - start;
        }
        start..end
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Decodes the first audio track of an asset, one packet per buffer.
///
/// Frames outside the container's edit list, such as encoder priming and
/// padding, are dropped.
pub struct AssetReader {
    asset: AudioAsset,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    settings: ReaderSettings,
    status: ReaderStatus,
    error: Option<BoostError>,
    position: u64,
    presentation: Presentation,
}

impl AssetReader {
    /// Open `path` and prepare to decode its first audio track.
    pub fn open(path: impl AsRef<Path>, settings: &ReaderSettings) -> Result<Self, BoostError> {
        let (asset, format) = AudioAsset::open(path.as_ref())?;
        let track = format
            .tracks()
            .iter()
            .find(|track| track.id == asset.track_id())
            .ok_or(BoostError::NoAudioTrack)?;
        let decoder = make_decoder(track)?;
        let presentation = asset
            .edit_window()
            .map(|edit| Presentation {
                skip: edit.skip,
                remaining: Some(edit.frames),
            })
            .unwrap_or_default();

        debug!(
            "reader opened: path={} track={} rate={} channels={}",
            asset.path().display(),
            asset.track_id(),
            asset.sample_rate(),
            asset.channels()
        );

        Ok(Self {
            asset,
            format,
            decoder,
            settings: settings.clone(),
            status: ReaderStatus::Reading,
            error: None,
            position: 0,
            presentation,
        })
    }

    pub fn asset(&self) -> &AudioAsset {
        &self.asset
    }

    pub fn status(&self) -> ReaderStatus {
        self.status
    }

    /// The failure that moved the reader into [`ReaderStatus::Failed`].
    pub fn error(&self) -> Option<&BoostError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<BoostError> {
        self.error.take()
    }

    /// Frames handed out so far.
    pub fn frames_read(&self) -> u64 {
        self.position
    }

    /// Layout of the buffers this reader produces.
    pub fn output_format(&self) -> BufferFormat {
        BufferFormat {
            sample_rate: self.asset.sample_rate(),
            channels: self.output_channels(self.asset.channels() as usize) as u16,
        }
    }

    /// Stop reading; later pulls return `None`.
    pub fn cancel_reading(&mut self) {
        if self.status == ReaderStatus::Reading {
            self.status = ReaderStatus::Cancelled;
        }
    }

    /// Decode and return the next buffer.
    ///
    /// Returns `None` once the reader is no longer [`ReaderStatus::Reading`];
    /// check [`AssetReader::status`] to tell completion from failure.
    pub fn copy_next_sample_buffer(&mut self) -> Option<SampleBuffer> {
        while self.status == ReaderStatus::Reading {
            if self.presentation.is_exhausted() {
                self.status = ReaderStatus::Completed;
                debug!("reader completed after {} frames", self.position);
                return None;
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.status = ReaderStatus::Completed;
                    debug!("reader completed after {} frames", self.position);
                    return None;
                }
                Err(Error::ResetRequired) => {
                    self.fail(BoostError::DecodeFailed(
                        "decoder reset required mid-stream".to_string(),
                    ));
                    return None;
                }
                Err(err) => {
                    self.fail(BoostError::DecodeFailed(err.to_string()));
                    return None;
                }
            };

            if packet.track_id() != self.asset.track_id() {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(err)) if self.settings.skip_corrupt_packets => {
                    warn!("decode error at ts {}: {}", packet.ts(), err);
                    continue;
                }
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.status = ReaderStatus::Completed;
                    return None;
                }
                Err(err) => {
                    self.fail(BoostError::DecodeFailed(err.to_string()));
                    return None;
                }
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let source_channels = spec.channels.count().max(1);
            let mut scratch = PcmScratch::<i16>::new(decoded.capacity() as u64, spec);
            scratch.copy_interleaved_ref(decoded);

            let presented = self.presentation.clip(frames as u64);
            if presented.is_empty() {
                continue;
            }
            let first = presented.start as usize * source_channels;
            let last = presented.end as usize * source_channels;
            let decoded = &scratch.samples()[first..last];

            let output_channels = self.output_channels(source_channels);
            let samples = if output_channels == source_channels {
                decoded.to_vec()
            } else {
                downmix_to_mono(decoded, source_channels)
            };

            let frames = presented.end - presented.start;
            let timing = BufferTiming {
                pts: self.position,
                dts: packet.ts() + presented.start,
                duration: frames,
            };
            let format = BufferFormat {
                sample_rate: spec.rate,
                channels: output_channels as u16,
            };

            match SampleBuffer::new(samples, timing, format) {
                Ok(buffer) => {
                    self.position += frames;
                    return Some(buffer);
                }
                Err(err) => {
                    self.fail(err);
                    return None;
                }
            }
        }

        None
    }

    fn output_channels(&self, source_channels: usize) -> usize {
        if self.settings.downmix_to_mono {
            1
        } else {
            source_channels
        }
    }

    fn fail(&mut self, err: BoostError) {
        warn!("reader failed: {}", err);
        self.status = ReaderStatus::Failed;
        self.error = Some(err);
    }
}

impl std::fmt::Debug for AssetReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetReader")
            .field("asset", &self.asset)
            .field("status", &self.status)
            .field("position", &self.position)
            .finish()
    }
}
