//! Metadata for a decodable audio container on disk.

use std::path::{Path, PathBuf};

use symphonia::core::formats::FormatReader;

use crate::error::BoostError;
use crate::tools::movie::{edit_window, EditWindow};
use crate::tools::tools::{codec_name, first_audio_track, open_format};

/// Immutable handle describing the first audio track of a container.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    path: PathBuf,
    track_id: u32,
    track_count: usize,
    codec: &'static str,
    sample_rate: u32,
    channels: u16,
    n_frames: Option<u64>,
    edit: Option<EditWindow>,
}

impl AudioAsset {
    /// Open `path` and describe its first audio track.
    pub fn inspect(path: impl AsRef<Path>) -> Result<Self, BoostError> {
        Self::open(path.as_ref()).map(|(asset, _)| asset)
    }

    /// Open `path`, returning the asset together with its format reader.
    pub(crate) fn open(path: &Path) -> Result<(Self, Box<dyn FormatReader>), BoostError> {
        let opened = open_format(path)?;
        let format = opened.format;

        let track = first_audio_track(format.as_ref()).ok_or(BoostError::NoAudioTrack)?;
        let params = &track.codec_params;
        let channels = params
            .channels
            .map(|channels| channels.count() as u16)
            .unwrap_or(1)
            .max(1);
        let edit = edit_window(path, track.id as usize);

        let asset = Self {
            path: path.to_path_buf(),
            track_id: track.id,
            track_count: format.tracks().len(),
            codec: codec_name(params.codec),
            sample_rate: params.sample_rate.ok_or(BoostError::NoAudioTrack)?,
            channels,
            n_frames: edit.map(|edit| edit.frames).or(params.n_frames),
            edit,
        };

        Ok((asset, format))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    /// Short name of the track's codec, such as `pcm_s16le` or `aac`.
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source track, before any downmix.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total frames the container presents, if known.
    ///
    /// An MPEG-4 edit list takes precedence over the media duration.
    pub fn duration_frames(&self) -> Option<u64> {
        self.n_frames
    }

    /// Total duration in seconds, if the container declares it.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.n_frames
            .map(|frames| frames as f64 / self.sample_rate as f64)
    }

    /// Decoded frames to drop and keep, from the container's edit list.
    pub(crate) fn edit_window(&self) -> Option<EditWindow> {
        self.edit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_path, trackless_movie, write_wav};

    #[test]
    fn describes_a_wav_track() {
        let path = temp_path("asset-wav", "wav");
        write_wav(&path, 22_050, 2, &vec![0_i16; 2 * 2_205]);

        let asset = AudioAsset::inspect(&path).expect("asset");
        assert_eq!(asset.codec(), "pcm_s16le");
        assert_eq!(asset.track_count(), 1);
        assert_eq!(asset.sample_rate(), 22_050);
        assert_eq!(asset.channels(), 2);
        assert_eq!(asset.duration_frames(), Some(2_205));
        assert!(asset.edit_window().is_none());
        let seconds = asset.duration_seconds().expect("duration");
        assert!((seconds - 0.1).abs() < 1e-9);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn container_without_tracks_has_no_audio() {
        let path = temp_path("asset-trackless", "m4a");
        trackless_movie(&path);

        let err = AudioAsset::inspect(&path).unwrap_err();
        assert_eq!(err.kind(), "no_audio_track");

        let _ = std::fs::remove_file(path);
    }
}
