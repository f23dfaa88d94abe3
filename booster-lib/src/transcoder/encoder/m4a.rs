//! AAC-LC in an MPEG-4 audio container.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use bytes::Bytes;
use fdk_aac::enc::{BitRate, ChannelMode, Encoder, EncoderParams, Transport};
use log::debug;
use mp4::{
    AacConfig, AudioObjectType, ChannelConfig, FourCC, MediaConfig, Mp4Config, Mp4Sample,
    Mp4Writer, SampleFreqIndex, TrackConfig, TrackType,
};

use crate::audio::buffer::{BufferFormat, SampleBuffer};
use crate::error::BoostError;
use crate::tools::movie::{finalize_aac_movie, EditWindow};

use super::SampleEncoder;

const TRACK_ID: u32 = 1;
const MAX_FLUSH_FRAMES: usize = 8;

/// Encodes 1024-frame access units and muxes them as one audio track.
pub struct M4aEncoder {
    encoder: Encoder,
    muxer: Mp4Writer<BufWriter<File>>,
    channels: usize,
    frame_length: usize,
    /// Priming frames the decoder emits before the first input frame.
    delay: u64,
    pending: Vec<i16>,
    scratch: Vec<u8>,
    frames_in: u64,
    frames_out: u64,
}

impl M4aEncoder {
    pub fn create(path: &Path, format: BufferFormat, bit_rate: u32) -> Result<Self, BoostError> {
        let construction = |err: String| BoostError::WriterConstructionFailed(err);

        let (channel_mode, channel_config) = match format.channels {
            1 => (ChannelMode::Mono, ChannelConfig::Mono),
            2 => (ChannelMode::Stereo, ChannelConfig::Stereo),
            other => return Err(construction(format!("unsupported channel count {}", other))),
        };
        let freq_index = sample_freq_index(format.sample_rate).ok_or_else(|| {
            construction(format!("unsupported AAC sample rate {}", format.sample_rate))
        })?;

        let encoder = Encoder::new(EncoderParams {
            bit_rate: BitRate::Cbr(bit_rate),
            sample_rate: format.sample_rate,
            transport: Transport::Raw,
            channels: channel_mode,
        })
        .map_err(|err| construction(format!("aac encoder: {:?}", err)))?;
        let info = encoder
            .info()
            .map_err(|err| construction(format!("aac encoder info: {:?}", err)))?;

        let brand = |code: &str| {
            code.parse::<FourCC>()
                .map_err(|err| construction(err.to_string()))
        };
        let config = Mp4Config {
            major_brand: brand("M4A ")?,
            minor_version: 512,
            compatible_brands: vec![brand("M4A ")?, brand("isom")?, brand("mp42")?],
            timescale: format.sample_rate,
        };

        let file = File::create(path)?;
        let mut muxer = Mp4Writer::write_start(BufWriter::new(file), &config)
            .map_err(|err| construction(err.to_string()))?;
        muxer
            .add_track(&TrackConfig {
                track_type: TrackType::Audio,
                timescale: format.sample_rate,
                language: "und".to_string(),
                media_conf: MediaConfig::AacConfig(AacConfig {
                    bitrate: bit_rate,
                    profile: AudioObjectType::AacLowComplexity,
                    freq_index,
                    chan_conf: channel_config,
                }),
            })
            .map_err(|err| construction(err.to_string()))?;

        Ok(Self {
            encoder,
            muxer,
            channels: format.channels as usize,
            frame_length: info.frameLength as usize,
            delay: u64::from(info.nDelay),
            pending: Vec::new(),
            scratch: vec![0; (info.maxOutBufBytes as usize).max(8192)],
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<(), BoostError> {
        let mut offset = 0;
        while offset < frame.len() {
            let encoded = self
                .encoder
                .encode(&frame[offset..], &mut self.scratch)
                .map_err(|err| BoostError::EncodeAppendFailed(format!("aac: {:?}", err)))?;
            offset += encoded.input_consumed;

            if encoded.output_size > 0 {
                self.write_access_unit(encoded.output_size)?;
            } else if encoded.input_consumed == 0 {
                break;
            }
        }
        Ok(())
    }

    fn write_access_unit(&mut self, size: usize) -> Result<(), BoostError> {
        let sample = Mp4Sample {
            start_time: self.frames_out,
            duration: self.frame_length as u32,
            rendering_offset: 0,
            is_sync: true,
            bytes: Bytes::copy_from_slice(&self.scratch[..size]),
        };
        self.muxer
            .write_sample(TRACK_ID, &sample)
            .map_err(|err| BoostError::EncodeAppendFailed(err.to_string()))?;
        self.frames_out += self.frame_length as u64;
        Ok(())
    }

    fn drain_pending(&mut self) -> Result<(), BoostError> {
        let frame_samples = self.frame_length * self.channels;
        while self.pending.len() >= frame_samples {
            let frame: Vec<i16> = self.pending.drain(..frame_samples).collect();
            self.encode_frame(&frame)?;
        }
        Ok(())
    }
}

impl SampleEncoder for M4aEncoder {
    fn encode(&mut self, buffer: &SampleBuffer) -> Result<(), BoostError> {
        self.pending.extend_from_slice(buffer.samples());
        self.frames_in += buffer.frame_count();
        self.drain_pending()
    }

    fn finish(mut self: Box<Self>, session_end: Option<u64>) -> Result<(), BoostError> {
        let frame_samples = self.frame_length * self.channels;

        // Pad the tail and push silence through the encoder delay until every
        // input frame is covered by an emitted access unit.
        let remainder = self.pending.len() % frame_samples;
        if remainder > 0 {
            self.pending.resize(self.pending.len() + frame_samples - remainder, 0);
        }
        self.drain_pending()
            .map_err(|err| BoostError::FinalizeFailed(err.to_string()))?;

        let silence = vec![0_i16; frame_samples];
        let covered = self.frames_in + self.delay;
        let mut flushed = 0;
        while self.frames_out < covered && flushed < MAX_FLUSH_FRAMES {
            self.encode_frame(&silence)
                .map_err(|err| BoostError::FinalizeFailed(err.to_string()))?;
            flushed += 1;
        }

        let window = EditWindow {
            skip: self.delay,
            frames: session_end.unwrap_or(self.frames_in).min(self.frames_in),
        };
        debug!(
            "m4a finished: frames_in={} frames_out={} flush_frames={} window={:?}",
            self.frames_in, self.frames_out, flushed, window
        );

        self.muxer
            .write_end()
            .map_err(|err| BoostError::FinalizeFailed(err.to_string()))?;
        let mut file = self
            .muxer
            .into_writer()
            .into_inner()
            .map_err(|err| BoostError::Io(err.into_error()))?;
        finalize_aac_movie(&mut file, window)
    }
}

fn sample_freq_index(sample_rate: u32) -> Option<SampleFreqIndex> {
    let index = match sample_rate {
        96_000 => SampleFreqIndex::Freq96000,
        88_200 => SampleFreqIndex::Freq88200,
        64_000 => SampleFreqIndex::Freq64000,
        48_000 => SampleFreqIndex::Freq48000,
        44_100 => SampleFreqIndex::Freq44100,
        32_000 => SampleFreqIndex::Freq32000,
        24_000 => SampleFreqIndex::Freq24000,
        22_050 => SampleFreqIndex::Freq22050,
        16_000 => SampleFreqIndex::Freq16000,
        12_000 => SampleFreqIndex::Freq12000,
        11_025 => SampleFreqIndex::Freq11025,
        8_000 => SampleFreqIndex::Freq8000,
        _ => return None,
    };
    Some(index)
}
