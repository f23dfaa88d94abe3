//! Symphonia helpers for opening and decoding audio files.

use std::any::Any;
use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::{CodecType, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, ProbeResult};

use crate::error::BoostError;

/// Open a file's container, trying its extension as a hint first and no hint second.
pub(crate) fn open_format(path: &Path) -> Result<ProbeResult, BoostError> {
    let mut hints: Vec<Option<String>> = Vec::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hints.push(Some(ext.to_lowercase()));
    }
    hints.push(None);

    let mut last_error: Option<Error> = None;
    for hint in hints {
        let source = Box::new(File::open(path)?) as Box<dyn MediaSource>;
        match format_with_hint(source, hint.as_deref()) {
            Ok(opened) => return Ok(opened),
            Err(err) => last_error = Some(err),
        }
    }

    Err(BoostError::ReaderConstructionFailed(match last_error {
        Some(err) => format!("{}: {}", path.display(), err),
        None => format!("{}: unsupported format", path.display()),
    }))
}

fn format_with_hint(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> Result<ProbeResult, Error> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    // Use the default options for metadata and format readers.
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)
}

/// Find the first track with a known (decodeable) audio codec.
pub(crate) fn first_audio_track(format: &dyn FormatReader) -> Option<&Track> {
    format
        .tracks()
        .iter()
        .find(|track| {
            track.codec_params.codec != CODEC_TYPE_NULL
                && track.codec_params.sample_rate.is_some()
        })
}

/// Short registry name of `codec`, such as `pcm_s16le` or `aac`.
pub(crate) fn codec_name(codec: CodecType) -> &'static str {
    symphonia::default::get_codecs()
        .get_codec(codec)
        .map(|descriptor| descriptor.short_name)
        .unwrap_or("unknown")
}

/// Build a decoder for `track`.
pub(crate) fn make_decoder(track: &Track) -> Result<Box<dyn Decoder>, BoostError> {
    // Use the default options for the decoder.
    let dec_opts: DecoderOptions = Default::default();

    symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|err| BoostError::ReaderConstructionFailed(err.to_string()))
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
