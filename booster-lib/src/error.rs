use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Error type for scanning, transcoding and configuration.
#[derive(Debug)]
pub enum BoostError {
    NoAudioTrack,
    ReaderConstructionFailed(String),
    WriterConstructionFailed(String),
    DecodeFailed(String),
    EncodeAppendFailed(String),
    FinalizeFailed(String),
    FormatMismatch(String),
    OutputInUse(PathBuf),
    InvalidConfig(String),
    Io(std::io::Error),
}

impl Display for BoostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAudioTrack => write!(f, "no audio track found"),
            Self::ReaderConstructionFailed(err) => write!(f, "unable to create reader: {}", err),
            Self::WriterConstructionFailed(err) => write!(f, "unable to create writer: {}", err),
            Self::DecodeFailed(err) => write!(f, "decode failed: {}", err),
            Self::EncodeAppendFailed(err) => write!(f, "encoder rejected buffer: {}", err),
            Self::FinalizeFailed(err) => write!(f, "unable to finalize output: {}", err),
            Self::FormatMismatch(err) => write!(f, "format mismatch: {}", err),
            Self::OutputInUse(path) => {
                write!(f, "output {} is already being written", path.display())
            }
            Self::InvalidConfig(err) => write!(f, "invalid config: {}", err),
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for BoostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BoostError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<symphonia::core::errors::Error> for BoostError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        match value {
            symphonia::core::errors::Error::IoError(err) => Self::Io(err),
            other => Self::DecodeFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BoostError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}

impl BoostError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoAudioTrack => "no_audio_track",
            Self::ReaderConstructionFailed(_) => "reader_construction_failed",
            Self::WriterConstructionFailed(_) => "writer_construction_failed",
            Self::DecodeFailed(_) => "decode_failed",
            Self::EncodeAppendFailed(_) => "encode_append_failed",
            Self::FinalizeFailed(_) => "finalize_failed",
            Self::FormatMismatch(_) => "format_mismatch",
            Self::OutputInUse(_) => "output_in_use",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_and_expose_source() {
        let err: BoostError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "io error: gone");
    }

    #[test]
    fn output_in_use_names_the_path() {
        let err = BoostError::OutputInUse(PathBuf::from("/tmp/out.wav"));
        assert!(err.to_string().contains("/tmp/out.wav"));
    }

    #[test]
    fn symphonia_errors_convert() {
        let err: BoostError = symphonia::core::errors::Error::DecodeError("bad frame").into();
        assert_eq!(err.kind(), "decode_failed");
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: BoostError = symphonia::core::errors::Error::IoError(io).into();
        assert_eq!(err.kind(), "io");
    }
}
