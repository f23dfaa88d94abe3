//! Shared state of one transcode job.

use std::path::PathBuf;

/// Phase of a transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    ReadingWriting,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Snapshot of a job, readable from any thread through its handle.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub scale: f32,
    pub phase: JobPhase,
    /// Frames handed to the writer so far.
    pub frames_written: u64,
    /// Display form of the failure, once failed.
    pub error: Option<String>,
}

impl TranscodeJob {
    pub(crate) fn new(input: PathBuf, output: PathBuf, scale: f32) -> Self {
        Self {
            input,
            output,
            scale,
            phase: JobPhase::Idle,
            frames_written: 0,
            error: None,
        }
    }
}
