//! Streaming decode → scale → encode of one asset on a worker thread.
//!
//! The worker pulls buffers from an [`AssetReader`] only while the
//! [`AssetWriter`] reports it is ready for more media data, and sleeps on the
//! writer's readiness signal otherwise. The completion callback runs exactly
//! once, on the context chosen through [`Dispatch`].

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::audio::reader::{AssetReader, ReaderStatus};
use crate::config::BoosterConfig;
use crate::error::BoostError;
use crate::processor;
use crate::tools::tools::panic_message;

pub mod dispatch;
mod encoder;
mod guard;
mod job;
pub mod writer;

pub use dispatch::{CallbackQueue, Dispatch, QueueDispatch, Task, WorkerDispatch};
pub use encoder::{DefaultEncoders, EncoderFactory, SampleEncoder, WavEncoder};
pub use guard::OutputReservation;
pub use job::{JobPhase, TranscodeJob};
pub use writer::{AssetWriter, WriterStatus};

#[cfg(feature = "m4a")]
pub use encoder::M4aEncoder;

/// Outcome of a successful transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub scale: f32,
    /// Frames read from the source and appended to the output.
    pub frames: u64,
}

/// Result delivered to a completion callback.
pub type TranscodeResult = Result<TranscodeSummary, BoostError>;

/// Handle to a running transcode job.
#[derive(Debug)]
pub struct TranscodeHandle {
    job: Arc<Mutex<TranscodeJob>>,
    worker: Option<JoinHandle<()>>,
}

impl TranscodeHandle {
    pub fn phase(&self) -> JobPhase {
        lock(&self.job).phase
    }

    pub fn snapshot(&self) -> TranscodeJob {
        lock(&self.job).clone()
    }

    /// Wait for the worker thread to exit and return the final job state.
    ///
    /// With a [`CallbackQueue`] the callback may still be waiting in the
    /// queue when this returns.
    pub fn join(mut self) -> TranscodeJob {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                let mut job = lock(&self.job);
                job.phase = JobPhase::Failed;
                job.error.get_or_insert_with(|| "transcode worker panicked".to_string());
            }
        }
        self.snapshot()
    }
}

/// Rewrites assets with a constant gain.
#[derive(Clone)]
pub struct StreamingTranscoder {
    config: BoosterConfig,
    dispatch: Arc<dyn Dispatch>,
    encoders: Arc<dyn EncoderFactory>,
}

impl StreamingTranscoder {
    /// Transcoder whose callbacks run on the worker thread.
    pub fn new(config: BoosterConfig) -> Self {
        Self::with_dispatch(config, Arc::new(WorkerDispatch))
    }

    /// Transcoder whose callbacks run through `dispatch`.
    pub fn with_dispatch(config: BoosterConfig, dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            config,
            dispatch,
            encoders: Arc::new(DefaultEncoders),
        }
    }

    /// Open output encoders through `encoders` instead of the built-in ones.
    pub fn with_encoders(mut self, encoders: Arc<dyn EncoderFactory>) -> Self {
        self.encoders = encoders;
        self
    }

    /// This transcoder with callbacks run on the worker thread.
    pub(crate) fn on_worker(&self) -> Self {
        Self {
            dispatch: Arc::new(WorkerDispatch),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &BoosterConfig {
        &self.config
    }

    /// Start rewriting `input` into `output` scaled by `scale`.
    ///
    /// Returns immediately. Any existing file at `output` is replaced.
    /// `on_complete` is dispatched exactly once, with the summary or the
    /// first error. A second job on an output that is still being written
    /// fails with `OutputInUse` without touching the file.
    pub fn transcode<F>(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        scale: f32,
        on_complete: F,
    ) -> TranscodeHandle
    where
        F: FnOnce(TranscodeResult) + Send + 'static,
    {
        spawn_job(
            self.clone(),
            input.as_ref().to_path_buf(),
            output.as_ref().to_path_buf(),
            scale,
            on_complete,
        )
    }

    /// Run a transcode and wait for its result on the calling thread.
    pub fn transcode_blocking(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        scale: f32,
    ) -> TranscodeResult {
        let (sender, receiver) = mpsc::channel();
        let handle = spawn_job(
            self.on_worker(),
            input.as_ref().to_path_buf(),
            output.as_ref().to_path_buf(),
            scale,
            move |result| {
                let _ = sender.send(result);
            },
        );
        handle.join();
        receiver.recv().unwrap_or_else(|_| {
            Err(BoostError::FinalizeFailed(
                "transcode worker exited without reporting".to_string(),
            ))
        })
    }

    /// Report `err` for a job that will not run, through the usual callback path.
    pub(crate) fn reject<F>(
        &self,
        input: &Path,
        output: &Path,
        err: BoostError,
        on_complete: F,
    ) -> TranscodeHandle
    where
        F: FnOnce(TranscodeResult) + Send + 'static,
    {
        let job = Arc::new(Mutex::new(TranscodeJob::new(
            input.to_path_buf(),
            output.to_path_buf(),
            1.0,
        )));
        reject(job, self.dispatch.as_ref(), err, on_complete)
    }
}

impl std::fmt::Debug for StreamingTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingTranscoder")
            .field("config", &self.config)
            .finish()
    }
}

fn spawn_job<F>(
    transcoder: StreamingTranscoder,
    input: PathBuf,
    output: PathBuf,
    scale: f32,
    on_complete: F,
) -> TranscodeHandle
where
    F: FnOnce(TranscodeResult) + Send + 'static,
{
    let job = Arc::new(Mutex::new(TranscodeJob::new(
        input.clone(),
        output.clone(),
        scale,
    )));

    let reservation = match OutputReservation::acquire(&output) {
        Ok(reservation) => reservation,
        Err(err) => return reject(job, transcoder.dispatch.as_ref(), err, on_complete),
    };

    let worker_job = job.clone();
    let worker = thread::spawn(move || {
        let result = catch_job_panic(|| run_job(&transcoder, &worker_job, &input, &output, scale));
        if result.is_err() {
            remove_partial_output(&output);
        }
        finish_job(
            &worker_job,
            &result.as_ref().map(|_| ()).map_err(|err| err.to_string()),
        );
        drop(reservation);
        transcoder
            .dispatch
            .dispatch(Box::new(move || on_complete(result)));
    });

    TranscodeHandle {
        job,
        worker: Some(worker),
    }
}

/// Fail a job that never reached its worker thread.
fn reject<F>(
    job: Arc<Mutex<TranscodeJob>>,
    dispatch: &dyn Dispatch,
    err: BoostError,
    on_complete: F,
) -> TranscodeHandle
where
    F: FnOnce(TranscodeResult) + Send + 'static,
{
    warn!("transcode refused: {}", err);
    finish_job(&job, &Err(err.to_string()));
    dispatch.dispatch(Box::new(move || on_complete(Err(err))));
    TranscodeHandle { job, worker: None }
}

/// Run `job`, turning a panic into a failed result.
fn catch_job_panic<F>(job: F) -> TranscodeResult
where
    F: FnOnce() -> TranscodeResult,
{
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!("transcode worker panicked: {}", message);
        Err(BoostError::FinalizeFailed(format!(
            "transcode worker panicked: {}",
            message
        )))
    })
}

enum Pump {
    NeedsMoreSpace,
    ReaderFinished,
}

fn run_job(
    transcoder: &StreamingTranscoder,
    job: &Mutex<TranscodeJob>,
    input: &Path,
    output: &Path,
    scale: f32,
) -> TranscodeResult {
    let config = &transcoder.config;
    remove_existing_output(output)?;

    let mut reader = AssetReader::open(input, &config.reader)?;
    let mut writer = AssetWriter::create_with(
        output,
        &config.writer,
        reader.output_format(),
        config.queue_depth,
        transcoder.encoders.clone(),
    )?;
    writer.start_session(0)?;
    lock(job).phase = JobPhase::ReadingWriting;
    debug!(
        "transcode started: {} -> {} scale={:.4}",
        input.display(),
        output.display(),
        scale
    );

    loop {
        writer.wait_until_ready();
        match pump(&mut reader, &mut writer, scale, job)? {
            Pump::NeedsMoreSpace => continue,
            Pump::ReaderFinished => break,
        }
    }

    let frames_read = reader.frames_read();
    let session_end = reader.asset().duration_frames().unwrap_or(frames_read);
    if session_end != frames_read {
        debug!(
            "container declares {} frames but {} were decoded",
            session_end, frames_read
        );
    }
    writer.mark_as_finished();
    writer.end_session(session_end);
    writer.finish_writing()?;

    info!(
        "boosted {} -> {}: frames={} scale={:.4}",
        input.display(),
        output.display(),
        frames_read,
        scale
    );

    Ok(TranscodeSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        scale,
        frames: frames_read,
    })
}

/// Move buffers from reader to writer until the writer needs to drain or the
/// reader stops.
fn pump(
    reader: &mut AssetReader,
    writer: &mut AssetWriter,
    scale: f32,
    job: &Mutex<TranscodeJob>,
) -> Result<Pump, BoostError> {
    while writer.is_ready_for_more_media_data() && reader.status() == ReaderStatus::Reading {
        let Some(mut buffer) = reader.copy_next_sample_buffer() else {
            break;
        };
        processor::apply_in_place(scale, buffer.samples_mut());
        let frames = buffer.frame_count();
        if let Err(err) = writer.append(buffer) {
            reader.cancel_reading();
            return Err(err);
        }
        lock(job).frames_written += frames;
    }

    match reader.status() {
        ReaderStatus::Reading => {
            if writer.status() == WriterStatus::Writing {
                Ok(Pump::NeedsMoreSpace)
            } else {
                Err(writer
                    .take_error()
                    .or_else(|| reader.take_error())
                    .unwrap_or_else(|| {
                        BoostError::EncodeAppendFailed("writer stopped writing".to_string())
                    }))
            }
        }
        ReaderStatus::Completed => Ok(Pump::ReaderFinished),
        ReaderStatus::Failed => Err(reader.take_error().unwrap_or_else(|| {
            BoostError::DecodeFailed("reader failed without an error".to_string())
        })),
        ReaderStatus::Cancelled => Err(BoostError::DecodeFailed(
            "reading was cancelled".to_string(),
        )),
    }
}

fn remove_existing_output(output: &Path) -> Result<(), BoostError> {
    match std::fs::remove_file(output) {
        Ok(()) => {
            debug!("removed existing output {}", output.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BoostError::Io(err)),
    }
}

fn remove_partial_output(output: &Path) {
    if let Err(err) = std::fs::remove_file(output) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove partial output {}: {}", output.display(), err);
        }
    }
}

fn finish_job(job: &Mutex<TranscodeJob>, result: &Result<(), String>) {
    let mut job = lock(job);
    match result {
        Ok(()) => job.phase = JobPhase::Completed,
        Err(err) => {
            job.phase = JobPhase::Failed;
            job.error = Some(err.clone());
        }
    }
}

fn lock(job: &Mutex<TranscodeJob>) -> MutexGuard<'_, TranscodeJob> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}
