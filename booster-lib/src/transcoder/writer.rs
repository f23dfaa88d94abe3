//! Readiness-signalling writer backed by a dedicated encoder thread.
//!
//! Buffers are handed over through a bounded queue of `queue_depth` slots.
//! The writer reports itself ready while a slot is free; the encoder thread
//! frees a slot after each buffer and wakes any thread waiting for readiness.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::audio::buffer::{BufferFormat, SampleBuffer};
use crate::config::{OutputFormat, WriterSettings};
use crate::error::BoostError;
use crate::tools::tools::panic_message;

use super::encoder::{DefaultEncoders, EncoderFactory, SampleEncoder};

/// Lifecycle of an [`AssetWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    Unknown,
    Writing,
    Completed,
    Failed,
}

struct WriterState {
    status: WriterStatus,
    queued: usize,
    frames_encoded: u64,
    session_end: Option<u64>,
    error: Option<BoostError>,
}

struct Shared {
    state: Mutex<WriterState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: BoostError) {
        let mut state = self.lock();
        warn!("writer failed: {}", err);
        state.status = WriterStatus::Failed;
        if state.error.is_none() {
            state.error = Some(err);
        }
        drop(state);
        self.ready.notify_all();
    }
}

/// Writes processed buffers to one output file.
pub struct AssetWriter {
    path: PathBuf,
    format: BufferFormat,
    output_format: OutputFormat,
    queue_depth: usize,
    shared: Arc<Shared>,
    sender: Option<SyncSender<SampleBuffer>>,
    encoder_thread: Option<JoinHandle<Result<(), BoostError>>>,
    input_finished: bool,
    next_pts: u64,
}

impl AssetWriter {
    /// Validate `settings` against the incoming `format` and open the encoder.
    ///
    /// The encoder is constructed on its own thread; construction errors are
    /// returned here.
    pub fn create(
        path: impl AsRef<Path>,
        settings: &WriterSettings,
        format: BufferFormat,
        queue_depth: usize,
    ) -> Result<Self, BoostError> {
        Self::create_with(path, settings, format, queue_depth, Arc::new(DefaultEncoders))
    }

    /// [`AssetWriter::create`] with encoders opened by `encoders`.
    pub fn create_with(
        path: impl AsRef<Path>,
        settings: &WriterSettings,
        format: BufferFormat,
        queue_depth: usize,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Result<Self, BoostError> {
        let path = path.as_ref().to_path_buf();
        negotiate_format(settings, format)?;
        if queue_depth == 0 {
            return Err(BoostError::WriterConstructionFailed(
                "queue depth must be greater than zero".to_string(),
            ));
        }

        let output_format = settings.format_for(&path);
        let shared = Arc::new(Shared {
            state: Mutex::new(WriterState {
                status: WriterStatus::Unknown,
                queued: 0,
                frames_encoded: 0,
                session_end: None,
                error: None,
            }),
            ready: Condvar::new(),
        });

        let (sender, receiver) = mpsc::sync_channel::<SampleBuffer>(queue_depth);
        let (opened_tx, opened_rx) = mpsc::channel::<Result<(), BoostError>>();
        let thread_shared = shared.clone();
        let thread_path = path.clone();
        let thread_settings = settings.clone();

        let handle = thread::spawn(move || {
            let encoder =
                match encoders.open(&thread_path, output_format, &thread_settings, format) {
                    Ok(encoder) => encoder,
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return Ok(());
                    }
                };
            let _ = opened_tx.send(Ok(()));

            let run_shared = thread_shared.clone();
            panic::catch_unwind(AssertUnwindSafe(move || {
                run_encoder(encoder, receiver, run_shared)
            }))
            .unwrap_or_else(|payload| {
                let message = format!("encoder panicked: {}", panic_message(payload.as_ref()));
                thread_shared.fail(BoostError::FinalizeFailed(message.clone()));
                Err(BoostError::FinalizeFailed(message))
            })
        });

        match opened_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(BoostError::WriterConstructionFailed(
                    "encoder thread exited during construction".to_string(),
                ));
            }
        }

        debug!(
            "writer opened: path={} format={:?} rate={} channels={} queue_depth={}",
            path.display(),
            output_format,
            format.sample_rate,
            format.channels,
            queue_depth
        );

        Ok(Self {
            path,
            format,
            output_format,
            queue_depth,
            shared,
            sender: Some(sender),
            encoder_thread: Some(handle),
            input_finished: false,
            next_pts: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn status(&self) -> WriterStatus {
        self.shared.lock().status
    }

    /// Frames the encoder has consumed so far.
    pub fn frames_encoded(&self) -> u64 {
        self.shared.lock().frames_encoded
    }

    pub fn take_error(&mut self) -> Option<BoostError> {
        self.shared.lock().error.take()
    }

    /// Begin accepting buffers whose timeline starts at `start_frame`.
    pub fn start_session(&mut self, start_frame: u64) -> Result<(), BoostError> {
        let mut state = self.shared.lock();
        if state.status != WriterStatus::Unknown {
            return Err(BoostError::WriterConstructionFailed(format!(
                "cannot start a session while {:?}",
                state.status
            )));
        }
        state.status = WriterStatus::Writing;
        self.next_pts = start_frame;
        Ok(())
    }

    /// True while the writer can take another buffer without exceeding its queue.
    pub fn is_ready_for_more_media_data(&self) -> bool {
        if self.input_finished {
            return false;
        }
        let state = self.shared.lock();
        state.status == WriterStatus::Writing && state.queued < self.queue_depth
    }

    /// Block until the writer is ready for more data or stops writing.
    ///
    /// Returns the writer status at wake-up.
    pub fn wait_until_ready(&self) -> WriterStatus {
        let mut state = self.shared.lock();
        while state.status == WriterStatus::Writing && state.queued >= self.queue_depth {
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.status
    }

    /// Hand `buffer` to the encoder.
    ///
    /// Buffers must arrive in timeline order, match the negotiated format and
    /// only be appended while [`AssetWriter::is_ready_for_more_media_data`]
    /// holds. A rejected append leaves the writer failed.
    pub fn append(&mut self, buffer: SampleBuffer) -> Result<(), BoostError> {
        if self.input_finished {
            return Err(BoostError::EncodeAppendFailed(
                "input was already marked as finished".to_string(),
            ));
        }

        {
            let mut state = self.shared.lock();
            match state.status {
                WriterStatus::Writing => {}
                WriterStatus::Failed => {
                    return Err(state.error.take().unwrap_or_else(|| {
                        BoostError::EncodeAppendFailed("writer has failed".to_string())
                    }));
                }
                status => {
                    return Err(BoostError::EncodeAppendFailed(format!(
                        "writer is not writing ({:?})",
                        status
                    )));
                }
            }
            if state.queued >= self.queue_depth {
                return Err(BoostError::EncodeAppendFailed(
                    "writer is not ready for more media data".to_string(),
                ));
            }
            state.queued += 1;
        }

        if let Err(err) = self.check_buffer(&buffer) {
            self.release_slot();
            self.shared.fail(err);
            return Err(self.take_error().unwrap_or_else(|| {
                BoostError::EncodeAppendFailed("buffer rejected".to_string())
            }));
        }

        self.next_pts += buffer.frame_count();
        let sent = match self.sender.as_ref() {
            Some(sender) => sender.send(buffer).is_ok(),
            None => false,
        };
        if !sent {
            self.release_slot();
            self.shared.fail(BoostError::EncodeAppendFailed(
                "encoder thread is no longer running".to_string(),
            ));
            return Err(self.take_error().unwrap_or_else(|| {
                BoostError::EncodeAppendFailed("encoder thread is no longer running".to_string())
            }));
        }

        Ok(())
    }

    /// No more buffers will be appended.
    pub fn mark_as_finished(&mut self) {
        self.input_finished = true;
    }

    /// Record the source timeline end, in frames.
    ///
    /// The encoder trims its output to this end when it finishes.
    pub fn end_session(&mut self, end_frame: u64) {
        self.shared.lock().session_end = Some(end_frame);
    }

    /// Drain the queue, finish the encoder and close the file.
    pub fn finish_writing(mut self) -> Result<(), BoostError> {
        self.input_finished = true;
        self.sender.take();

        let joined = match self.encoder_thread.take() {
            Some(handle) => handle.join().map_err(|_| {
                BoostError::FinalizeFailed("encoder thread panicked".to_string())
            }),
            None => Err(BoostError::FinalizeFailed(
                "writer was already finished".to_string(),
            )),
        };

        if let Some(err) = self.take_error() {
            self.shared.lock().status = WriterStatus::Failed;
            return Err(err);
        }
        if let Err(err) = joined.and_then(|finished| finished) {
            self.shared.fail(BoostError::FinalizeFailed(err.to_string()));
            return Err(err);
        }

        let (frames_encoded, session_end) = {
            let mut state = self.shared.lock();
            state.status = WriterStatus::Completed;
            (state.frames_encoded, state.session_end)
        };
        if let Some(end) = session_end {
            if end != frames_encoded {
                debug!(
                    "session end {} differs from {} encoded frames for {}",
                    end,
                    frames_encoded,
                    self.path.display()
                );
            }
        }
        debug!(
            "writer finished: path={} frames={}",
            self.path.display(),
            frames_encoded
        );
        Ok(())
    }

    fn check_buffer(&self, buffer: &SampleBuffer) -> Result<(), BoostError> {
        if buffer.format() != self.format {
            return Err(BoostError::FormatMismatch(format!(
                "buffer format {:?} does not match writer format {:?}",
                buffer.format(),
                self.format
            )));
        }
        let timing = buffer.timing();
        if timing.pts != self.next_pts {
            return Err(BoostError::EncodeAppendFailed(format!(
                "buffer at frame {} appended out of order, expected frame {}",
                timing.pts, self.next_pts
            )));
        }
        Ok(())
    }

    fn release_slot(&self) {
        let mut state = self.shared.lock();
        state.queued = state.queued.saturating_sub(1);
        drop(state);
        self.shared.ready.notify_all();
    }
}

impl Drop for AssetWriter {
    fn drop(&mut self) {
        // Closing the queue lets an unfinished encoder thread run to its end.
        self.sender.take();
        if let Some(handle) = self.encoder_thread.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for AssetWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetWriter")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("output_format", &self.output_format)
            .field("queue_depth", &self.queue_depth)
            .field("next_pts", &self.next_pts)
            .finish()
    }
}

fn negotiate_format(settings: &WriterSettings, format: BufferFormat) -> Result<(), BoostError> {
    if let Some(sample_rate) = settings.sample_rate {
        if sample_rate != format.sample_rate {
            return Err(BoostError::FormatMismatch(format!(
                "writer expects {} Hz but the source is {} Hz",
                sample_rate, format.sample_rate
            )));
        }
    }
    if settings.channels != format.channels {
        return Err(BoostError::FormatMismatch(format!(
            "writer expects {} channel(s) but the source has {}",
            settings.channels, format.channels
        )));
    }
    Ok(())
}

fn run_encoder(
    mut encoder: Box<dyn SampleEncoder>,
    receiver: Receiver<SampleBuffer>,
    shared: Arc<Shared>,
) -> Result<(), BoostError> {
    for buffer in receiver {
        let frames = buffer.frame_count();
        let result = panic::catch_unwind(AssertUnwindSafe(|| encoder.encode(&buffer)))
            .unwrap_or_else(|payload| {
                Err(BoostError::EncodeAppendFailed(format!(
                    "encoder panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        drop(buffer);

        match result {
            Ok(()) => {
                let mut state = shared.lock();
                state.queued = state.queued.saturating_sub(1);
                state.frames_encoded += frames;
                drop(state);
                shared.ready.notify_all();
            }
            Err(err) => {
                shared.fail(err);
                return Err(BoostError::EncodeAppendFailed(
                    "encoder stopped after a failed buffer".to_string(),
                ));
            }
        }
    }

    let session_end = shared.lock().session_end;
    encoder.finish(session_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::BufferTiming;
    use crate::test_support::{read_wav, temp_path};

    fn mono() -> BufferFormat {
        BufferFormat {
            sample_rate: 8_000,
            channels: 1,
        }
    }

    fn buffer(pts: u64, samples: Vec<i16>) -> SampleBuffer {
        let duration = samples.len() as u64;
        SampleBuffer::new(
            samples,
            BufferTiming {
                pts,
                dts: pts,
                duration,
            },
            mono(),
        )
        .expect("buffer")
    }

    #[test]
    fn writes_buffers_in_order() {
        let path = temp_path("writer-order", "wav");
        let mut writer =
            AssetWriter::create(&path, &WriterSettings::default(), mono(), 2).expect("create");
        assert_eq!(writer.status(), WriterStatus::Unknown);
        writer.start_session(0).expect("start");

        let mut pts = 0;
        for chunk in 0..10_i16 {
            assert_eq!(writer.wait_until_ready(), WriterStatus::Writing);
            assert!(writer.is_ready_for_more_media_data());
            writer.append(buffer(pts, vec![chunk; 100])).expect("append");
            pts += 100;
        }
        writer.mark_as_finished();
        assert!(!writer.is_ready_for_more_media_data());
        writer.end_session(pts);
        writer.finish_writing().expect("finish");

        let (spec, samples) = read_wav(&path);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(samples.len(), 1_000);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[999], 9);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rejects_appends_before_the_session_starts() {
        let path = temp_path("writer-unstarted", "wav");
        let mut writer =
            AssetWriter::create(&path, &WriterSettings::default(), mono(), 1).expect("create");
        assert!(!writer.is_ready_for_more_media_data());
        let err = writer.append(buffer(0, vec![1; 10])).unwrap_err();
        assert_eq!(err.kind(), "encode_append_failed");
        drop(writer);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rejects_out_of_order_buffers() {
        let path = temp_path("writer-gap", "wav");
        let mut writer =
            AssetWriter::create(&path, &WriterSettings::default(), mono(), 2).expect("create");
        writer.start_session(0).expect("start");
        writer.append(buffer(0, vec![1; 10])).expect("append");
        assert!(writer.wait_until_ready() == WriterStatus::Writing);
        let err = writer.append(buffer(50, vec![1; 10])).unwrap_err();
        assert_eq!(err.kind(), "encode_append_failed");
        assert_eq!(writer.status(), WriterStatus::Failed);
        assert!(!writer.is_ready_for_more_media_data());
        drop(writer);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rejects_format_mismatch_at_construction() {
        let path = temp_path("writer-rate", "wav");
        let settings = WriterSettings {
            sample_rate: Some(44_100),
            ..WriterSettings::default()
        };
        let err = AssetWriter::create(&path, &settings, mono(), 2).unwrap_err();
        assert_eq!(err.kind(), "format_mismatch");

        let stereo = BufferFormat {
            sample_rate: 8_000,
            channels: 2,
        };
        let err = AssetWriter::create(&path, &WriterSettings::default(), stereo, 2).unwrap_err();
        assert_eq!(err.kind(), "format_mismatch");
    }

    #[test]
    fn reports_unwritable_output() {
        let path = temp_path("writer-missing-dir", "d").join("nested").join("out.wav");
        let err = AssetWriter::create(&path, &WriterSettings::default(), mono(), 2).unwrap_err();
        assert_eq!(err.kind(), "writer_construction_failed");
    }

    #[cfg(not(feature = "m4a"))]
    #[test]
    fn m4a_requires_the_feature() {
        let path = temp_path("writer-m4a", "m4a");
        let err = AssetWriter::create(&path, &WriterSettings::default(), mono(), 2).unwrap_err();
        assert_eq!(err.kind(), "writer_construction_failed");
    }

    struct Recording {
        frames: Arc<Mutex<u64>>,
        finished_with: Arc<Mutex<Option<Option<u64>>>>,
    }

    impl SampleEncoder for Recording {
        fn encode(&mut self, buffer: &SampleBuffer) -> Result<(), BoostError> {
            *self.frames.lock().unwrap() += buffer.frame_count();
            Ok(())
        }

        fn finish(self: Box<Self>, session_end: Option<u64>) -> Result<(), BoostError> {
            *self.finished_with.lock().unwrap() = Some(session_end);
            Ok(())
        }
    }

    struct RecordingFactory {
        frames: Arc<Mutex<u64>>,
        finished_with: Arc<Mutex<Option<Option<u64>>>>,
    }

    impl EncoderFactory for RecordingFactory {
        fn open(
            &self,
            _path: &Path,
            _format: OutputFormat,
            _settings: &WriterSettings,
            _input: BufferFormat,
        ) -> Result<Box<dyn SampleEncoder>, BoostError> {
            Ok(Box::new(Recording {
                frames: self.frames.clone(),
                finished_with: self.finished_with.clone(),
            }))
        }
    }

    struct Panicking;

    impl SampleEncoder for Panicking {
        fn encode(&mut self, _buffer: &SampleBuffer) -> Result<(), BoostError> {
            panic!("encoder blew up");
        }

        fn finish(self: Box<Self>, _session_end: Option<u64>) -> Result<(), BoostError> {
            Ok(())
        }
    }

    struct PanickingFactory;

    impl EncoderFactory for PanickingFactory {
        fn open(
            &self,
            _path: &Path,
            _format: OutputFormat,
            _settings: &WriterSettings,
            _input: BufferFormat,
        ) -> Result<Box<dyn SampleEncoder>, BoostError> {
            Ok(Box::new(Panicking))
        }
    }

    #[test]
    fn session_end_reaches_the_encoder() {
        let path = temp_path("writer-session-end", "wav");
        let frames = Arc::new(Mutex::new(0));
        let finished_with = Arc::new(Mutex::new(None));
        let factory = RecordingFactory {
            frames: frames.clone(),
            finished_with: finished_with.clone(),
        };
        let mut writer = AssetWriter::create_with(
            &path,
            &WriterSettings::default(),
            mono(),
            2,
            Arc::new(factory),
        )
        .expect("create");
        writer.start_session(0).expect("start");
        writer.wait_until_ready();
        writer.append(buffer(0, vec![7; 300])).expect("append");
        writer.mark_as_finished();
        writer.end_session(250);
        writer.finish_writing().expect("finish");

        assert_eq!(*frames.lock().unwrap(), 300);
        assert_eq!(*finished_with.lock().unwrap(), Some(Some(250)));
        assert!(!path.exists());
    }

    #[test]
    fn panicking_encoder_fails_the_writer() {
        let path = temp_path("writer-panic", "wav");
        let mut writer = AssetWriter::create_with(
            &path,
            &WriterSettings::default(),
            mono(),
            1,
            Arc::new(PanickingFactory),
        )
        .expect("create");
        writer.start_session(0).expect("start");

        let mut pts = 0;
        let err = loop {
            if writer.wait_until_ready() != WriterStatus::Writing {
                break writer.take_error().expect("stored error");
            }
            match writer.append(buffer(pts, vec![1; 10])) {
                Ok(()) => pts += 10,
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), "encode_append_failed");
        assert!(err.to_string().contains("encoder blew up"));
        assert_eq!(writer.status(), WriterStatus::Failed);
        assert!(writer.finish_writing().is_err());
    }

    #[test]
    fn readiness_tracks_queue_depth() {
        let path = temp_path("writer-depth", "wav");
        let mut writer =
            AssetWriter::create(&path, &WriterSettings::default(), mono(), 1).expect("create");
        writer.start_session(0).expect("start");

        let mut pts = 0;
        for _ in 0..50 {
            // With one slot the writer must drain before the next append.
            assert_eq!(writer.wait_until_ready(), WriterStatus::Writing);
            writer.append(buffer(pts, vec![3; 64])).expect("append");
            pts += 64;
        }
        writer.mark_as_finished();
        writer.finish_writing().expect("finish");
        let (_, samples) = read_wav(&path);
        assert_eq!(samples.len(), 50 * 64);
        let _ = std::fs::remove_file(path);
    }
}
