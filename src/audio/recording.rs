// Recording - Capture of the rendered mix bus to a WAV file
//
// The audio thread only pushes samples into a lock-free ring buffer (the
// bus capture tap). A writer thread drains it and does the file I/O, so
// recording never blocks rendering.
//
// Recording and sequencing are independent state machines: a capture can be
// started or stopped at any point relative to the clock.

use crate::audio::format_conversion::f32_to_i16;
use crate::audio::mix_bus::{CaptureTap, MixBus};
use chrono::Local;
use crossbeam_channel::{RecvTimeoutError, Sender};
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Split};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Captured channels (the mono bus is duplicated to L/R)
pub const RECORDING_CHANNELS: u16 = 2;
/// Captured bit depth (integer PCM)
pub const RECORDING_BIT_DEPTH: u16 = 16;

/// Seconds of audio the ring buffer can hold before samples are dropped
const RING_SECONDS: usize = 2;
/// Writer thread poll interval when the ring is empty
const WRITER_POLL: Duration = Duration::from_millis(10);
const WRITE_CHUNK: usize = 1024;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Already recording to {0}")]
    AlreadyRecording(PathBuf),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording writer thread panicked")]
    WriterPanicked,
}

pub type RecordingResult<T> = Result<T, RecordingError>;

struct ActiveRecording {
    path: PathBuf,
    stop_tx: Sender<()>,
    writer: JoinHandle<RecordingResult<u64>>,
    frames_written: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

/// Starts and stops captures of a mix bus
pub struct RecordingController {
    bus: Arc<MixBus>,
    active: Mutex<Option<ActiveRecording>>,
}

impl RecordingController {
    pub fn new(bus: Arc<MixBus>) -> Self {
        Self {
            bus,
            active: Mutex::new(None),
        }
    }

    /// WAV format used for captures: 16-bit stereo at the bus sample rate
    pub fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: RECORDING_CHANNELS,
            sample_rate: self.bus.sample_rate(),
            bits_per_sample: RECORDING_BIT_DEPTH,
            sample_format: SampleFormat::Int,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Path of the capture in progress
    pub fn current_path(&self) -> Option<PathBuf> {
        self.active.lock().as_ref().map(|a| a.path.clone())
    }

    /// Frames written so far by the current capture (0 when idle)
    pub fn recorded_frames(&self) -> u64 {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |a| a.frames_written.load(Ordering::Relaxed))
    }

    /// Start capturing the bus into `path`
    ///
    /// Starting while a capture is running is reported as
    /// `RecordingError::AlreadyRecording` and leaves that capture untouched.
    pub fn start(&self, path: impl AsRef<Path>) -> RecordingResult<()> {
        let path = path.as_ref().to_path_buf();
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(RecordingError::AlreadyRecording(current.path.clone()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = WavWriter::create(&path, self.wav_spec())?;

        let capacity = self.bus.sample_rate() as usize * RING_SECONDS;
        let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();
        let dropped = Arc::new(AtomicU64::new(0));
        let frames_written = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_frames = Arc::clone(&frames_written);
        let handle = thread::Builder::new()
            .name("pulsegrid-recorder".to_string())
            .spawn(move || -> RecordingResult<u64> {
                let mut writer = writer;
                let mut chunk = vec![0.0f32; WRITE_CHUNK];
                loop {
                    let n = consumer.pop_slice(&mut chunk);
                    if n > 0 {
                        write_frames(&mut writer, &chunk[..n])?;
                        thread_frames.fetch_add(n as u64, Ordering::Relaxed);
                        continue;
                    }
                    match stop_rx.recv_timeout(WRITER_POLL) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                // The tap is already removed: drain what is left
                loop {
                    let n = consumer.pop_slice(&mut chunk);
                    if n == 0 {
                        break;
                    }
                    write_frames(&mut writer, &chunk[..n])?;
                    thread_frames.fetch_add(n as u64, Ordering::Relaxed);
                }

                writer.finalize()?;
                Ok(thread_frames.load(Ordering::Relaxed))
            })?;

        if self
            .bus
            .set_tap(Some(CaptureTap::new(producer, Arc::clone(&dropped))))
            .is_some()
        {
            warn!("Replaced a capture tap that was not owned by this recorder");
        }

        info!("Recording started: {}", path.display());
        *active = Some(ActiveRecording {
            path,
            stop_tx,
            writer: handle,
            frames_written,
            dropped,
        });
        Ok(())
    }

    /// Finalize the capture and return its path, or `None` if idle
    pub fn stop(&self) -> RecordingResult<Option<PathBuf>> {
        let Some(recording) = self.active.lock().take() else {
            return Ok(None);
        };

        // Detach first so the writer's final drain sees every sample
        self.bus.set_tap(None);
        let _ = recording.stop_tx.send(());

        let frames = recording
            .writer
            .join()
            .map_err(|_| RecordingError::WriterPanicked)??;

        let dropped = recording.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("Recording dropped {} samples (writer too slow)", dropped);
        }
        info!(
            "Recording stopped: {} ({} frames)",
            recording.path.display(),
            frames
        );
        Ok(Some(recording.path))
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Recording could not be finalized: {}", e);
        }
    }
}

/// Build a take file name in `dir`: `take_YYYYmmdd_HHMMSS.wav`
pub fn temp_take_path(dir: impl AsRef<Path>) -> PathBuf {
    let name = Local::now().format("take_%Y%m%d_%H%M%S").to_string();
    dir.as_ref().join(format!("{}.wav", name))
}

fn write_frames<W>(writer: &mut WavWriter<W>, frames: &[f32]) -> RecordingResult<()>
where
    W: std::io::Write + std::io::Seek,
{
    for &sample in frames {
        let value = f32_to_i16(sample);
        for _ in 0..RECORDING_CHANNELS {
            writer.write_sample(value)?;
        }
    }
    Ok(())
}
