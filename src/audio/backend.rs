// Audio back-end - Explicit output context for the voices
//
// Owns the mix bus and, when a device is available, the CPAL output stream
// that pulls from it. Created once per session and handed to the voice
// registry; `close()` tears the device connection down.
//
// # Stream thread
//
// `cpal::Stream` is not `Send` on every platform (CoreAudio). The stream is
// therefore built, played and dropped on a dedicated thread that parks until
// `close()`. The back-end itself only holds a channel and a join handle, so it
// can be moved into the sequencer clock and shared across threads.
//
// # Format Support
//
// The device's preferred sample format is used (F32, I16 or U16). The bus
// renders f32 internally; conversion happens when writing the interleaved
// output buffer.

use crate::audio::format_conversion::write_mono_to_interleaved_frame;
use crate::audio::mix_bus::MixBus;
use crate::audio::status::{AtomicDeviceStatus, DeviceStatus};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

/// Audio back-end errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Audio configuration error: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    BuildStream(String),

    #[error("Failed to start output stream: {0}")]
    PlayStream(String),

    #[error("Audio thread error: {0}")]
    Thread(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

struct StreamThread {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Output context: mix bus plus optional device stream
pub struct AudioBackend {
    bus: Arc<MixBus>,
    status: AtomicDeviceStatus,
    device_name: Option<String>,
    stream_thread: Option<StreamThread>,
}

impl AudioBackend {
    /// Back-end without a device; the caller renders the bus itself
    ///
    /// Used for tests, offline rendering, and as the fallback when no output
    /// device can be opened.
    pub fn headless(sample_rate: u32, master_volume: f32) -> Self {
        Self {
            bus: Arc::new(MixBus::new(sample_rate, master_volume)),
            status: AtomicDeviceStatus::new(DeviceStatus::Headless),
            device_name: None,
            stream_thread: None,
        }
    }

    /// Open the default output device and start pulling from the bus
    pub fn open_default(master_volume: f32) -> BackendResult<Self> {
        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_status = status.clone();
        let handle = thread::Builder::new()
            .name("pulsegrid-audio".to_string())
            .spawn(move || {
                run_stream_thread(master_volume, thread_status, ready_tx, shutdown_rx)
            })
            .map_err(|e| BackendError::Thread(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| BackendError::Thread("audio thread exited during startup".to_string()))?;

        match ready {
            Ok((bus, device_name)) => {
                info!(
                    "Audio back-end opened on '{}' at {} Hz",
                    device_name,
                    bus.sample_rate()
                );
                Ok(Self {
                    bus,
                    status,
                    device_name: Some(device_name),
                    stream_thread: Some(StreamThread {
                        shutdown_tx,
                        handle,
                    }),
                })
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    /// Open the default device, falling back to headless on failure
    pub fn open_or_headless(sample_rate: u32, master_volume: f32) -> Self {
        match Self::open_default(master_volume) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Audio device unavailable ({}), running headless", e);
                Self::headless(sample_rate, master_volume)
            }
        }
    }

    pub fn bus(&self) -> &Arc<MixBus> {
        &self.bus
    }

    pub fn sample_rate(&self) -> u32 {
        self.bus.sample_rate()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn is_headless(&self) -> bool {
        self.stream_thread.is_none() && self.status.get() == DeviceStatus::Headless
    }

    /// Stop the device stream and release it
    ///
    /// Safe to call more than once. The bus stays usable (headless) so late
    /// renders or captures do not fail.
    pub fn close(&mut self) -> BackendResult<()> {
        let Some(stream_thread) = self.stream_thread.take() else {
            return Ok(());
        };

        // The thread also exits if the sender is simply dropped
        let _ = stream_thread.shutdown_tx.send(());
        let joined = stream_thread.handle.join();
        self.status.set(DeviceStatus::Disconnected);
        info!("Audio back-end closed");

        joined.map_err(|_| BackendError::Thread("audio thread panicked".to_string()))
    }
}

impl Drop for AudioBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Audio back-end close failed: {}", e);
        }
    }
}

type ReadyMessage = BackendResult<(Arc<MixBus>, String)>;

fn run_stream_thread(
    master_volume: f32,
    status: AtomicDeviceStatus,
    ready_tx: Sender<ReadyMessage>,
    shutdown_rx: Receiver<()>,
) {
    let stream = match open_stream(master_volume, &status) {
        Ok((stream, bus, name)) => {
            let _ = ready_tx.send(Ok((bus, name)));
            stream
        }
        Err(e) => {
            status.set(DeviceStatus::Error);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Park until close() (message or dropped sender)
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn open_stream(
    master_volume: f32,
    status: &AtomicDeviceStatus,
) -> BackendResult<(Stream, Arc<MixBus>, String)> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(BackendError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported_config = device
        .default_output_config()
        .map_err(|e| BackendError::Config(e.to_string()))?;

    let sample_format = supported_config.sample_format();
    let sample_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels() as usize;
    let config: StreamConfig = supported_config.into();

    let bus = Arc::new(MixBus::new(sample_rate, master_volume));

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, &bus, status),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, &bus, status),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, &bus, status),
        other => Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| BackendError::PlayStream(e.to_string()))?;
    status.set(DeviceStatus::Connected);

    Ok((stream, bus, device_name))
}

/// Build an output stream for any sample type (f32, i16, u16)
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    bus: &Arc<MixBus>,
    status: &AtomicDeviceStatus,
) -> BackendResult<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let bus = Arc::clone(bus);
    let error_status = status.clone();
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                // Grows once to the device block size, then stays
                if scratch.len() < frames {
                    scratch.resize(frames, 0.0);
                }
                let block = &mut scratch[..frames];
                bus.render(block);

                for (frame, &sample) in data.chunks_mut(channels.max(1)).zip(block.iter()) {
                    write_mono_to_interleaved_frame(sample, frame);
                }
            },
            move |err| {
                // Runs outside the audio callback, logging is fine here
                warn!("Audio stream error: {}", err);
                error_status.set(DeviceStatus::Error);
            },
            None,
        )
        .map_err(|e| BackendError::BuildStream(e.to_string()))
}
