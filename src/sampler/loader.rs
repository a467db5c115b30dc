// Sample loader - Decode WAV/FLAC assets into mono f32 buffers

use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Sample not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),

    #[error("Sample is empty: {0}")]
    Empty(PathBuf),
}

pub type SampleResult<T> = Result<T, SampleError>;

/// A decoded one-shot, downmixed to mono
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub name: String,
    pub frames: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(name: impl Into<String>, frames: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            frames,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Natural playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.sample_rate as f64
    }
}

/// Load a WAV or FLAC file, picking the decoder from the extension
pub fn load_sample(path: &Path) -> SampleResult<SampleBuffer> {
    if !path.exists() {
        return Err(SampleError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    let buffer = match extension.as_str() {
        "wav" => load_wav(path)?,
        "flac" => load_flac(path)?,
        other => return Err(SampleError::UnsupportedFormat(other.to_string())),
    };

    if buffer.is_empty() {
        return Err(SampleError::Empty(path.to_path_buf()));
    }
    Ok(buffer)
}

fn sample_name(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn load_wav(path: &Path) -> SampleResult<SampleBuffer> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(SampleBuffer::new(
        sample_name(path),
        downmix(&interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

fn load_flac(path: &Path) -> SampleResult<SampleBuffer> {
    let mut reader = FlacReader::open(path)?;
    let info = reader.streaminfo();
    let scale = (1i64 << (info.bits_per_sample.max(1) - 1)) as f32;

    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<Result<_, _>>()?;

    Ok(SampleBuffer::new(
        sample_name(path),
        downmix(&interleaved, info.channels as usize),
        info.sample_rate,
    ))
}

/// Average interleaved channels into one
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
