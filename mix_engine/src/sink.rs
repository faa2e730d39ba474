use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use dasp::sample::types::I24;
use dasp::Sample;
use serde::{Deserialize, Serialize};

use crate::mixer::MixWindow;
use crate::Frames;

pub const OUTPUT_CHANNELS: u16 = 2;

/// Sample encoding of the stereo output file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 32-bit IEEE float. Samples above full scale survive until normalization.
    #[default]
    Float,
    Pcm16,
    Pcm24,
}

impl OutputFormat {
    fn wav_spec(self, sample_rate: u32) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            OutputFormat::Float => (32, hound::SampleFormat::Float),
            OutputFormat::Pcm16 => (16, hound::SampleFormat::Int),
            OutputFormat::Pcm24 => (24, hound::SampleFormat::Int),
        };

        hound::WavSpec {
            channels: OUTPUT_CHANNELS,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "f32" => Ok(OutputFormat::Float),
            "pcm16" | "s16" => Ok(OutputFormat::Pcm16),
            "pcm24" | "s24" => Ok(OutputFormat::Pcm24),
            other => Err(format!("unknown output format '{}' (expected float, pcm16 or pcm24)", other)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("failed to finalize {}: {source}", path.display())]
    Finalize {
        path: PathBuf,
        source: hound::Error,
    },
}

/// Stereo WAV writer. Call [`OutputSink::finalize`] to flush the header; a sink that is
/// dropped instead leaves a file that may not be readable.
pub struct OutputSink {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
    format: OutputFormat,
    frames_written: Frames,
}

impl OutputSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, format: OutputFormat) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let writer = hound::WavWriter::create(&path, format.wav_spec(sample_rate))
            .map_err(|e| SinkError::Create { path: path.clone(), source: e })?;

        Ok(Self {
            path,
            writer,
            format,
            frames_written: 0,
        })
    }

    /// Writes the covered frames of `window`.
    pub fn write_window(&mut self, window: &MixWindow) -> Result<(), SinkError> {
        let (left, right) = window.covered();
        self.write_frames(left, right)
    }

    /// Writes planar stereo frames, interleaved left/right.
    pub fn write_frames(&mut self, left: &[f32], right: &[f32]) -> Result<(), SinkError> {
        debug_assert_eq!(left.len(), right.len());

        for (l, r) in left.iter().zip(right) {
            self.write_sample(*l)?;
            self.write_sample(*r)?;
        }

        self.frames_written += left.len();
        Ok(())
    }

    fn write_sample(&mut self, sample: f32) -> Result<(), SinkError> {
        let result = match self.format {
            OutputFormat::Float => self.writer.write_sample(sample),
            OutputFormat::Pcm16 => self.writer.write_sample(sample.clamp(-1.0, 1.0).to_sample::<i16>()),
            OutputFormat::Pcm24 => self.writer.write_sample(sample.clamp(-1.0, 1.0).to_sample::<I24>().inner()),
        };

        result.map_err(|e| SinkError::Write { path: self.path.clone(), source: e })
    }

    pub fn finalize(self) -> Result<Frames, SinkError> {
        let Self { path, writer, frames_written, .. } = self;
        writer.finalize()
            .map_err(|e| SinkError::Finalize { path: path.clone(), source: e })?;

        log::debug!("finalized {} ({} frames)", path.display(), frames_written);
        Ok(frames_written)
    }
}
