use std::{fs, io};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError::{InvalidConfig, LoadConfigError, SaveConfigError};
use crate::sink::OutputFormat;
use crate::Frames;

/// 1 MiB frames per block, matching the size of one mixing window.
pub const DEFAULT_CHUNK_FRAMES: Frames = 1024 * 1024;

/// Peaks below this (about -30 dB) are too quiet to normalize meaningfully.
pub const DEFAULT_MIN_NORMALIZE_PEAK: f32 = 0.03;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub chunk_frames: Frames,

    /// Minimum number of input files for a plain mixdown.
    pub min_inputs: usize,

    /// Minimum number of input files when a normalization target is given. A single input is
    /// allowed so one file can be normalized on its own.
    pub min_inputs_normalizing: usize,

    pub min_normalize_peak: f32,
    pub output_format: OutputFormat,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("failed to deserialize mix config: {message} (line {line}, column {column})")]
    LoadConfigError {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("failed to serialize mix config: {message}")]
    SaveConfigError {
        message: String,
    },

    #[error("invalid mix config: {0}")]
    InvalidConfig(String),
}

impl Default for MixConfig {
    fn default() -> Self {
        MixConfig {
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            min_inputs: 2,
            min_inputs_normalizing: 1,
            min_normalize_peak: DEFAULT_MIN_NORMALIZE_PEAK,
            output_format: OutputFormat::Float,
        }
    }
}

impl MixConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let serialized = fs::read_to_string(path.as_ref())?;
        let config: MixConfig = serde_json::from_str(serialized.as_str())
            .map_err(|e| {
                LoadConfigError {
                    message: e.to_string(),
                    line: e.line(),
                    column: e.column(),
                }
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|e| {
                SaveConfigError {
                    message: e.to_string()
                }
            })?;

        fs::write(path.as_ref(), serialized)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_frames == 0 {
            return Err(InvalidConfig("chunk_frames must be at least 1".to_string()));
        }

        if self.min_inputs == 0 || self.min_inputs_normalizing == 0 {
            return Err(InvalidConfig("input minimums must be at least 1".to_string()));
        }

        if !self.min_normalize_peak.is_finite() || self.min_normalize_peak <= 0.0 {
            return Err(InvalidConfig(format!(
                "min_normalize_peak must be a positive number, got {}",
                self.min_normalize_peak
            )));
        }

        Ok(())
    }

    /// The number of inputs required for a run, depending on whether it normalizes.
    pub fn required_inputs(&self, normalizing: bool) -> usize {
        if normalizing {
            self.min_inputs_normalizing
        } else {
            self.min_inputs
        }
    }
}
