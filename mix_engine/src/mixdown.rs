use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::config::{ConfigError, MixConfig};
use crate::mixer::{Mixer, PeakTracker};
use crate::normalize::{normalize_file, NormalizeError, Normalization};
use crate::sink::{OutputFormat, OutputSink, SinkError};
use crate::source::{BlockSource, SourceError, WavSource};
use crate::Frames;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Mixing,
    Normalizing,
    Done,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Mixing => "mixing",
            Stage::Normalizing => "normalizing",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MixError {
    #[error("expected at least {required} input file(s), got {found}")]
    NotEnoughInputs {
        found: usize,
        required: usize,
    },

    #[error("missing input files: {}", join_paths(.0))]
    MissingFiles(Vec<PathBuf>),

    #[error("output file {} is also an input", .0.display())]
    OutputIsInput(PathBuf),

    #[error("input files have different sample rates ({}), resampling is not supported", join_rates(.0))]
    MixedSampleRates(BTreeSet<u32>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl MixError {
    /// True for errors caused by how the tool was invoked rather than by file contents or I/O.
    pub fn is_usage(&self) -> bool {
        matches!(self, MixError::NotEnoughInputs { .. } | MixError::OutputIsInput(_))
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths.iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_rates(rates: &BTreeSet<u32>) -> String {
    rates.iter()
        .map(|r| format!("{} Hz", r))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixReport {
    pub output: PathBuf,
    pub sample_rate: u32,
    pub frames: Frames,
    /// Peak of the mix before normalization.
    pub peak: PeakTracker,
    pub normalization: Normalization,
}

/// One mixdown run: validate the inputs, mix them to a stereo file, then optionally normalize.
pub struct Mixdown {
    config: MixConfig,
    output: PathBuf,
    inputs: Vec<PathBuf>,
    target_db: Option<f32>,
    stage: Stage,
}

impl Mixdown {
    pub fn new(output: impl Into<PathBuf>, inputs: Vec<PathBuf>, config: MixConfig) -> Self {
        Self {
            config,
            output: output.into(),
            inputs,
            target_db: None,
            stage: Stage::Validating,
        }
    }

    /// Requests peak normalization to `target_db` after mixing.
    pub fn normalize_to(mut self, target_db: f32) -> Self {
        self.target_db = Some(target_db);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(&mut self) -> Result<MixReport, MixError> {
        let result = self.run_stages();
        if let Err(e) = &result {
            log::error!("mixdown aborted while {}: {}", self.stage, e);
            self.stage = Stage::Aborted;
        }

        result
    }

    fn enter(&mut self, stage: Stage) {
        if self.stage != stage {
            log::info!("{} -> {}", self.stage, stage);
        }
        self.stage = stage;
    }

    fn run_stages(&mut self) -> Result<MixReport, MixError> {
        self.enter(Stage::Validating);
        let sources = self.validate()?;

        self.enter(Stage::Mixing);
        let sample_rate = sources[0].sample_rate();
        let (frames, peak) = self.mix(sources, sample_rate)?;
        log::info!("peak level {:.1} dB", peak.db());

        let normalization = match self.target_db {
            Some(target_db) => {
                self.enter(Stage::Normalizing);
                normalize_file(&self.output, target_db, peak, &self.config)?
            }
            None => Normalization::NotRequested,
        };

        self.enter(Stage::Done);
        Ok(MixReport {
            output: self.output.clone(),
            sample_rate,
            frames,
            peak,
            normalization,
        })
    }

    /// Checks the input list and opens every source. All sources are closed again if any check
    /// fails.
    fn validate(&self) -> Result<Vec<WavSource>, MixError> {
        self.config.validate()?;

        let required = self.config.required_inputs(self.target_db.is_some());
        if self.inputs.is_empty() || self.inputs.len() < required {
            return Err(MixError::NotEnoughInputs { found: self.inputs.len(), required });
        }

        let missing: Vec<PathBuf> = self.inputs.iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(MixError::MissingFiles(missing));
        }

        // Creating the output would truncate an input that is still being read.
        if let Ok(output) = self.output.canonicalize() {
            let clash = self.inputs.iter()
                .any(|p| p.canonicalize().map_or(false, |p| p == output));
            if clash {
                return Err(MixError::OutputIsInput(self.output.clone()));
            }
        }

        let sources = self.inputs.iter()
            .map(|p| WavSource::open(p, self.config.chunk_frames))
            .collect::<Result<Vec<_>, _>>()?;

        let rates: BTreeSet<u32> = sources.iter().map(|s| s.sample_rate()).collect();
        if rates.len() > 1 {
            return Err(MixError::MixedSampleRates(rates));
        }

        Ok(sources)
    }

    fn mix(&self, sources: Vec<WavSource>, sample_rate: u32) -> Result<(Frames, PeakTracker), MixError> {
        log::info!(
            "mixing {} sources at {} Hz into {}",
            sources.len(),
            sample_rate,
            self.output.display()
        );

        // Normalization measures and rescales the unclamped sums, so it needs a float mix.
        let format = match self.target_db {
            Some(_) => OutputFormat::Float,
            None => self.config.output_format,
        };

        let mut sink = OutputSink::create(&self.output, sample_rate, format)?;
        let mut mixer = Mixer::new(sources, self.config.chunk_frames);
        let peak = mixer.run(|window| sink.write_window(window).map_err(MixError::from))?;
        let frames = sink.finalize()?;

        Ok((frames, peak))
    }
}
