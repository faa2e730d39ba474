//! Peak normalization of an already written mixdown.
//!
//! The gain depends on the peak of the whole signal, so normalization runs as a second pass:
//! the mixed file is moved aside, streamed back block by block, scaled, and written to the
//! original path. The moved file is only deleted once the new one is finalized.

use std::{fs, io};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::config::MixConfig;
use crate::decibel::{db_to_linear, linear_to_db};
use crate::mixer::PeakTracker;
use crate::sink::{OutputFormat, OutputSink, SinkError};
use crate::source::{BlockSource, SourceError, WavSource};

/// What the normalization step did to the output file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    NotRequested,

    /// The mixed peak was below the configured threshold; the file keeps the mixed levels.
    SkippedLowSignal {
        peak: f32,
        threshold: f32,
    },

    Applied {
        target_db: f32,
        gain: f32,
        peak: PeakTracker,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum NormalizeError {
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Stash {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("{source} (unnormalized mix kept at {})", temp.display())]
    Source {
        temp: PathBuf,
        source: SourceError,
    },

    #[error("{source} (unnormalized mix kept at {})", temp.display())]
    Sink {
        temp: PathBuf,
        source: SinkError,
    },

    #[error("normalized output was written but {} could not be removed: {source}", temp.display())]
    Cleanup {
        temp: PathBuf,
        source: io::Error,
    },
}

impl NormalizeError {
    /// Path of the moved-aside mixdown, if it still exists.
    pub fn temp_path(&self) -> Option<&Path> {
        match self {
            NormalizeError::Stash { .. } => None,
            NormalizeError::Source { temp, .. }
            | NormalizeError::Sink { temp, .. }
            | NormalizeError::Cleanup { temp, .. } => Some(temp),
        }
    }
}

/// Linear multiplier that brings `peak` to `target_db`.
pub fn gain_for(target_db: f32, peak: f32) -> f32 {
    db_to_linear(target_db) / peak
}

/// Picks an unused `<stem>-tmp-<NNNNNNN>.<ext>` path next to `output`.
pub fn temp_path(output: &Path) -> PathBuf {
    let mut rng = rand::rng();
    loop {
        let candidate = temp_path_with(output, rng.random_range(1_000_000..10_000_000));
        if !candidate.exists() {
            return candidate;
        }
    }
}

fn temp_path_with(output: &Path, suffix: u32) -> PathBuf {
    let stem = output.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = format!("{}-tmp-{:07}", stem, suffix);
    if let Some(ext) = output.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    output.with_file_name(name)
}

/// Rescales the file at `output` in place so its peak lands on `target_db`, writing it in the
/// configured output format.
///
/// `output` must be the 32-bit float mix and `peak` the peak measured while it was written.
pub fn normalize_file(
    output: &Path,
    target_db: f32,
    peak: PeakTracker,
    config: &MixConfig,
) -> Result<Normalization, NormalizeError> {
    if peak.linear() < config.min_normalize_peak {
        log::warn!(
            "peak of {:.1} dB is below {:.1} dB, not normalizing {}",
            peak.db(),
            linear_to_db(config.min_normalize_peak),
            output.display()
        );

        if config.output_format != OutputFormat::Float {
            rewrite(output, 1.0, config)?;
        }

        return Ok(Normalization::SkippedLowSignal {
            peak: peak.linear(),
            threshold: config.min_normalize_peak,
        });
    }

    let gain = gain_for(target_db, peak.linear());
    log::info!("normalizing to {:.1} dB with gain {:.4}", target_db, gain);
    let new_peak = rewrite(output, gain, config)?;

    Ok(Normalization::Applied {
        target_db,
        gain,
        peak: new_peak,
    })
}

/// Moves `output` aside, writes it back scaled by `gain`, then removes the moved file.
fn rewrite(output: &Path, gain: f32, config: &MixConfig) -> Result<PeakTracker, NormalizeError> {
    let temp = temp_path(output);

    fs::rename(output, &temp)
        .map_err(|e| NormalizeError::Stash {
            from: output.to_path_buf(),
            to: temp.clone(),
            source: e,
        })?;

    let peak = rescale(&temp, output, gain, config)?;

    fs::remove_file(&temp)
        .map_err(|e| NormalizeError::Cleanup { temp: temp.clone(), source: e })?;

    Ok(peak)
}

fn rescale(temp: &Path, output: &Path, gain: f32, config: &MixConfig) -> Result<PeakTracker, NormalizeError> {
    let source_error = |e| NormalizeError::Source { temp: temp.to_path_buf(), source: e };
    let sink_error = |e| NormalizeError::Sink { temp: temp.to_path_buf(), source: e };

    let mut source = WavSource::open(temp, config.chunk_frames).map_err(source_error)?;
    let mut sink = OutputSink::create(output, source.sample_rate(), config.output_format)
        .map_err(sink_error)?;
    let mut peak = PeakTracker::new();

    for block in source.blocks() {
        let mut block = block.map_err(source_error)?;
        block.scale(gain);
        peak.observe(block.peak());

        let right = block.channel_count() - 1;
        sink.write_frames(block.channel(0), block.channel(right))
            .map_err(sink_error)?;
    }

    drop(source);
    sink.finalize().map_err(sink_error)?;
    Ok(peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo(path: &Path, left: &[f32], right: &[f32]) {
        let mut sink = OutputSink::create(path, 44100, OutputFormat::Float).unwrap();
        sink.write_frames(left, right).unwrap();
        sink.finalize().unwrap();
    }

    fn read_all(path: &Path) -> Vec<f32> {
        hound::WavReader::open(path).unwrap()
            .samples::<f32>()
            .map(|s| s.unwrap())
            .collect()
    }

    fn peak_of(samples: &[f32]) -> PeakTracker {
        let mut peak = PeakTracker::new();
        samples.iter().for_each(|s| peak.observe(s.abs()));
        peak
    }

    #[test]
    fn test_gain() {
        let gain = gain_for(-6.0, 0.5);
        assert!((gain - 1.002374).abs() < 1e-4, "gain was {}", gain);
    }

    #[test]
    fn test_temp_path_shape() {
        let path = temp_path_with(Path::new("/tmp/mixes/final.wav"), 42);
        assert_eq!(path, PathBuf::from("/tmp/mixes/final-tmp-0000042.wav"));

        let path = temp_path_with(Path::new("bare"), 1234567);
        assert_eq!(path, PathBuf::from("bare-tmp-1234567"));
    }

    #[test]
    fn test_temp_path_is_random_and_unused() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");

        let path = temp_path(&output);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("out-tmp-"));
        assert!(name.ends_with(".wav"));
        let digits = &name["out-tmp-".len()..name.len() - ".wav".len()];
        assert_eq!(digits.len(), 7);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
        assert!(!path.exists());
    }

    #[test]
    fn test_normalize_scales_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("mix.wav");
        let left = [0.5f32, -0.25, 0.125, 0.0];
        let right = [-0.1f32, 0.3, -0.5, 0.2];
        write_stereo(&output, &left, &right);
        let before = read_all(&output);

        let config = MixConfig { chunk_frames: 3, ..MixConfig::default() };
        let outcome = normalize_file(&output, -6.0, peak_of(&before), &config).unwrap();

        let gain = match outcome {
            Normalization::Applied { gain, peak, .. } => {
                assert!((peak.linear() - db_to_linear(-6.0)).abs() < 1e-5);
                gain
            }
            other => panic!("expected normalization, got {:?}", other),
        };

        let after = read_all(&output);
        assert_eq!(after.len(), before.len());
        for (a, b) in after.iter().zip(&before) {
            assert!((a - b * gain).abs() < 1e-6);
        }

        // Only the normalized output is left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_low_signal_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("quiet.wav");
        write_stereo(&output, &[0.01, -0.02], &[0.005, 0.0]);
        let before = fs::read(&output).unwrap();

        let outcome = normalize_file(&output, -3.0, peak_of(&[0.02]), &MixConfig::default()).unwrap();
        assert_eq!(outcome, Normalization::SkippedLowSignal { peak: 0.02, threshold: 0.03 });
        assert_eq!(fs::read(&output).unwrap(), before);
    }

    #[test]
    fn test_low_signal_still_converts_to_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("quiet.wav");
        write_stereo(&output, &[0.01, -0.02], &[0.005, 0.0]);

        let config = MixConfig { output_format: OutputFormat::Pcm16, ..MixConfig::default() };
        let outcome = normalize_file(&output, -3.0, peak_of(&[0.02]), &config).unwrap();
        assert!(matches!(outcome, Normalization::SkippedLowSignal { .. }));

        let mut reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected = [0.01f32, 0.005, -0.02, 0.0];
        assert_eq!(samples.len(), expected.len());
        for (s, e) in samples.iter().zip(&expected) {
            assert!((*s as f32 / 32768.0 - e).abs() < 1e-4, "{} vs {}", s, e);
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unreadable_temp_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("broken.wav");
        fs::write(&output, "not audio").unwrap();

        let err = normalize_file(&output, -1.0, peak_of(&[0.5]), &MixConfig::default()).unwrap_err();
        let temp = err.temp_path().unwrap().to_path_buf();
        assert!(matches!(err, NormalizeError::Source { .. }));
        assert!(temp.exists());
        assert_eq!(fs::read_to_string(&temp).unwrap(), "not audio");
    }

    #[test]
    fn test_missing_output_fails_to_stash() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gone.wav");

        let err = normalize_file(&output, -1.0, peak_of(&[0.5]), &MixConfig::default()).unwrap_err();
        assert!(matches!(err, NormalizeError::Stash { .. }));
        assert!(err.temp_path().is_none());
    }
}
