use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use dasp::sample::types::I24;
use dasp::Sample;
use hound::SampleFormat;

use crate::block::SampleBlock;
use crate::Frames;

/// A finite stream of audio read one block at a time.
///
/// Channel count and sample rate are fixed for the lifetime of the source. `next_block` returns
/// `Ok(None)` once the stream is exhausted; only the final block may be shorter than the
/// source's chunk size.
pub trait BlockSource {
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    fn next_block(&mut self) -> Result<Option<SampleBlock>, SourceError>;

    fn blocks(&mut self) -> Blocks<'_, Self>
        where
            Self: Sized,
    {
        Blocks { source: self }
    }
}

pub struct Blocks<'a, S> {
    source: &'a mut S,
}

impl<'a, S: BlockSource> Iterator for Blocks<'a, S> {
    type Item = Result<SampleBlock, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next_block().transpose()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to open audio file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("failed to read audio file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("{} has {channels} channels, only mono and stereo are supported", path.display())]
    UnsupportedChannels {
        path: PathBuf,
        channels: u16,
    },

    #[error("{} uses an unsupported sample format: {bits_per_sample}-bit {sample_format:?}", path.display())]
    UnsupportedFormat {
        path: PathBuf,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Float,
    Int(u16),
}

/// Streams a WAV file as normalized f32 blocks of at most `chunk_frames` frames.
///
/// The file handle is held until the source is dropped.
pub struct WavSource {
    path: PathBuf,
    reader: hound::WavReader<BufReader<File>>,
    encoding: Encoding,
    channels: u16,
    sample_rate: u32,
    chunk_frames: Frames,
    samples_left: usize,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, chunk_frames: Frames) -> Result<Self, SourceError> {
        debug_assert!(chunk_frames > 0);

        let path = path.as_ref().to_path_buf();
        let reader = hound::WavReader::open(&path)
            .map_err(|e| SourceError::Open { path: path.clone(), source: e })?;
        let spec = reader.spec();

        if !(1..=2).contains(&spec.channels) {
            return Err(SourceError::UnsupportedChannels { path, channels: spec.channels });
        }

        let encoding = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => Encoding::Float,
            (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => Encoding::Int(bits),
            (sample_format, bits_per_sample) => {
                return Err(SourceError::UnsupportedFormat { path, sample_format, bits_per_sample });
            }
        };

        let samples_left = reader.len() as usize;
        log::debug!(
            "opened {}: {} ch, {} Hz, {} frames",
            path.display(),
            spec.channels,
            spec.sample_rate,
            reader.duration()
        );

        Ok(Self {
            path,
            reader,
            encoding,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            chunk_frames,
            samples_left,
        })
    }
}

impl BlockSource for WavSource {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_block(&mut self) -> Result<Option<SampleBlock>, SourceError> {
        let wanted = (self.chunk_frames * self.channels as usize).min(self.samples_left);
        if wanted == 0 {
            return Ok(None);
        }

        let path = &self.path;
        let read_error = |e| SourceError::Read { path: path.clone(), source: e };
        let mut interleaved = Vec::with_capacity(wanted);

        match self.encoding {
            Encoding::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    interleaved.push(sample.map_err(read_error)?);
                }
            }
            Encoding::Int(bits) => {
                for sample in self.reader.samples::<i32>().take(wanted) {
                    interleaved.push(int_to_f32(sample.map_err(read_error)?, bits));
                }
            }
        }

        self.samples_left -= wanted;
        Ok(Some(SampleBlock::from_interleaved(&interleaved, self.channels as usize)))
    }
}

fn int_to_f32(sample: i32, bits: u16) -> f32 {
    match bits {
        8 => (sample as i8).to_sample::<f32>(),
        16 => (sample as i16).to_sample::<f32>(),
        24 => I24::new_unchecked(sample).to_sample::<f32>(),
        _ => sample.to_sample::<f32>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn pcm16(channels: u16) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_chunking_with_short_final_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..10).map(|i| i * 1000).collect();
        write_wav(&path, pcm16(1), &samples);

        let mut source = WavSource::open(&path, 4).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 44100);

        let frames: Vec<Frames> = source.blocks().map(|b| b.unwrap().frames()).collect();
        assert_eq!(frames, vec![4, 4, 2]);
        assert!(source.next_block().unwrap().is_none());
    }

    #[test]
    fn test_stereo_deinterleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, pcm16(2), &[16384, -16384, 8192, -8192]);

        let mut source = WavSource::open(&path, 16).unwrap();
        let block = source.next_block().unwrap().unwrap();
        assert_eq!(block.frames(), 2);
        assert_eq!(block.channel(0), &[0.5, 0.25]);
        assert_eq!(block.channel(1), &[-0.5, -0.25]);
    }

    #[test]
    fn test_float_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0.75f32, -0.125] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path, 8).unwrap();
        assert_eq!(source.sample_rate(), 48000);
        assert_eq!(source.next_block().unwrap().unwrap().channel(0), &[0.75, -0.125]);
    }

    #[test]
    fn test_rejects_multichannel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.wav");
        write_wav(&path, pcm16(4), &[0; 8]);

        match WavSource::open(&path, 8) {
            Err(SourceError::UnsupportedChannels { channels, .. }) => assert_eq!(channels, 4),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("four channel file was accepted"),
        }
    }

    #[test]
    fn test_truncated_data_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        write_wav(&path, pcm16(1), &[1000; 100]);

        // The header still promises 100 samples.
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let size = file.metadata().unwrap().len();
        file.set_len(size - 50).unwrap();
        drop(file);

        let mut source = WavSource::open(&path, 256).unwrap();
        match source.next_block() {
            Err(SourceError::Read { path: p, .. }) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("truncated file read without error"),
        }
    }

    #[test]
    fn test_open_not_a_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.wav");
        std::fs::write(&path, "definitely not RIFF").unwrap();

        assert!(matches!(WavSource::open(&path, 8), Err(SourceError::Open { .. })));
    }

    #[test]
    fn test_int_conversion() {
        assert_eq!(int_to_f32(-32768, 16), -1.0);
        assert_eq!(int_to_f32(-128, 8), -1.0);
        assert_eq!(int_to_f32(-8388608, 24), -1.0);
        assert_eq!(int_to_f32(4194304, 24), 0.5);
    }
}
