//! Streaming stereo mixdown of WAV files with optional peak normalization.
//!
//! Inputs are read one block at a time, summed into a stereo window (mono inputs go to both
//! channels), and written out window by window, so memory use does not depend on file length.

mod block;
mod config;
mod decibel;
mod mixdown;
mod mixer;
mod normalize;
mod sink;
mod source;

pub use block::SampleBlock;
pub use config::{ConfigError, MixConfig};
pub use decibel::{db_to_linear, linear_to_db};
pub use mixdown::{MixError, MixReport, Mixdown, Stage};
pub use mixer::{MixWindow, Mixer, PeakTracker};
pub use normalize::{NormalizeError, Normalization};
pub use sink::{OutputFormat, OutputSink, SinkError};
pub use source::{BlockSource, Blocks, SourceError, WavSource};

type Frames = usize;
