use crate::block::SampleBlock;
use crate::decibel::linear_to_db;
use crate::source::{BlockSource, SourceError};
use crate::Frames;

/// A stereo accumulator for one chunk of output.
///
/// `frames` is the covered length: the longest block summed into the window so far.
#[derive(Debug, Clone)]
pub struct MixWindow {
    left: Vec<f32>,
    right: Vec<f32>,
    frames: Frames,
}

impl MixWindow {
    pub fn new(capacity: Frames) -> Self {
        Self {
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            frames: 0,
        }
    }

    pub fn capacity(&self) -> Frames {
        self.left.len()
    }

    pub fn frames(&self) -> Frames {
        self.frames
    }

    /// Sums `block` into the start of the window. Mono blocks are added to both channels.
    pub fn add_block(&mut self, block: &SampleBlock) {
        debug_assert!(block.frames() <= self.capacity());
        let n = block.frames().min(self.capacity());

        let (l_in, r_in) = match block.channel_count() {
            1 => (block.channel(0), block.channel(0)),
            _ => (block.channel(0), block.channel(1)),
        };

        for (out, s) in self.left[..n].iter_mut().zip(&l_in[..n]) {
            *out += s;
        }
        for (out, s) in self.right[..n].iter_mut().zip(&r_in[..n]) {
            *out += s;
        }

        self.frames = self.frames.max(n);
    }

    pub fn covered(&self) -> (&[f32], &[f32]) {
        (&self.left[..self.frames], &self.right[..self.frames])
    }

    pub fn peak(&self) -> f32 {
        let (left, right) = self.covered();
        left.iter()
            .chain(right)
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Running maximum of absolute sample values. Never decreases.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PeakTracker {
    peak: f32,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: f32) {
        if value > self.peak {
            self.peak = value;
        }
    }

    pub fn linear(&self) -> f32 {
        self.peak
    }

    pub fn db(&self) -> f32 {
        linear_to_db(self.peak)
    }
}

/// Pulls one block from every active source per window and sums them into stereo.
///
/// Exhausted sources are dropped from the active list as soon as they report the end of
/// their stream, which releases whatever they hold.
pub struct Mixer<S> {
    sources: Vec<S>,
    chunk_frames: Frames,
    peak: PeakTracker,
    windows: usize,
}

impl<S: BlockSource> Mixer<S> {
    pub fn new(sources: Vec<S>, chunk_frames: Frames) -> Self {
        debug_assert!(chunk_frames > 0);

        Self {
            sources,
            chunk_frames,
            peak: PeakTracker::new(),
            windows: 0,
        }
    }

    pub fn peak(&self) -> PeakTracker {
        self.peak
    }

    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Mixes the next window, or returns `None` once every source is exhausted.
    pub fn next_window(&mut self) -> Result<Option<MixWindow>, SourceError> {
        while !self.sources.is_empty() {
            let window = self.fill_window()?;
            if window.frames() > 0 {
                self.peak.observe(window.peak());
                self.windows += 1;
                log::debug!(
                    "window {}: {} frames from {} sources, peak {:.1} dB",
                    self.windows,
                    window.frames(),
                    self.sources.len(),
                    linear_to_db(window.peak())
                );
                return Ok(Some(window));
            }
        }

        Ok(None)
    }

    /// Mixes every remaining window, handing each one to `sink` in order.
    pub fn run<E>(&mut self, mut sink: impl FnMut(&MixWindow) -> Result<(), E>) -> Result<PeakTracker, E>
        where
            E: From<SourceError>,
    {
        while let Some(window) = self.next_window()? {
            sink(&window)?;
        }

        Ok(self.peak)
    }

    fn fill_window(&mut self) -> Result<MixWindow, SourceError> {
        let mut window = MixWindow::new(self.chunk_frames);

        let mut i = 0;
        while i < self.sources.len() {
            match self.sources[i].next_block()? {
                Some(block) => {
                    window.add_block(&block);
                    i += 1;
                }
                None => {
                    let exhausted = self.sources.remove(i);
                    log::debug!(
                        "source {} exhausted after {} windows, {} still active",
                        i,
                        self.windows,
                        self.sources.len()
                    );
                    drop(exhausted);
                }
            }
        }

        Ok(window)
    }
}
