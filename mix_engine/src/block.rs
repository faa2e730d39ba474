use crate::Frames;

/// A planar chunk of multi-channel f32 audio, one `Vec` per channel.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    channels: Vec<Vec<f32>>,
}

impl SampleBlock {
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(!channels.is_empty());
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));

        Self { channels }
    }

    /// Splits interleaved samples into a planar block. A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channel_count: usize) -> Self {
        debug_assert!(channel_count > 0);

        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> Frames {
        self.channels[0].len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn scale(&mut self, gain: f32) {
        self.channels
            .iter_mut()
            .flat_map(|c| c.iter_mut())
            .for_each(|s| *s *= gain);
    }
}
