use bidsrun_core::{Error, Result};

/// Channels × time block where every channel has the same length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBlock {
    channels: Vec<Vec<f64>>,
}

impl SampleBlock {
    pub fn new(channels: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = channels.first() {
            let len = first.len();
            if let Some(bad) = channels.iter().position(|c| c.len() != len) {
                return Err(Error::configuration(format!(
                    "ragged sample block: channel {bad} has {} samples, channel 0 has {len}",
                    channels[bad].len()
                )));
            }
        }
        Ok(Self { channels })
    }

    pub fn empty(n_channels: usize) -> Self {
        Self {
            channels: vec![Vec::new(); n_channels],
        }
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of the trailing (time) dimension.
    pub fn n_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f64>> {
        self.channels
    }
}

/// One device read: either a rectangular block (shared sampling rate) or
/// one sample vector per channel (per-channel sampling rates).
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Block(SampleBlock),
    PerChannel(Vec<Vec<f64>>),
}

impl Samples {
    pub fn n_channels(&self) -> usize {
        match self {
            Samples::Block(block) => block.n_channels(),
            Samples::PerChannel(channels) => channels.len(),
        }
    }

    /// Samples along the time axis of the first channel, which is the one
    /// the run clock is keyed to.
    pub fn n_samples(&self) -> usize {
        match self {
            Samples::Block(block) => block.n_samples(),
            Samples::PerChannel(channels) => channels.first().map_or(0, Vec::len),
        }
    }

    pub fn channel_lens(&self) -> Vec<usize> {
        match self {
            Samples::Block(block) => vec![block.n_samples(); block.n_channels()],
            Samples::PerChannel(channels) => channels.iter().map(Vec::len).collect(),
        }
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        match self {
            Samples::Block(block) => block.channels(),
            Samples::PerChannel(channels) => channels,
        }
    }
}

impl From<SampleBlock> for Samples {
    fn from(block: SampleBlock) -> Self {
        Samples::Block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_blocks_are_rejected() {
        assert!(SampleBlock::new(vec![vec![1.0, 2.0], vec![1.0]]).is_err());
        let block = SampleBlock::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(block.n_channels(), 2);
        assert_eq!(block.n_samples(), 2);
    }

    #[test]
    fn per_channel_counts_follow_first_channel() {
        let samples = Samples::PerChannel(vec![vec![0.0; 4], vec![0.0; 2]]);
        assert_eq!(samples.n_samples(), 4);
        assert_eq!(samples.channel_lens(), vec![4, 2]);
        assert_eq!(Samples::Block(SampleBlock::empty(3)).n_samples(), 0);
    }
}
