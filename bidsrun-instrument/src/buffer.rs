//! Accumulates device reads and hands them out in whole records.
//!
//! A sink only accepts records of exactly `sfreq * record_duration` samples
//! per channel, so reads are queued here until a record's worth is present.
//! Channels sampled at different rates form separate groups, each with its
//! own record length, and each group releases its records on its own
//! schedule. In a released record a group that has not yet filled a record
//! contributes no samples. After every drain no group holds a whole record,
//! so the final partial record is a single write.

use crate::samples::{SampleBlock, Samples};
use bidsrun_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplingRate {
    Shared(u32),
    PerChannel(Vec<u32>),
}

impl SamplingRate {
    /// Rate of the first channel, which drives the run clock.
    pub fn primary(&self) -> u32 {
        match self {
            SamplingRate::Shared(f) => *f,
            SamplingRate::PerChannel(fs) => fs.first().copied().unwrap_or(0),
        }
    }

    pub fn for_channel(&self, channel: usize) -> u32 {
        match self {
            SamplingRate::Shared(f) => *f,
            SamplingRate::PerChannel(fs) => fs.get(channel).copied().unwrap_or(0),
        }
    }

    pub fn validate(&self, n_channels: usize) -> Result<()> {
        match self {
            SamplingRate::Shared(0) => Err(Error::configuration("sampling frequency must be positive")),
            SamplingRate::Shared(_) => Ok(()),
            SamplingRate::PerChannel(fs) if fs.len() != n_channels => Err(Error::configuration(format!(
                "{} sampling frequencies supplied for {n_channels} channels",
                fs.len()
            ))),
            SamplingRate::PerChannel(fs) if fs.contains(&0) => {
                Err(Error::configuration("sampling frequency must be positive"))
            }
            SamplingRate::PerChannel(_) => Ok(()),
        }
    }
}

/// Samples per record for one channel group.
pub fn record_len(sfreq: u32, record_duration: f64) -> Result<usize> {
    if !(record_duration.is_finite() && record_duration > 0.0) {
        return Err(Error::configuration(format!(
            "record duration must be positive, got {record_duration}"
        )));
    }
    let exact = f64::from(sfreq) * record_duration;
    let rounded = exact.round();
    if rounded < 1.0 || (exact - rounded).abs() > 1e-6 {
        return Err(Error::configuration(format!(
            "{sfreq} Hz x {record_duration} s is not a whole number of samples per record"
        )));
    }
    Ok(rounded as usize)
}

#[derive(Debug, Clone)]
struct Group {
    channels: Vec<Vec<f64>>,
    record_len: usize,
}

impl Group {
    fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    fn drain(&mut self, n: usize) -> Vec<Vec<f64>> {
        let n = n.min(self.len());
        self.channels
            .iter_mut()
            .map(|c| c.drain(..n).collect())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RecordBuffer {
    shared: bool,
    groups: Vec<Group>,
}

impl RecordBuffer {
    pub fn new(rate: &SamplingRate, n_channels: usize, record_duration: f64) -> Result<Self> {
        if n_channels == 0 {
            return Err(Error::configuration("a recorder needs at least one channel"));
        }
        rate.validate(n_channels)?;
        let groups = match rate {
            SamplingRate::Shared(f) => vec![Group {
                channels: vec![Vec::new(); n_channels],
                record_len: record_len(*f, record_duration)?,
            }],
            SamplingRate::PerChannel(fs) => fs
                .iter()
                .map(|f| {
                    Ok(Group {
                        channels: vec![Vec::new()],
                        record_len: record_len(*f, record_duration)?,
                    })
                })
                .collect::<Result<_>>()?,
        };
        Ok(Self {
            shared: matches!(rate, SamplingRate::Shared(_)),
            groups,
        })
    }

    pub fn n_channels(&self) -> usize {
        self.groups.iter().map(|g| g.channels.len()).sum()
    }

    /// Buffered samples of the first group.
    pub fn len(&self) -> usize {
        self.groups.first().map_or(0, Group::len)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.len() == 0)
    }

    pub fn group_lens(&self) -> Vec<usize> {
        self.groups.iter().map(Group::len).collect()
    }

    pub fn record_lens(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.record_len).collect()
    }

    /// Appends one read. The read must have exactly the configured channels.
    pub fn push(&mut self, samples: &Samples) -> Result<()> {
        let expected = self.n_channels();
        if samples.n_channels() != expected {
            return Err(Error::ChannelMismatch {
                expected,
                actual: samples.n_channels(),
            });
        }
        match (self.shared, samples) {
            (true, Samples::Block(block)) => {
                for (buf, chan) in self.groups[0].channels.iter_mut().zip(block.channels()) {
                    buf.extend_from_slice(chan);
                }
            }
            (false, Samples::PerChannel(channels)) => {
                for (group, chan) in self.groups.iter_mut().zip(channels) {
                    group.channels[0].extend_from_slice(chan);
                }
            }
            (true, Samples::PerChannel(_)) => {
                return Err(Error::configuration(
                    "device returned per-channel samples for a shared-rate recorder",
                ));
            }
            (false, Samples::Block(_)) => {
                return Err(Error::configuration(
                    "device returned a shared-rate block for a per-channel recorder",
                ));
            }
        }
        Ok(())
    }

    /// Removes and returns the next whole record. Groups that have not
    /// filled a record contribute nothing to it.
    pub fn take_record(&mut self) -> Option<Samples> {
        if self.groups.iter().any(|g| g.len() >= g.record_len) {
            Some(self.take(|g| if g.len() >= g.record_len { g.record_len } else { 0 }))
        } else {
            None
        }
    }

    /// Removes whatever is left, up to one record per group.
    pub fn take_partial(&mut self) -> Option<Samples> {
        if self.is_empty() {
            None
        } else {
            Some(self.take(|g| g.record_len))
        }
    }

    /// Every whole record available, followed by the leftover partial
    /// record when `remainder` is set.
    pub fn drain_records(&mut self, remainder: bool) -> Vec<Samples> {
        let mut records = Vec::new();
        while let Some(record) = self.take_record() {
            records.push(record);
        }
        if remainder {
            records.extend(self.take_partial());
        }
        records
    }

    pub fn clear(&mut self) {
        for group in &mut self.groups {
            for chan in &mut group.channels {
                chan.clear();
            }
        }
    }

    fn take(&mut self, n: impl Fn(&Group) -> usize) -> Samples {
        if self.shared {
            let group = &mut self.groups[0];
            let count = n(group);
            Samples::Block(SampleBlock::new(group.drain(count)).unwrap_or_default())
        } else {
            Samples::PerChannel(
                self.groups
                    .iter_mut()
                    .map(|g| {
                        let count = n(g);
                        g.drain(count).into_iter().next().unwrap_or_default()
                    })
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n_channels: usize, n: usize, start: f64) -> Samples {
        let chan: Vec<f64> = (0..n).map(|i| start + i as f64).collect();
        Samples::Block(SampleBlock::new(vec![chan; n_channels]).unwrap())
    }

    #[test]
    fn record_length_must_be_whole() {
        assert_eq!(record_len(256, 1.0).unwrap(), 256);
        assert_eq!(record_len(10, 0.5).unwrap(), 5);
        assert!(record_len(10, 0.25).is_err());
        assert!(record_len(10, 0.0).is_err());
        assert!(record_len(10, f64::NAN).is_err());
    }

    #[test]
    fn rates_must_match_channels() {
        assert!(RecordBuffer::new(&SamplingRate::PerChannel(vec![10, 20]), 3, 1.0).is_err());
        assert!(RecordBuffer::new(&SamplingRate::Shared(0), 3, 1.0).is_err());
        assert!(RecordBuffer::new(&SamplingRate::Shared(10), 0, 1.0).is_err());
    }

    #[test]
    fn whole_records_leave_modulo_remainder() {
        let mut buf = RecordBuffer::new(&SamplingRate::Shared(10), 2, 1.0).unwrap();
        let mut total = 0;
        for step in [3, 3, 3, 3, 3, 7, 25] {
            buf.push(&block(2, step, 0.0)).unwrap();
            total += step;
            let before = buf.len();
            let records = buf.drain_records(false);
            assert_eq!(buf.len(), before % 10);
            assert_eq!(records.len(), before / 10);
            assert!(records.iter().all(|r| r.n_samples() == 10));
        }
        assert_eq!(buf.len(), total % 10);
    }

    #[test]
    fn remainder_flushes_everything_without_padding() {
        let mut buf = RecordBuffer::new(&SamplingRate::Shared(10), 1, 1.0).unwrap();
        buf.push(&block(1, 15, 0.0)).unwrap();
        let records = buf.drain_records(true);
        assert_eq!(
            records.iter().map(Samples::n_samples).collect::<Vec<_>>(),
            vec![10, 5]
        );
        assert_eq!(records[1].channels()[0], vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        assert!(buf.is_empty());
        assert!(buf.drain_records(true).is_empty());
    }

    #[test]
    fn channel_count_mismatch_fails_fast() {
        let mut buf = RecordBuffer::new(&SamplingRate::Shared(10), 2, 1.0).unwrap();
        let err = buf.push(&block(3, 4, 0.0)).unwrap_err();
        assert!(matches!(err, Error::ChannelMismatch { expected: 2, actual: 3 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn per_channel_groups_use_their_own_record_length() {
        let mut buf = RecordBuffer::new(&SamplingRate::PerChannel(vec![10, 4]), 2, 1.0).unwrap();
        assert_eq!(buf.record_lens(), vec![10, 4]);

        buf.push(&Samples::PerChannel(vec![vec![0.0; 6], vec![0.0; 3]])).unwrap();
        assert!(buf.take_record().is_none());

        buf.push(&Samples::PerChannel(vec![vec![0.0; 6], vec![0.0; 3]])).unwrap();
        let record = buf.take_record().unwrap();
        assert_eq!(record.channel_lens(), vec![10, 4]);
        assert_eq!(buf.group_lens(), vec![2, 2]);

        let tail = buf.take_partial().unwrap();
        assert_eq!(tail.channel_lens(), vec![2, 2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn per_channel_partial_flush_when_only_one_group_has_data() {
        let mut buf = RecordBuffer::new(&SamplingRate::PerChannel(vec![10, 4]), 2, 1.0).unwrap();
        buf.push(&Samples::PerChannel(vec![vec![1.0; 3], vec![]])).unwrap();
        let tail = buf.take_partial().unwrap();
        assert_eq!(tail.channel_lens(), vec![3, 0]);
    }

    #[test]
    fn leading_group_releases_records_without_waiting() {
        let mut buf = RecordBuffer::new(&SamplingRate::PerChannel(vec![10, 4]), 2, 1.0).unwrap();
        buf.push(&Samples::PerChannel(vec![vec![1.0; 15], vec![2.0; 2]])).unwrap();

        let records = buf.drain_records(false);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel_lens(), vec![10, 0]);
        assert_eq!(buf.group_lens(), vec![5, 2]);

        let tail = buf.drain_records(true);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].channel_lens(), vec![5, 2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn no_group_keeps_a_whole_record_after_draining() {
        let mut buf = RecordBuffer::new(&SamplingRate::PerChannel(vec![10, 4]), 2, 1.0).unwrap();
        for (a, b) in [(7, 1), (7, 1), (7, 9), (0, 0), (25, 3)] {
            buf.push(&Samples::PerChannel(vec![vec![0.0; a], vec![0.0; b]])).unwrap();
            buf.drain_records(false);
            let lens = buf.group_lens();
            assert!(lens[0] < 10 && lens[1] < 4, "{lens:?}");
        }
    }

    #[test]
    fn wrong_shape_is_a_configuration_error() {
        let mut buf = RecordBuffer::new(&SamplingRate::Shared(10), 2, 1.0).unwrap();
        assert!(matches!(
            buf.push(&Samples::PerChannel(vec![vec![0.0], vec![0.0]])),
            Err(Error::Configuration { .. })
        ));
    }
}
