//! In-memory sink that enforces the whole-record contract.
//!
//! Recordings are kept by file path in a shared table so they can be
//! inspected after the instrument that wrote them has been stopped.

use crate::samples::Samples;
use crate::sink::{Annotation, RecordingHeader, SinkFactory, TimeSeriesSink};
use bidsrun_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Recording {
    pub header: RecordingHeader,
    pub records: Vec<Samples>,
    pub annotations: Vec<Annotation>,
    pub closed: bool,
    /// Channels whose short final record has been written.
    finished: Vec<bool>,
}

impl Recording {
    /// Samples written per channel across all records.
    pub fn samples_per_channel(&self) -> Vec<usize> {
        let mut totals = vec![0; self.header.signals.len()];
        for record in &self.records {
            for (total, len) in totals.iter_mut().zip(record.channel_lens()) {
                *total += len;
            }
        }
        totals
    }
}

type Table = Arc<Mutex<BTreeMap<PathBuf, Recording>>>;

#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    recordings: Table,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self, path: &Path) -> Option<Recording> {
        self.recordings.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.recordings
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, path: &Path, header: &RecordingHeader) -> Result<Box<dyn TimeSeriesSink>> {
        let mut table = lock(&self.recordings)?;
        table.insert(
            path.to_path_buf(),
            Recording {
                header: header.clone(),
                records: Vec::new(),
                annotations: Vec::new(),
                closed: false,
                finished: vec![false; header.signals.len()],
            },
        );
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            recordings: Arc::clone(&self.recordings),
        }))
    }
}

pub struct MemorySink {
    path: PathBuf,
    recordings: Table,
}

impl MemorySink {
    fn with_recording<T>(&self, f: impl FnOnce(&mut Recording) -> Result<T>) -> Result<T> {
        let mut table = lock(&self.recordings)?;
        let recording = table
            .get_mut(&self.path)
            .ok_or_else(|| Error::schedule(format!("no recording at {}", self.path.display())))?;
        if recording.closed {
            return Err(Error::schedule(format!(
                "{} is already closed",
                self.path.display()
            )));
        }
        f(recording)
    }
}

impl TimeSeriesSink for MemorySink {
    fn write_record(&mut self, record: &Samples, _digital: bool) -> Result<()> {
        self.with_recording(|rec| {
            let lens = record.channel_lens();
            if lens.len() != rec.header.signals.len() {
                return Err(Error::schedule(format!(
                    "record has {} channels, header declares {}",
                    lens.len(),
                    rec.header.signals.len()
                )));
            }
            for ((&len, signal), &finished) in lens.iter().zip(&rec.header.signals).zip(&rec.finished) {
                if len == 0 {
                    continue;
                }
                if finished {
                    return Err(Error::schedule(format!(
                        "write to {} after its final short record",
                        signal.label
                    )));
                }
                if len > signal.samples_per_record {
                    return Err(Error::schedule(format!(
                        "{} samples exceed the record length {} of {}",
                        len, signal.samples_per_record, signal.label
                    )));
                }
            }
            for ((&len, signal), finished) in lens.iter().zip(&rec.header.signals).zip(&mut rec.finished) {
                *finished |= len > 0 && len < signal.samples_per_record;
            }
            rec.records.push(record.clone());
            Ok(())
        })
    }

    fn write_annotation(&mut self, annotation: Annotation) -> Result<()> {
        self.with_recording(|rec| {
            rec.annotations.push(annotation);
            Ok(())
        })
    }

    fn close(&mut self) -> Result<()> {
        self.with_recording(|rec| {
            rec.closed = true;
            Ok(())
        })
    }
}

fn lock(table: &Table) -> Result<std::sync::MutexGuard<'_, BTreeMap<PathBuf, Recording>>> {
    table
        .lock()
        .map_err(|_| Error::schedule("recording table poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleBlock;
    use crate::sink::{RecordingMetadata, SignalHeader};

    fn header(samples_per_record: usize) -> RecordingHeader {
        header_with(&[samples_per_record])
    }

    fn header_with(records: &[usize]) -> RecordingHeader {
        RecordingHeader {
            signals: records
                .iter()
                .enumerate()
                .map(|(i, &samples_per_record)| SignalHeader {
                    label: format!("ch{i}"),
                    physical_dimension: "uV".into(),
                    physical_min: -1.0,
                    physical_max: 1.0,
                    sfreq: samples_per_record as u32,
                    samples_per_record,
                    prefilter: String::new(),
                })
                .collect(),
            record_duration: 1.0,
            start_date: RecordingMetadata::default().resolved_start_date(),
            metadata: RecordingMetadata::default(),
        }
    }

    fn record(n: usize) -> Samples {
        Samples::Block(SampleBlock::new(vec![vec![0.0; n]]).unwrap())
    }

    #[test]
    fn only_one_short_record_is_accepted() {
        let factory = MemorySinkFactory::new();
        let path = Path::new("a.edf");
        let mut sink = factory.create(path, &header(4)).unwrap();
        sink.write_record(&record(4), false).unwrap();
        sink.write_record(&record(2), false).unwrap();
        assert!(matches!(
            sink.write_record(&record(4), false),
            Err(Error::ScheduleViolation { .. })
        ));
        sink.close().unwrap();

        let rec = factory.recording(path).unwrap();
        assert!(rec.closed);
        assert_eq!(rec.samples_per_channel(), vec![6]);
    }

    #[test]
    fn channel_groups_finish_independently() {
        let factory = MemorySinkFactory::new();
        let path = Path::new("d.edf");
        let mut sink = factory.create(path, &header_with(&[10, 4])).unwrap();
        let per_channel = |a: usize, b: usize| Samples::PerChannel(vec![vec![0.0; a], vec![0.0; b]]);

        sink.write_record(&per_channel(10, 0), false).unwrap();
        sink.write_record(&per_channel(10, 4), false).unwrap();
        sink.write_record(&per_channel(5, 2), false).unwrap();
        assert!(sink.write_record(&per_channel(0, 4), false).is_err());
        assert!(sink.write_record(&per_channel(10, 0), false).is_err());

        assert_eq!(factory.recording(path).unwrap().samples_per_channel(), vec![25, 6]);
    }

    #[test]
    fn oversized_and_misshapen_records_are_rejected() {
        let factory = MemorySinkFactory::new();
        let mut sink = factory.create(Path::new("b.edf"), &header(4)).unwrap();
        assert!(sink.write_record(&record(5), false).is_err());
        let two = Samples::Block(SampleBlock::new(vec![vec![0.0; 4]; 2]).unwrap());
        assert!(sink.write_record(&two, false).is_err());
    }

    #[test]
    fn closed_sinks_refuse_writes() {
        let factory = MemorySinkFactory::new();
        let mut sink = factory.create(Path::new("c.edf"), &header(4)).unwrap();
        sink.close().unwrap();
        assert!(sink.write_record(&record(4), false).is_err());
        assert!(
            sink.write_annotation(Annotation {
                onset: 0.0,
                duration: None,
                text: "late".into(),
            })
            .is_err()
        );
    }
}
