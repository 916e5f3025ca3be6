//! JSON-lines recording format used by the demo in place of EDF.
//!
//! The first line is the header; every following line is a record or an
//! annotation, tagged by `type`.

use bidsrun_core::{Error, Result};
use bidsrun_instrument::{Annotation, RecordingHeader, Samples, SinkFactory, TimeSeriesSink};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Header(&'a RecordingHeader),
    Record {
        index: u64,
        digital: bool,
        channels: &'a [Vec<f64>],
    },
    Annotation(&'a Annotation),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSinkFactory;

impl SinkFactory for JsonLinesSinkFactory {
    fn create(&self, path: &Path, header: &RecordingHeader) -> Result<Box<dyn TimeSeriesSink>> {
        let mut sink = JsonLinesSink {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(File::create(path)?)),
            record_lens: header.signals.iter().map(|s| s.samples_per_record).collect(),
            records: 0,
            finished: vec![false; header.signals.len()],
        };
        sink.write_line(&Line::Header(header))?;
        Ok(Box::new(sink))
    }
}

pub struct JsonLinesSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    record_lens: Vec<usize>,
    records: u64,
    /// Channels whose short tail has been written.
    finished: Vec<bool>,
}

impl JsonLinesSink {
    fn write_line(&mut self, line: &Line<'_>) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::schedule(format!("{} is closed", self.path.display())))?;
        serde_json::to_writer(&mut *writer, line)?;
        writeln!(writer)?;
        Ok(())
    }
}

impl TimeSeriesSink for JsonLinesSink {
    fn write_record(&mut self, record: &Samples, digital: bool) -> Result<()> {
        let lens = record.channel_lens();
        if lens.len() != self.record_lens.len() {
            return Err(Error::schedule(format!(
                "record has {} channels, header declares {}",
                lens.len(),
                self.record_lens.len()
            )));
        }
        for (channel, (&len, &max)) in lens.iter().zip(&self.record_lens).enumerate() {
            if len == 0 {
                continue;
            }
            if self.finished[channel] {
                return Err(Error::schedule(format!(
                    "channel {channel}: record written after its short tail"
                )));
            }
            if len > max {
                return Err(Error::schedule(format!(
                    "channel {channel}: {len} samples exceed the record length {max}"
                )));
            }
        }
        for ((finished, &len), &max) in self.finished.iter_mut().zip(&lens).zip(&self.record_lens) {
            *finished |= len > 0 && len < max;
        }
        let index = self.records;
        self.write_line(&Line::Record {
            index,
            digital,
            channels: record.channels(),
        })?;
        self.records += 1;
        Ok(())
    }

    fn write_annotation(&mut self, annotation: Annotation) -> Result<()> {
        self.write_line(&Line::Annotation(&annotation))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::debug!(path = %self.path.display(), records = self.records, "recording closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidsrun_instrument::{RecordingMetadata, SampleBlock, SignalHeader};

    fn header(samples_per_record: usize) -> RecordingHeader {
        let metadata = RecordingMetadata::default();
        RecordingHeader {
            signals: vec![SignalHeader {
                label: "Cz".into(),
                physical_dimension: "uV".into(),
                physical_min: -1000.0,
                physical_max: 1000.0,
                sfreq: 4,
                samples_per_record,
                prefilter: String::new(),
            }],
            record_duration: 1.0,
            start_date: metadata.resolved_start_date(),
            metadata,
        }
    }

    fn block(n: usize) -> Samples {
        Samples::Block(SampleBlock::new(vec![vec![1.0; n]]).unwrap())
    }

    #[test]
    fn writes_header_records_and_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.jsonl");
        let mut sink = JsonLinesSinkFactory.create(&path, &header(4)).unwrap();
        sink.write_record(&block(4), false).unwrap();
        sink.write_annotation(Annotation {
            onset: 0.5,
            duration: None,
            text: "blink".into(),
        })
        .unwrap();
        sink.write_record(&block(2), false).unwrap();
        assert!(sink.write_record(&block(4), false).is_err());
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "header");
        assert_eq!(lines[1]["type"], "record");
        assert_eq!(lines[2]["text"], "blink");
        assert_eq!(lines[3]["index"], 1);
    }

    #[test]
    fn oversized_records_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonLinesSinkFactory
            .create(&dir.path().join("rec.jsonl"), &header(4))
            .unwrap();
        assert!(matches!(
            sink.write_record(&block(5), false),
            Err(Error::ScheduleViolation { .. })
        ));
        sink.close().unwrap();
        assert!(sink.write_annotation(Annotation {
            onset: 0.0,
            duration: None,
            text: "late".into(),
        })
        .is_err());
    }
}
