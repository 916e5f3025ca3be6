//! Tab-separated event table written alongside each run.

use bidsrun_core::{Error, EventRecord, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 3] = ["onset", "duration", "trial_type"];
const MISSING: &str = "n/a";

/// Writer for `*_events.tsv`. Rows are flushed as they are appended so a
/// run that aborts leaves every finished row on disk.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: usize,
}

impl EventLog {
    /// Creates (or truncates) the file and writes the header.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", HEADER.join("\t"))?;
        writer.flush()?;
        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Labels containing a tab or line break, or spelled `n/a`, are refused:
    /// they would not read back as written.
    pub fn append(&mut self, record: &EventRecord) -> Result<()> {
        if let Some(label) = record.trial_type.as_deref() {
            if label == MISSING || label.contains(['\t', '\n', '\r']) {
                return Err(Error::EventLog {
                    path: self.path.clone(),
                    message: format!("trial type {label:?} cannot be stored in a TSV field"),
                });
            }
        }
        let writer = self.writer.as_mut().ok_or_else(|| Error::EventLog {
            path: self.path.clone(),
            message: "append after close".to_owned(),
        })?;
        writeln!(
            writer,
            "{}\t{}\t{}",
            seconds_field(record.onset),
            seconds_field(record.duration),
            record.trial_type.as_deref().unwrap_or(MISSING),
        )?;
        writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Closing twice is allowed.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn seconds_field(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_owned(), |v| v.to_string())
}

/// Parses an event table written by [`EventLog`].
pub fn read_event_log(path: impl AsRef<Path>) -> Result<Vec<EventRecord>> {
    let path = path.as_ref();
    let malformed = |message: String| Error::EventLog {
        path: path.to_path_buf(),
        message,
    };

    let mut lines = BufReader::new(File::open(path)?).lines();
    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| malformed("empty file".to_owned()))?;
    if header.split('\t').ne(HEADER) {
        return Err(malformed(format!("unexpected header '{header}'")));
    }

    let mut records = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [onset, duration, trial_type] = fields[..] else {
            return Err(malformed(format!(
                "row {} has {} fields, expected 3",
                n + 1,
                fields.len()
            )));
        };
        let seconds = |field: &str| -> Result<Option<f64>> {
            if field == MISSING {
                return Ok(None);
            }
            field
                .parse()
                .map(Some)
                .map_err(|_| malformed(format!("row {}: '{field}' is not a number", n + 1)))
        };
        records.push(EventRecord {
            onset: seconds(onset)?,
            duration: seconds(duration)?,
            trial_type: (trial_type != MISSING).then(|| trial_type.to_owned()),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(onset: Option<f64>, duration: Option<f64>, trial_type: Option<&str>) -> EventRecord {
        EventRecord {
            onset,
            duration,
            trial_type: trial_type.map(str::to_owned),
        }
    }

    #[test]
    fn rows_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.tsv");
        let mut log = EventLog::create(&path).unwrap();
        log.append(&record(Some(2.5), Some(1.0), Some("go"))).unwrap();
        log.append(&record(Some(3.5), None, None)).unwrap();
        log.close().unwrap();
        log.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "onset\tduration\ttrial_type\n2.5\t1\tgo\n3.5\tn/a\tn/a\n");

        let records = read_event_log(&path).unwrap();
        assert_eq!(records, vec![record(Some(2.5), Some(1.0), Some("go")), record(Some(3.5), None, None)]);
    }

    #[test]
    fn create_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.tsv");
        let mut log = EventLog::create(&path).unwrap();
        log.append(&record(Some(0.0), Some(1.0), Some("rest"))).unwrap();
        log.close().unwrap();

        EventLog::create(&path).unwrap().close().unwrap();
        assert!(read_event_log(&path).unwrap().is_empty());
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = EventLog::create(dir.path().join("events.tsv")).unwrap();
        log.close().unwrap();
        assert!(matches!(
            log.append(&record(None, None, None)),
            Err(Error::EventLog { .. })
        ));
        assert_eq!(log.rows(), 0);
    }

    #[test]
    fn labels_that_break_the_table_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.tsv");
        let mut log = EventLog::create(&path).unwrap();
        for label in ["go\tleft", "two\nlines", "n/a"] {
            assert!(matches!(
                log.append(&record(Some(0.0), Some(1.0), Some(label))),
                Err(Error::EventLog { .. })
            ));
        }
        log.append(&record(Some(0.0), Some(1.0), Some("go left"))).unwrap();
        log.close().unwrap();

        assert_eq!(log.rows(), 1);
        assert_eq!(
            read_event_log(&path).unwrap(),
            vec![record(Some(0.0), Some(1.0), Some("go left"))]
        );
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.tsv");

        std::fs::write(&path, "start\tend\tlabel\n").unwrap();
        assert!(matches!(read_event_log(&path), Err(Error::EventLog { .. })));

        std::fs::write(&path, "onset\tduration\ttrial_type\n1.0\tgo\n").unwrap();
        assert!(matches!(read_event_log(&path), Err(Error::EventLog { .. })));

        std::fs::write(&path, "onset\tduration\ttrial_type\nsoon\t1\tgo\n").unwrap();
        assert!(matches!(read_event_log(&path), Err(Error::EventLog { .. })));
    }
}
