use crate::samples::Samples;
use bidsrun_core::{Error, Modality, Result, SessionLayout, StreamName};
use std::path::PathBuf;
use std::sync::Arc;

/// Lifecycle shared by every instrument. Reading and writing are optional
/// capabilities reached through [`Instrument::as_readable`] and
/// [`Instrument::as_writable`].
pub trait Instrument: Send {
    fn stream(&self) -> &StreamName;

    fn start(&mut self, task_id: &str, run_id: &str) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn is_started(&self) -> bool;

    fn modality(&self) -> Modality {
        self.stream().modality()
    }

    fn readable(&self) -> Option<&dyn Readable> {
        None
    }

    fn as_readable(&mut self) -> Option<&mut dyn Readable> {
        None
    }

    fn as_writable(&mut self) -> Option<&mut dyn Writable> {
        None
    }
}

/// Produces sample blocks.
pub trait Readable {
    /// Rate of the first channel; the run clock is keyed to it.
    fn sfreq(&self) -> u32;

    /// Pulls one block from the device and returns it. Whole records are
    /// forwarded to the sink as they fill up; with `remainder` set the
    /// leftover partial record is forwarded too.
    fn read(&mut self, remainder: bool) -> Result<Samples>;

    /// Pulls one block from the device and drops it.
    fn flush(&mut self) -> Result<()>;
}

/// Accepts commands.
pub trait Writable {
    fn write(&mut self, command: &str) -> Result<()>;
}

/// Run-scoped identity common to all instruments: where the stream lives
/// and which task/run it is currently recording.
#[derive(Debug, Clone)]
pub struct InstrumentBase {
    layout: Arc<SessionLayout>,
    stream: StreamName,
    task_id: String,
    run_id: String,
    started: bool,
}

impl InstrumentBase {
    pub fn new(layout: Arc<SessionLayout>, stream: StreamName) -> Self {
        Self {
            layout,
            stream,
            task_id: String::new(),
            run_id: String::new(),
            started: false,
        }
    }

    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn begin(&mut self, task_id: &str, run_id: &str) -> Result<()> {
        if self.started {
            return Err(Error::configuration(format!(
                "{} instrument is already recording {}_{}",
                self.stream.modality(),
                self.task_id,
                self.run_id
            )));
        }
        if task_id.is_empty() || run_id.is_empty() {
            return Err(Error::configuration("task and run ids must not be empty"));
        }
        self.task_id = task_id.to_owned();
        self.run_id = run_id.to_owned();
        self.started = true;
        Ok(())
    }

    pub fn end(&mut self) {
        self.task_id.clear();
        self.run_id.clear();
        self.started = false;
    }

    pub fn filename(&self) -> Result<String> {
        self.require_started()?;
        Ok(self
            .layout
            .stream_filename(&self.stream, &self.task_id, &self.run_id))
    }

    pub fn filepath(&self) -> Result<PathBuf> {
        self.require_started()?;
        Ok(self.layout.stream_path(&self.stream, &self.task_id, &self.run_id))
    }

    pub fn require_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "{} instrument has not been started",
                self.stream.modality()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filepath_needs_a_started_run() {
        let layout = Arc::new(SessionLayout::new("/data", "01", "01"));
        let stream = StreamName::companion(Modality::Stim, "audio", Modality::Eeg, "tsv").unwrap();
        let mut base = InstrumentBase::new(layout, stream);
        assert!(base.filepath().is_err());

        base.begin("task-rest", "run-02").unwrap();
        assert_eq!(
            base.filepath().unwrap(),
            PathBuf::from("/data/sub-01/ses-01/eeg/sub-01_ses-01_task-rest_run-02_recording-audio_stim.tsv")
        );
        assert!(base.begin("task-rest", "run-03").is_err());

        base.end();
        assert!(!base.is_started());
        assert_eq!(base.task_id(), "");
    }
}
