use crate::run::Run;
use bidsrun_core::{Entity, Error, Event, Result, RunIndex, SessionLayout};
use bidsrun_instrument::{Instrument, Readable, Samples, Writable};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a task owns independently of how it reacts to events: its
/// name, instruments, timeline and optional length.
///
/// The first instrument is the primary one. It must be readable; its sample
/// count is the run clock.
pub struct TaskDefinition {
    name: Entity,
    layout: Arc<SessionLayout>,
    instruments: Vec<Box<dyn Instrument>>,
    pub events: Vec<Event>,
    /// Bounds the run regardless of how many events remain.
    pub duration: Option<Duration>,
}

impl TaskDefinition {
    pub fn new(
        name: &str,
        layout: Arc<SessionLayout>,
        instruments: Vec<Box<dyn Instrument>>,
        events: Vec<Event>,
        duration: Option<Duration>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::configuration("task name must not be empty"));
        }
        match instruments.first() {
            None => return Err(Error::configuration("a task needs at least one instrument")),
            Some(primary) if primary.readable().is_none() => {
                return Err(Error::configuration(format!(
                    "primary instrument ({}) must be readable",
                    primary.modality()
                )));
            }
            Some(_) => {}
        }
        Ok(Self {
            name: Entity::task(name),
            layout,
            instruments,
            events,
            duration,
        })
    }

    pub fn name(&self) -> &Entity {
        &self.name
    }

    /// `task-{name}`
    pub fn id(&self) -> String {
        self.name.id()
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn instruments(&self) -> &[Box<dyn Instrument>] {
        &self.instruments
    }

    pub fn instruments_mut(&mut self) -> &mut [Box<dyn Instrument>] {
        &mut self.instruments
    }

    pub fn primary_instrument(&self) -> &dyn Instrument {
        // Non-empty by construction.
        self.instruments[0].as_ref()
    }

    pub fn sfreq(&self) -> Result<u32> {
        self.primary_instrument()
            .readable()
            .map(Readable::sfreq)
            .ok_or_else(|| Error::configuration("primary instrument is not readable"))
    }

    /// One sampling step from the primary instrument. With `remainder` set
    /// the sub-record tail is flushed to the sink as well.
    pub fn sample(&mut self, remainder: bool) -> Result<Samples> {
        self.instruments[0]
            .as_readable()
            .ok_or_else(|| Error::configuration("primary instrument is not readable"))?
            .read(remainder)
    }

    /// The `index`-th instrument if it accepts commands.
    pub fn writable(&mut self, index: usize) -> Option<&mut dyn Writable> {
        self.instruments.get_mut(index)?.as_writable()
    }

    pub fn n_runs(&self) -> Result<usize> {
        Ok(self
            .layout
            .existing_runs(&self.id(), self.primary_instrument().stream())?
            .len())
    }

    pub fn highest_run(&self) -> Result<Option<u32>> {
        self.layout
            .highest_run(&self.id(), self.primary_instrument().stream())
    }

    pub fn next_run(&self) -> Result<u32> {
        self.layout.next_run(&self.id(), self.primary_instrument().stream())
    }

    /// Directory of the primary stream, created on demand.
    pub fn ensure_run_dir(&self) -> Result<PathBuf> {
        self.layout.ensure_stream_dir(self.primary_instrument().stream())
    }

    /// `{prefix}_events.tsv` next to the primary stream.
    pub fn events_path(&self, run_id: &str) -> PathBuf {
        self.layout
            .stream_dir(self.primary_instrument().stream())
            .join(format!("{}_events.tsv", self.layout.run_prefix(&self.id(), run_id)))
    }
}

/// A task as the run driver sees it.
///
/// `process` is called once per loop iteration and must pull exactly one
/// sampling step from the primary instrument. The default does only that;
/// override it to interleave stimulus updates with sampling.
pub trait Task {
    fn definition(&self) -> &TaskDefinition;

    fn definition_mut(&mut self) -> &mut TaskDefinition;

    fn on_event_start(&mut self, event: &Event) -> Result<()>;

    fn on_event_end(&mut self, event: &Event) -> Result<()>;

    fn process(&mut self, final_step: bool) -> Result<Samples> {
        self.definition_mut().sample(final_step)
    }

    /// Prepares the next run of this task, numbered after the highest one on disk.
    fn add_run(&mut self) -> Result<Run<'_, Self>>
    where
        Self: Sized,
    {
        Run::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidsrun_instrument::testing::ScriptedDevice;
    use bidsrun_instrument::{EegInstrument, MemorySinkFactory, RecorderConfig, StimConfig, StimInstrument};

    fn layout(root: &std::path::Path) -> Arc<SessionLayout> {
        Arc::new(SessionLayout::new(root, "01", "01"))
    }

    fn eeg(layout: Arc<SessionLayout>) -> Box<dyn Instrument> {
        let config = RecorderConfig {
            electrodes: vec!["Cz".into()],
            read: ScriptedDevice::read_binding(),
            ..RecorderConfig::default()
        };
        Box::new(
            EegInstrument::new(layout, ScriptedDevice::new(1, 8), config, Arc::new(MemorySinkFactory::new()))
                .unwrap(),
        )
    }

    #[test]
    fn primary_instrument_must_be_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let stim = StimInstrument::new(layout.clone(), ScriptedDevice::new(0, 0), StimConfig::default()).unwrap();

        let instruments: Vec<Box<dyn Instrument>> = vec![Box::new(stim)];
        let result = TaskDefinition::new("rest", layout.clone(), instruments, Vec::new(), None);
        assert!(matches!(result, Err(Error::Configuration { .. })));
        assert!(TaskDefinition::new("rest", layout, Vec::new(), Vec::new(), None).is_err());
    }

    #[test]
    fn run_numbering_follows_files_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let task = TaskDefinition::new("rest", layout.clone(), vec![eeg(layout)], Vec::new(), None).unwrap();
        assert_eq!(task.id(), "task-rest");
        assert_eq!(task.n_runs().unwrap(), 0);
        assert_eq!(task.next_run().unwrap(), 1);

        let dir = task.ensure_run_dir().unwrap();
        for name in [
            "sub-01_ses-01_task-rest_run-01_eeg.edf",
            "sub-01_ses-01_task-rest_run-03_eeg.edf",
            "sub-01_ses-01_task-rest_run-01_events.tsv",
            "sub-01_ses-01_task-motor_run-07_eeg.edf",
        ] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        assert_eq!(task.n_runs().unwrap(), 2);
        assert_eq!(task.highest_run().unwrap(), Some(3));
        assert_eq!(task.next_run().unwrap(), 4);
        assert_eq!(
            task.events_path("run-04"),
            dir.join("sub-01_ses-01_task-rest_run-04_events.tsv")
        );
    }

    #[test]
    fn sampling_needs_a_started_primary() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let mut task = TaskDefinition::new("rest", layout.clone(), vec![eeg(layout)], Vec::new(), None).unwrap();
        assert_eq!(task.sfreq().unwrap(), 256);
        assert!(task.sample(false).is_err());
        assert!(task.writable(0).is_none());
        assert!(task.writable(5).is_none());

        task.instruments_mut()[0].start("task-rest", "run-01").unwrap();
        assert_eq!(task.sample(false).unwrap().n_samples(), 8);
    }
}
