//! The run driver loop.
//!
//! Time inside a run is the primary instrument's cumulative sample count
//! divided by its sampling frequency. The loop never consults the wall
//! clock, so the event table is reproducible from the recording alone.

use crate::event_log::EventLog;
use crate::task::Task;
use bidsrun_core::{Entity, Error, Event, EventRecord, Result};
use bidsrun_timing::{Clock, SampleClock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Sampling,
    Finalizing,
    Stopped,
    Aborted,
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub task_id: String,
    pub run_id: String,
    /// Samples counted by the clock; the warm-up block is not included.
    pub total_samples: u64,
    pub elapsed_secs: f64,
    pub events_path: PathBuf,
    pub events: Vec<EventRecord>,
}

#[derive(Debug)]
struct Current {
    event: Event,
    /// Started by its own signal rather than by the clock.
    by_signal: bool,
}

/// One execution of a task.
///
/// Holds the task mutably for its whole life, so a task can never drive
/// two runs at once.
pub struct Run<'t, T: Task> {
    task: &'t mut T,
    id: Entity,
    state: RunState,
    clock: SampleClock,
    remaining: VecDeque<Event>,
    current: Option<Current>,
    log: Option<EventLog>,
    finished: Vec<EventRecord>,
}

impl<'t, T: Task> Run<'t, T> {
    /// Numbers the run after the highest run already on disk.
    pub fn new(task: &'t mut T) -> Result<Self> {
        let index = task.definition().next_run()?;
        Self::with_index(task, index)
    }

    pub fn with_index(task: &'t mut T, index: u32) -> Result<Self> {
        let sfreq = task.definition().sfreq()?;
        let clock = SampleClock::new(sfreq).ok_or_else(|| {
            Error::configuration("primary instrument reports a sampling frequency of 0")
        })?;
        Ok(Self {
            task,
            id: Entity::run(index),
            state: RunState::Idle,
            clock,
            remaining: VecDeque::new(),
            current: None,
            log: None,
            finished: Vec::new(),
        })
    }

    /// `run-NN`
    pub fn id(&self) -> String {
        self.id.id()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Drives the run to completion.
    ///
    /// On failure every instrument is stopped and the event log closed on a
    /// best-effort basis before the error is returned. Rows already written
    /// stay on disk; the interrupted event is not logged.
    pub fn start(mut self) -> Result<RunSummary> {
        match self.execute() {
            Ok(()) => Ok(self.summary()),
            Err(e) => {
                tracing::error!(run = %self.id, error = %e, "run aborted");
                self.abort();
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        self.initialize()?;
        self.transition(RunState::Sampling);
        while !self.done() {
            self.step()?;
        }
        self.finalize()
    }

    fn transition(&mut self, state: RunState) {
        tracing::debug!(run = %self.id, from = ?self.state, to = ?state, "run state");
        self.state = state;
    }

    fn initialize(&mut self) -> Result<()> {
        self.transition(RunState::Initializing);
        let run_id = self.id.id();
        let definition = self.task.definition();
        let task_id = definition.id();

        definition.ensure_run_dir()?;
        self.log = Some(EventLog::create(definition.events_path(&run_id))?);
        self.remaining = definition.events.iter().cloned().collect();
        // Signals raised during an earlier run must not start this one.
        for event in &self.remaining {
            event.reset_signal();
        }
        self.current = None;
        self.finished.clear();
        self.clock.reset();

        for instrument in self.task.definition_mut().instruments_mut() {
            instrument.start(&task_id, &run_id)?;
        }
        tracing::info!(
            task = %task_id,
            run = %run_id,
            sfreq = self.clock.sfreq(),
            events = self.remaining.len(),
            "run started"
        );

        if self
            .remaining
            .front()
            .is_some_and(|e| e.onset == Some(self.clock.elapsed()))
        {
            if let Some(event) = self.remaining.pop_front() {
                self.begin(event, false)?;
            }
        }

        // Warm-up block: whatever the device buffered during setup.
        self.task.process(false)?;
        Ok(())
    }

    /// A timed run stops at its duration, an untimed one as soon as the
    /// queue is empty. The event still current is closed in finalize.
    fn done(&self) -> bool {
        match self.task.definition().duration {
            Some(duration) => self.clock.elapsed() >= duration,
            None => self.remaining.is_empty(),
        }
    }

    fn step(&mut self) -> Result<()> {
        let elapsed = self.clock.elapsed();

        if self.current.as_ref().is_some_and(|c| is_finished(c, elapsed)) {
            self.end_current()?;
        }

        if self.next_is_ready(elapsed) {
            self.end_current()?;
            if let Some(mut event) = self.remaining.pop_front() {
                let by_signal = event.onset.is_none();
                event.onset = Some(elapsed);
                self.begin(event, by_signal)?;
            }
        }

        let samples = self.task.process(false)?;
        self.clock.advance(samples.n_samples());
        Ok(())
    }

    fn next_is_ready(&self, elapsed: Duration) -> bool {
        match self.remaining.front() {
            None => false,
            Some(next) => match next.onset {
                None => next.is_set(),
                Some(onset) => elapsed >= onset,
            },
        }
    }

    fn begin(&mut self, event: Event, by_signal: bool) -> Result<()> {
        tracing::debug!(run = %self.id, %event, by_signal, "event started");
        self.task.on_event_start(&event)?;
        self.current = Some(Current { event, by_signal });
        Ok(())
    }

    /// Closes the current event at the present clock value. The planned
    /// duration is kept if it has fully elapsed; otherwise the actual time
    /// spent is recorded.
    fn end_current(&mut self) -> Result<()> {
        let Some(Current { mut event, .. }) = self.current.take() else {
            return Ok(());
        };
        let elapsed = self.clock.elapsed();
        let onset = event.onset.unwrap_or(elapsed);
        let actual = elapsed.saturating_sub(onset);
        event.duration = Some(match event.duration {
            Some(planned) if planned <= actual => planned,
            _ => actual,
        });

        tracing::debug!(run = %self.id, %event, "event finished");
        self.task.on_event_end(&event)?;
        let record = event.record();
        if let Some(log) = self.log.as_mut() {
            log.append(&record)?;
        }
        self.finished.push(record);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.transition(RunState::Finalizing);
        self.end_current()?;
        self.task.process(true)?;

        let mut first_error = None;
        for instrument in self.task.definition_mut().instruments_mut() {
            if let Err(e) = instrument.stop() {
                tracing::warn!(modality = %instrument.modality(), error = %e, "instrument failed to stop");
                first_error.get_or_insert(e);
            }
        }
        if let Some(mut log) = self.log.take() {
            log.close()?;
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.transition(RunState::Stopped);
        let stats = self.clock.stats();
        tracing::info!(
            run = %self.id,
            samples = stats.total_samples,
            steps = stats.steps,
            mean_step = stats.mean_step_samples,
            min_step = stats.min_step_samples,
            max_step = stats.max_step_samples,
            elapsed_s = self.clock.elapsed().as_secs_f64(),
            events = self.finished.len(),
            "run finished"
        );
        Ok(())
    }

    fn abort(&mut self) {
        for instrument in self.task.definition_mut().instruments_mut() {
            if let Err(e) = instrument.stop() {
                tracing::warn!(modality = %instrument.modality(), error = %e, "cleanup: instrument failed to stop");
            }
        }
        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.close() {
                tracing::warn!(path = %log.path().display(), error = %e, "cleanup: event log failed to close");
            }
        }
        self.transition(RunState::Aborted);
    }

    fn summary(&self) -> RunSummary {
        let definition = self.task.definition();
        let run_id = self.id.id();
        RunSummary {
            task_id: definition.id(),
            events_path: definition.events_path(&run_id),
            run_id,
            total_samples: self.clock.n_samples(),
            elapsed_secs: self.clock.elapsed().as_secs_f64(),
            events: self.finished.clone(),
        }
    }
}

fn is_finished(current: &Current, elapsed: Duration) -> bool {
    let event = &current.event;
    if event.end_time().is_some_and(|end| end <= elapsed) {
        return true;
    }
    event.triggerable() && !current.by_signal && event.is_set()
}
