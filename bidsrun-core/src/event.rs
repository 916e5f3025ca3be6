use crate::error::{Error, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One-shot external signal attached to an event.
///
/// Handles are cheap to clone and may be moved to other threads (an input
/// callback, a stimulus detector). Setting is idempotent; on a handle taken
/// from a non-triggerable event it does nothing.
#[derive(Debug, Clone)]
pub struct Trigger {
    armed: bool,
    flag: Arc<AtomicBool>,
}

impl Trigger {
    fn new(armed: bool) -> Self {
        Self {
            armed,
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Lowers the signal again, for every handle sharing it.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A labelled interval on the run timeline.
///
/// Clones share the same [`Trigger`], so a handle obtained before a run
/// still reaches the copy the run is driving.
#[derive(Debug, Clone)]
pub struct Event {
    pub onset: Option<Duration>,
    pub duration: Option<Duration>,
    pub trial_type: Option<String>,
    trigger: Trigger,
}

/// Flat view of an event, in seconds, as written to the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub onset: Option<f64>,
    pub duration: Option<f64>,
    pub trial_type: Option<String>,
}

impl Event {
    pub fn new(
        onset: Option<Duration>,
        duration: Option<Duration>,
        trial_type: Option<String>,
        triggerable: bool,
    ) -> Self {
        Self {
            onset,
            duration,
            trial_type,
            trigger: Trigger::new(triggerable),
        }
    }

    /// Same as [`Event::new`] with onset and duration given in raw seconds.
    pub fn from_secs(
        onset: Option<f64>,
        duration: Option<f64>,
        trial_type: Option<&str>,
        triggerable: bool,
    ) -> Result<Self> {
        Ok(Self::new(
            onset.map(secs_to_duration).transpose()?,
            duration.map(secs_to_duration).transpose()?,
            trial_type.map(str::to_owned),
            triggerable,
        ))
    }

    pub fn timed(onset: Duration, duration: Duration, trial_type: impl Into<String>) -> Self {
        Self::new(Some(onset), Some(duration), Some(trial_type.into()), false)
    }

    /// An unscheduled event that starts when its trigger is set.
    pub fn on_signal(trial_type: impl Into<String>) -> Self {
        Self::new(None, None, Some(trial_type.into()), true)
    }

    pub fn triggerable(&self) -> bool {
        self.trigger.armed
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    pub fn is_set(&self) -> bool {
        self.trigger.is_set()
    }

    /// Raises the external signal. A no-op on non-triggerable events.
    pub fn signal(&self) {
        self.trigger.set();
    }

    /// Lowers the signal so the event can be driven again.
    pub fn reset_signal(&self) {
        self.trigger.reset();
    }

    pub fn is_timed(&self) -> bool {
        self.onset.is_some() && self.duration.is_some()
    }

    pub fn end_time(&self) -> Option<Duration> {
        Some(self.onset? + self.duration?)
    }

    pub fn record(&self) -> EventRecord {
        EventRecord {
            onset: self.onset.map(|d| d.as_secs_f64()),
            duration: self.duration.map(|d| d.as_secs_f64()),
            trial_type: self.trial_type.clone(),
        }
    }

    /// Onset of every event expressed as a (fractional) sample index.
    pub fn sample_onsets(events: &[Event], sfreq: f64) -> Result<Vec<f64>> {
        events
            .iter()
            .map(|e| {
                e.onset
                    .map(|onset| onset.as_secs_f64() * sfreq)
                    .ok_or_else(|| Error::InvalidTime {
                        message: format!("event {e} has no onset"),
                    })
            })
            .collect()
    }

    /// Tiles `task_duration` with back-to-back events of width `duration`,
    /// cycling through `trial_types` round-robin. A trailing partial slot is
    /// dropped.
    pub fn generate_fixed_duration_events<S: AsRef<str>>(
        duration: Duration,
        trial_types: &[S],
        task_duration: Duration,
    ) -> Result<Vec<Event>> {
        check_trial_types(trial_types)?;
        if duration.is_zero() {
            return Err(Error::configuration("event duration must be positive"));
        }
        let n_events = task_duration.as_nanos() / duration.as_nanos();
        let n_events = u32::try_from(n_events)
            .map_err(|_| Error::configuration("too many events for task duration"))?;

        Ok((0..n_events)
            .map(|i| {
                let label = trial_types[i as usize % trial_types.len()].as_ref();
                Event::timed(duration * i, duration, label)
            })
            .collect())
    }

    /// Back-to-back events with widths drawn uniformly from
    /// `[min_duration, max_duration]`.
    ///
    /// Enough events are produced to fill `task_duration` even if every
    /// width came out at the minimum, so the tail may run past the task end.
    /// With more than two trial types the labels are drawn as shuffled blocks
    /// and a block is reshuffled until its first label differs from the last
    /// label of the previous block.
    pub fn generate_variable_duration_events<S, R>(
        min_duration: Duration,
        max_duration: Duration,
        trial_types: &[S],
        task_duration: Duration,
        rng: &mut R,
    ) -> Result<Vec<Event>>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        check_trial_types(trial_types)?;
        if min_duration.is_zero() {
            return Err(Error::configuration("minimum event duration must be positive"));
        }
        if max_duration < min_duration {
            return Err(Error::configuration(format!(
                "maximum event duration {max_duration:?} is below minimum {min_duration:?}"
            )));
        }

        let max_n_events = (task_duration.as_nanos() / min_duration.as_nanos()) as usize;
        let (lo, hi) = (min_duration.as_secs_f64(), max_duration.as_secs_f64());

        let n_types = trial_types.len();
        let n_repeats = max_n_events.div_ceil(n_types);
        let labels: Vec<&str> = trial_types.iter().map(AsRef::as_ref).collect();
        let mut sequence: Vec<&str> = Vec::with_capacity(n_repeats * n_types);
        if n_types > 2 {
            for _ in 0..n_repeats {
                let mut block = labels.clone();
                block.shuffle(rng);
                while sequence.last() == block.first() {
                    block.shuffle(rng);
                }
                sequence.extend(block);
            }
        } else {
            for _ in 0..n_repeats {
                sequence.extend(labels.iter().copied());
            }
        }

        let mut onset = Duration::ZERO;
        let mut events = Vec::with_capacity(max_n_events);
        for label in sequence.into_iter().take(max_n_events) {
            let width = Duration::from_secs_f64(rng.random_range(lo..=hi));
            events.push(Event::timed(onset, width, label));
            onset += width;
        }
        Ok(events)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record();
        write!(
            f,
            "{{onset: {}, duration: {}, trial_type: {}}}",
            fmt_opt(record.onset),
            fmt_opt(record.duration),
            record.trial_type.as_deref().unwrap_or("n/a"),
        )
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| v.to_string())
}

pub fn secs_to_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| Error::InvalidTime {
        message: format!("{secs} s: {e}"),
    })
}

fn check_trial_types<S: AsRef<str>>(trial_types: &[S]) -> Result<()> {
    if trial_types.is_empty() {
        return Err(Error::configuration("at least one trial type is required"));
    }
    let mut seen = HashSet::new();
    for t in trial_types {
        if !seen.insert(t.as_ref()) {
            return Err(Error::configuration(format!(
                "duplicate trial type '{}'",
                t.as_ref()
            )));
        }
    }
    Ok(())
}
