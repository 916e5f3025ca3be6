use bidsrun_core::{Error, Event, Result, secs_to_duration};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// JSON description of a task's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub name: String,
    /// Total run length in seconds. Unset runs until the events are used up.
    pub duration_s: Option<f64>,
    pub events: EventPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPlan {
    Explicit {
        events: Vec<EventSpec>,
    },
    /// Back-to-back events of one width.
    Fixed {
        duration_s: f64,
        trial_types: Vec<String>,
        /// Span to tile; defaults to the task duration.
        #[serde(default)]
        task_duration_s: Option<f64>,
    },
    /// Back-to-back events with uniformly drawn widths.
    Variable {
        min_duration_s: f64,
        max_duration_s: f64,
        trial_types: Vec<String>,
        #[serde(default)]
        task_duration_s: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    #[serde(default)]
    pub onset_s: Option<f64>,
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub trial_type: Option<String>,
    #[serde(default)]
    pub triggerable: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: "block".to_owned(),
            duration_s: Some(60.0),
            events: EventPlan::Fixed {
                duration_s: 10.0,
                trial_types: vec!["rest".to_owned(), "task".to_owned()],
                task_duration_s: None,
            },
        }
    }
}

impl TaskConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        if config.name.is_empty() {
            return Err(Error::configuration("task name must not be empty"));
        }
        Ok(config)
    }

    pub fn duration(&self) -> Result<Option<Duration>> {
        self.duration_s.map(secs_to_duration).transpose()
    }

    /// Materializes the event plan. `rng` is only drawn from by the
    /// variable-width plan.
    pub fn build_events<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Event>> {
        match &self.events {
            EventPlan::Explicit { events } => events
                .iter()
                .map(|e| Event::from_secs(e.onset_s, e.duration_s, e.trial_type.as_deref(), e.triggerable))
                .collect(),
            EventPlan::Fixed {
                duration_s,
                trial_types,
                task_duration_s,
            } => Event::generate_fixed_duration_events(
                secs_to_duration(*duration_s)?,
                trial_types,
                self.span(*task_duration_s)?,
            ),
            EventPlan::Variable {
                min_duration_s,
                max_duration_s,
                trial_types,
                task_duration_s,
            } => Event::generate_variable_duration_events(
                secs_to_duration(*min_duration_s)?,
                secs_to_duration(*max_duration_s)?,
                trial_types,
                self.span(*task_duration_s)?,
                rng,
            ),
        }
    }

    fn span(&self, task_duration_s: Option<f64>) -> Result<Duration> {
        let secs = task_duration_s.or(self.duration_s).ok_or_else(|| {
            Error::configuration("generated events need task_duration_s or a task duration")
        })?;
        secs_to_duration(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_plan_tiles_the_task() {
        let config = TaskConfig::default();
        let events = config.build_events(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events[5].trial_type.as_deref(), Some("task"));
        assert_eq!(config.duration().unwrap(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn explicit_plans_parse_from_json() {
        let json = r#"{
            "name": "oddball",
            "events": {
                "kind": "explicit",
                "events": [
                    {"onset_s": 0.0, "duration_s": 1.5, "trial_type": "standard"},
                    {"trial_type": "response", "triggerable": true}
                ]
            }
        }"#;
        let config: TaskConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.duration_s, Some(60.0));

        let events = config.build_events(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_timed());
        assert_eq!(events[0].duration, Some(Duration::from_millis(1500)));
        assert!(events[1].triggerable());
        assert!(events[1].onset.is_none());
    }

    #[test]
    fn variable_plans_are_reproducible() {
        let config = TaskConfig {
            name: "motor".into(),
            duration_s: None,
            events: EventPlan::Variable {
                min_duration_s: 1.0,
                max_duration_s: 2.0,
                trial_types: vec!["left".into(), "right".into(), "rest".into()],
                task_duration_s: Some(12.0),
            },
        };
        let a = config.build_events(&mut StdRng::seed_from_u64(7)).unwrap();
        let b = config.build_events(&mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.len(), 12);
        assert_eq!(
            a.iter().map(|e| e.record()).collect::<Vec<_>>(),
            b.iter().map(|e| e.record()).collect::<Vec<_>>()
        );
        assert_eq!(config.duration().unwrap(), None);
    }

    #[test]
    fn generators_need_a_span() {
        let config = TaskConfig {
            duration_s: None,
            ..TaskConfig::default()
        };
        assert!(matches!(
            config.build_events(&mut StdRng::seed_from_u64(0)),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn load_rejects_unnamed_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"name": ""}"#).unwrap();
        assert!(TaskConfig::load(&path).is_err());

        std::fs::write(&path, r#"{"name": "rest", "duration_s": 30}"#).unwrap();
        let config = TaskConfig::load(&path).unwrap();
        assert_eq!(config.duration_s, Some(30.0));
        assert_eq!(config.events, TaskConfig::default().events);
    }
}
