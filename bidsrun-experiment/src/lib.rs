pub mod config;
pub mod event_log;
pub mod run;
pub mod task;

pub use config::{EventPlan, EventSpec, TaskConfig};
pub use event_log::{EventLog, read_event_log};
pub use run::{Run, RunState, RunSummary};
pub use task::{Task, TaskDefinition};
