pub mod entity;
pub mod error;
pub mod event;
pub mod layout;
pub mod modality;

pub use entity::{Entity, ensure_participant_id, participant_id_from_index};
pub use error::{Error, Result};
pub use event::{Event, EventRecord, Trigger, secs_to_duration};
pub use layout::{RunIndex, SessionLayout, StreamName};
pub use modality::Modality;
