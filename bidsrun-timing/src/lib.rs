pub mod clock;
pub mod pacer;

pub use clock::{Clock, ClockStats, SampleClock};
pub use pacer::{high_precision_sleep, Pacer};
