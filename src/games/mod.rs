pub mod crash;
pub mod hilo;
pub mod outcome_engine;
pub mod scratch;
pub mod types;

pub use crash::{Clock, CrashSchedule, CrashTimer, ManualClock, SystemClock};
pub use hilo::HiLoChoice;
pub use outcome_engine::OutcomeEngine;
pub use types::*;
