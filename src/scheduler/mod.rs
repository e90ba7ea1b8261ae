pub mod controller;
pub mod state;

pub use controller::{PhaseScheduler, SchedulerEvent, SchedulerSnapshot, StartOutcome};
pub use state::{PhaseRunState, ScheduleState, SchedulerStatus, TickOutcome};
