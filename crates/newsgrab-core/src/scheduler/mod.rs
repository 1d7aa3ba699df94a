mod cycle;
mod service;

pub use cycle::{Cycle, FetchPipeline};
pub use service::{ScheduleMode, Scheduler, SchedulerEvent, SchedulerReport, SchedulerState};
