//! Probing: one health check per target, and the scheduler that fans them out.

pub mod outcome;
pub mod prober;
pub mod scheduler;
pub mod tls;

pub use outcome::{ProbeErrorKind, ProbeFailure, ProbeOutcome};
pub use prober::{HttpProber, TargetProber};
pub use scheduler::{MonitorScheduler, SchedulerSettings, SweepReport};
