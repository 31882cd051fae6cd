//! Transition handling: status resolution, maintenance suppression and
//! incident lookups.

pub mod incident;
pub mod maintenance;
pub mod resolver;

pub use incident::{IncidentLocator, IncidentReport, RcaError};
pub use maintenance::MaintenanceSuppressor;
pub use resolver::{AlertDecision, ResolutionOutcome, ResolveError, StatusResolver};
