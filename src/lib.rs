//! Monitoring execution and alerting engine: periodic HTTP(S) probes with
//! phase timing and TLS inspection, transition detection, maintenance-aware
//! alerting, bounded probe history and incident lookups.

pub mod alerting;
pub mod db;
pub mod monitoring;
pub mod notifications;
pub mod server;
pub mod version;
