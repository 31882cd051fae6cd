//! Result types produced by a single probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::db::enums::MonitorStatus;

/// Transport level failure classes. Each maps to a stable code stored with the
/// probe record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeErrorKind {
    #[error("invalid url")]
    InvalidUrl,
    #[error("dns resolution failed")]
    DnsResolution,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection failed")]
    Connection,
    #[error("tls handshake failed")]
    TlsHandshake,
    #[error("http protocol error")]
    Protocol,
    #[error("timed out")]
    Timeout,
}

impl ProbeErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ProbeErrorKind::InvalidUrl => "INVALID_URL",
            ProbeErrorKind::DnsResolution => "DNS_RESOLUTION_FAILED",
            ProbeErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ProbeErrorKind::Connection => "CONNECTION_FAILED",
            ProbeErrorKind::TlsHandshake => "TLS_HANDSHAKE_FAILED",
            ProbeErrorKind::Protocol => "HTTP_PROTOCOL_ERROR",
            ProbeErrorKind::Timeout => "TIMEOUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Per-phase durations in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub dns_ms: i64,
    pub tcp_ms: i64,
    pub tls_ms: i64,
    pub first_byte_ms: i64,
    pub transfer_ms: i64,
    pub total_ms: i64,
}

/// Instants captured while a probe runs. A phase that never happened (TLS on a
/// plaintext target, or anything after a failure) stays `None`.
#[derive(Debug, Clone, Copy)]
pub struct Milestones {
    pub start: Instant,
    pub dns: Option<Instant>,
    pub tcp: Option<Instant>,
    pub tls: Option<Instant>,
    pub first_byte: Option<Instant>,
    pub end: Option<Instant>,
}

impl Milestones {
    pub fn start_now() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            dns: None,
            tcp: None,
            tls: None,
            first_byte: None,
            end: None,
        }
    }

    /// Each phase is measured from the last milestone that was reached before
    /// it; absent phases are zero. `total` covers start to end (or `now` when
    /// the probe did not finish).
    pub fn timings(&self, now: Instant) -> PhaseTimings {
        let mut previous = self.start;
        let mut phase = |milestone: Option<Instant>| -> i64 {
            match milestone {
                Some(at) => {
                    let elapsed = at.saturating_duration_since(previous);
                    previous = at;
                    millis(elapsed)
                }
                None => 0,
            }
        };

        let dns_ms = phase(self.dns);
        let tcp_ms = phase(self.tcp);
        let tls_ms = phase(self.tls);
        let first_byte_ms = phase(self.first_byte);
        let transfer_ms = phase(self.end);
        let total_ms = millis(self.end.unwrap_or(now).saturating_duration_since(self.start));

        PhaseTimings {
            dns_ms,
            tcp_ms,
            tls_ms,
            first_byte_ms,
            transfer_ms,
            total_ms,
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Leaf certificate summary of a TLS target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificate {
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub days_until_expiry: i64,
}

/// Everything learned from one probe. Nothing here has been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub checked_at: DateTime<Utc>,
    pub status: MonitorStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: i64,
    pub timings: PhaseTimings,
    pub tls: Option<TlsCertificate>,
    pub body_snippet: Option<String>,
    pub error: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn online(checked_at: DateTime<Utc>, status_code: u16, timings: PhaseTimings) -> Self {
        Self {
            checked_at,
            status: MonitorStatus::Online,
            status_code: Some(status_code),
            response_time_ms: timings.total_ms,
            timings,
            tls: None,
            body_snippet: None,
            error: None,
        }
    }

    pub fn offline(checked_at: DateTime<Utc>, timings: PhaseTimings, failure: ProbeFailure) -> Self {
        Self {
            checked_at,
            status: MonitorStatus::Offline,
            status_code: None,
            response_time_ms: timings.total_ms,
            timings,
            tls: None,
            body_snippet: None,
            error: Some(failure),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == MonitorStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_subtract_the_previous_milestone() {
        let start = Instant::now();
        let mut m = Milestones::starting_at(start);
        m.dns = Some(start + Duration::from_millis(5));
        m.tcp = Some(start + Duration::from_millis(15));
        m.tls = Some(start + Duration::from_millis(45));
        m.first_byte = Some(start + Duration::from_millis(100));
        m.end = Some(start + Duration::from_millis(130));

        let t = m.timings(start + Duration::from_secs(10));
        assert_eq!(
            t,
            PhaseTimings {
                dns_ms: 5,
                tcp_ms: 10,
                tls_ms: 30,
                first_byte_ms: 55,
                transfer_ms: 30,
                total_ms: 130,
            }
        );
    }

    #[test]
    fn absent_tls_phase_is_zero_and_does_not_shift_later_phases() {
        let start = Instant::now();
        let mut m = Milestones::starting_at(start);
        m.dns = Some(start + Duration::from_millis(2));
        m.tcp = Some(start + Duration::from_millis(4));
        m.first_byte = Some(start + Duration::from_millis(24));
        m.end = Some(start + Duration::from_millis(30));

        let t = m.timings(start + Duration::from_secs(1));
        assert_eq!(t.tls_ms, 0);
        assert_eq!(t.first_byte_ms, 20);
        assert_eq!(t.transfer_ms, 6);
        assert_eq!(t.total_ms, 30);
    }

    #[test]
    fn unfinished_probe_measures_total_until_now() {
        let start = Instant::now();
        let mut m = Milestones::starting_at(start);
        m.dns = Some(start + Duration::from_millis(3));

        let t = m.timings(start + Duration::from_millis(250));
        assert_eq!(t.dns_ms, 3);
        assert_eq!(t.tcp_ms, 0);
        assert_eq!(t.transfer_ms, 0);
        assert_eq!(t.total_ms, 250);
    }

    #[test]
    fn error_kinds_have_stable_codes() {
        assert_eq!(ProbeErrorKind::Timeout.code(), "TIMEOUT");
        assert_eq!(
            ProbeFailure::new(ProbeErrorKind::ConnectionRefused, "refused").code(),
            "CONNECTION_REFUSED"
        );
    }
}
