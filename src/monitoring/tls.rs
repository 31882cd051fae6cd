//! Leaf certificate inspection.

use chrono::{DateTime, Utc};
use x509_parser::parse_x509_certificate;

use super::outcome::TlsCertificate;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days until `valid_to`, rounded up. Goes negative once the
/// certificate has expired.
pub fn days_until_expiry(valid_to: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = (valid_to - now).num_milliseconds();
    if remaining > 0 {
        (remaining + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    } else {
        remaining / MILLIS_PER_DAY
    }
}

/// Parses a DER encoded certificate. Returns `None` when the bytes are not a
/// certificate this parser understands.
pub fn describe_certificate(der: &[u8], now: DateTime<Utc>) -> Option<TlsCertificate> {
    let (_, cert) = parse_x509_certificate(der).ok()?;
    let validity = cert.validity();
    let valid_from = DateTime::<Utc>::from_timestamp(validity.not_before.timestamp(), 0)?;
    let valid_to = DateTime::<Utc>::from_timestamp(validity.not_after.timestamp(), 0)?;

    Some(TlsCertificate {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        valid_from,
        valid_to,
        days_until_expiry: days_until_expiry(valid_to, now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ten_days_out_is_ten_days() {
        let now = Utc::now();
        assert_eq!(days_until_expiry(now + Duration::days(10), now), 10);
    }

    #[test]
    fn partial_days_round_up() {
        let now = Utc::now();
        assert_eq!(days_until_expiry(now + Duration::hours(1), now), 1);
        assert_eq!(days_until_expiry(now + Duration::days(3) + Duration::minutes(1), now), 4);
    }

    #[test]
    fn expired_certificates_count_down_below_zero() {
        let now = Utc::now();
        assert_eq!(days_until_expiry(now, now), 0);
        assert_eq!(days_until_expiry(now - Duration::days(2), now), -2);
        assert_eq!(days_until_expiry(now - Duration::hours(30), now), -1);
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert!(describe_certificate(b"not a certificate", Utc::now()).is_none());
    }
}
