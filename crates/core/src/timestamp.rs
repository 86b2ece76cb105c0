//! Nanosecond Unix timestamps
//!
//! Temporal tags key their history on a decimal nanosecond Unix timestamp.
//! `Timestamp` is a thin wrapper so call sites can't accidentally mix up
//! seconds, millis and nanos.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A nanosecond-precision Unix timestamp.
///
/// Ordering is the natural integer ordering, which is also temporal-tag
/// ordering: equal timestamps compare equal and ties are broken by append
/// order at the call site, never by `Timestamp` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    /// Nanoseconds since the Unix epoch.
    pub fn as_nanos(self) -> i64 {
        self.0
    }

    /// Build from a raw nanosecond count.
    pub fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// Render as RFC3339, for wire responses.
    pub fn to_rfc3339(self) -> String {
        let secs = self.0.div_euclid(1_000_000_000);
        let nanos = self.0.rem_euclid(1_000_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
    }

    /// Parse an RFC3339 timestamp into nanosecond precision.
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Timestamp(dt.timestamp_nanos_opt().unwrap_or(0)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_roundtrip() {
        let ts = Timestamp::from_nanos(1_737_140_000_123_456_789);
        let s = ts.to_rfc3339();
        let back = Timestamp::parse_rfc3339(&s).unwrap();
        // chrono only carries nanosecond precision through RFC3339 exactly.
        assert_eq!(back.as_nanos(), ts.as_nanos());
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Timestamp::from_nanos(1) < Timestamp::from_nanos(2));
    }
}
