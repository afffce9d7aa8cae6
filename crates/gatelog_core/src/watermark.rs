//! Sync watermark.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// App-state key under which the watermark is persisted.
pub const WATERMARK_KEY: &str = "lastSyncTimestamp";

/// Lower bound for the next pull.
///
/// An absent watermark means "full history". The watermark only ever moves
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Creates a watermark at the given instant.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Returns the instant.
    #[must_use]
    pub const fn at(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the watermark after observing `candidate`.
    ///
    /// Never earlier than `current`.
    #[must_use]
    pub fn advance(current: Option<Watermark>, candidate: DateTime<Utc>) -> Watermark {
        match current {
            Some(w) if w.0 >= candidate => w,
            _ => Watermark(candidate),
        }
    }

    /// Encodes for the app-state table (RFC 3339, millisecond precision, `Z`).
    #[must_use]
    pub fn encode(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Decodes an app-state value.
    ///
    /// Returns `None` for anything that is not an RFC 3339 timestamp.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn advance_from_absent() {
        assert_eq!(Watermark::advance(None, at(5)), Watermark::new(at(5)));
    }

    #[test]
    fn advance_never_moves_back() {
        let w = Watermark::new(at(10));
        assert_eq!(Watermark::advance(Some(w), at(3)), w);
        assert_eq!(Watermark::advance(Some(w), at(20)), Watermark::new(at(20)));
    }

    #[test]
    fn encode_decode() {
        let w = Watermark::new(at(42));
        assert_eq!(w.encode(), "2023-11-14T22:14:02.000Z");
        assert_eq!(Watermark::decode(&w.encode()), Some(w));
        assert_eq!(Watermark::decode("yesterday"), None);
    }

    proptest! {
        #[test]
        fn advance_is_the_running_maximum(offsets in prop::collection::vec(0i64..1_000_000, 1..20)) {
            let mut current = None;
            for &secs in &offsets {
                let next = Watermark::advance(current, at(secs));
                prop_assert!(Some(next) >= current);
                current = Some(next);
            }
            let max = offsets.iter().copied().max().map(at).map(Watermark::new);
            prop_assert_eq!(current, max);
        }

        #[test]
        fn millisecond_watermarks_survive_encoding(ms in 0i64..10_000_000_000) {
            let w = Watermark::new(at(0) + chrono::Duration::milliseconds(ms));
            prop_assert_eq!(Watermark::decode(&w.encode()), Some(w));
        }
    }
}
