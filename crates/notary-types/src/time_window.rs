//! Validity interval constraining when a transaction may be committed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An optional `(from, until)` interval. Either bound may be absent.
///
/// Both bounds are **inclusive**: a commit at exactly `from` or exactly
/// `until` is inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    #[must_use]
    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    #[must_use]
    pub fn from_only(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }

    #[must_use]
    pub fn until_only(until: DateTime<Utc>) -> Self {
        Self {
            from: None,
            until: Some(until),
        }
    }

    /// `false` when both bounds are present and `from > until`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match (self.from, self.until) {
            (Some(from), Some(until)) => from <= until,
            _ => true,
        }
    }

    /// Whether `instant` lies within the window (inclusive bounds).
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| from <= instant)
            && self.until.is_none_or(|until| instant <= until)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.from.map_or_else(|| "-inf".to_string(), |t| t.to_rfc3339());
        let until = self.until.map_or_else(|| "+inf".to_string(), |t| t.to_rfc3339());
        write!(f, "[{from}, {until}]")
    }
}
