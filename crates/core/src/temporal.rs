//! Date windows for composites and collection filters

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar window `[start, end]` as supplied by the caller.
///
/// Backend filters treat `end` as exclusive, matching how imagery collections
/// are usually date-filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window; `end` must not precede `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidParameter {
                name: "end",
                value: end.to_string(),
                reason: format!("end date must be after start date {}", start),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date("start", start)?, parse_date("end", end)?)
    }

    /// Whether `date` falls in `[start, end)`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn parse_date(name: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: format!("expected YYYY-MM-DD: {}", e),
    })
}
