//! Publish schedule domain types

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};

use super::RecordStatus;

/// A scheduled upload of a video to the publishing platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    pub datetime: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub status: RecordStatus,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    Normal,
    #[serde(alias = "SMART")]
    Daily,
}

impl Schedule {
    /// First time after both `datetime` and `after` with the same time of day
    ///
    /// A schedule that fell days behind skips the missed days instead of
    /// firing once for each of them.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut next = self.datetime.checked_add_days(Days::new(1))?;
        if next <= after {
            let missed = (after - next).num_days().max(0) as u64;
            next = next.checked_add_days(Days::new(missed))?;
        }
        while next <= after {
            next = next.checked_add_days(Days::new(1))?;
        }
        Some(next)
    }
}
