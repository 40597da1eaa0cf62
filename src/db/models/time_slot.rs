//! Time slot records and the per-day views built from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One tracked interval of work on a task. A slot without `end_time` is the active slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: i64,
    pub task_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
}

impl TimeSlot {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Total tracked time for one task on one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTotal {
    pub task_name: String,
    pub total_seconds: i64,
    pub percentage: f64,
}

/// Statistics for a day, tasks sorted by time spent (longest first)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayReport {
    pub date: NaiveDate,
    pub total_seconds: i64,
    pub tasks: Vec<TaskTotal>,
}
