//! Task status as persisted in the result store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a tracked task.
///
/// Serialized as SCREAMING_SNAKE_CASE to match the result store's column
/// values (RECEIVED / STARTED / SUCCESS / FAILURE / RETRY / REVOKED).
///
/// Ordering is arrival order only: a `STARTED` that arrives after `SUCCESS`
/// overwrites it. There is no semantic precedence between variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Received,
    Started,
    Success,
    Failure,
    Retry,
    Revoked,
}

impl TaskStatus {
    /// Statuses that stamp `date_done` on the record.
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Received => "RECEIVED",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Retry => "RETRY",
            TaskStatus::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
