//! Task record: the persistable projection of a task at one point in time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus};

/// Canonical row written to the result store.
///
/// Design:
/// - Built by the reconstructor for every relevant event.
/// - Either dropped by the deduplicator or enqueued for the flusher.
/// - Never outlives a flush cycle; the store owns durability.
///
/// `result`, `args` and `kwargs` are already-serialized JSON text, the same
/// shape the store keeps in its text columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub task_name: String,
    pub status: TaskStatus,
    pub worker: Option<String>,
    pub date_done: Option<DateTime<Utc>>,
    pub traceback: Option<String>,
    pub result: String,
    pub args: String,
    pub kwargs: String,
}

impl TaskRecord {
    /// Minimal record with empty payload columns (`{}` / `[]` / `{}`).
    pub fn new(task_id: impl Into<TaskId>, task_name: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            status,
            worker: None,
            date_done: None,
            traceback: None,
            result: "{}".to_string(),
            args: "[]".to_string(),
            kwargs: "{}".to_string(),
        }
    }

    /// Copy every column in `fields` from `other` into `self`.
    ///
    /// Used by stores that implement bulk update in memory.
    pub fn apply_fields(&mut self, other: &TaskRecord, fields: &[UpdateField]) {
        for field in fields {
            match field {
                UpdateField::TaskName => self.task_name = other.task_name.clone(),
                UpdateField::Status => self.status = other.status,
                UpdateField::Worker => self.worker = other.worker.clone(),
                UpdateField::DateDone => self.date_done = other.date_done,
                UpdateField::Traceback => self.traceback = other.traceback.clone(),
                UpdateField::Result => self.result = other.result.clone(),
                UpdateField::Args => self.args = other.args.clone(),
                UpdateField::Kwargs => self.kwargs = other.kwargs.clone(),
            }
        }
    }
}

/// Column of a stored record that a bulk update may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateField {
    TaskName,
    Status,
    Worker,
    DateDone,
    Traceback,
    Result,
    Args,
    Kwargs,
}

impl UpdateField {
    /// The fixed field set every flush updates. `task_id` is the key and is
    /// never part of it.
    pub const ALL: [UpdateField; 8] = [
        UpdateField::TaskName,
        UpdateField::Status,
        UpdateField::Worker,
        UpdateField::DateDone,
        UpdateField::Traceback,
        UpdateField::Result,
        UpdateField::Args,
        UpdateField::Kwargs,
    ];
}
