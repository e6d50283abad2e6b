//! TaskStateTable - イベントを集約したタスクごとのビュー
//!
//! イベントは部分的にしか届かない（task-started に name は無い、など）。
//! task_id ごとに届いたフィールドを上書きマージしていき、
//! 「いま分かっているタスクの全体像」を [`TaskView`] として持つ。
//!
//! # マージ規則
//! - イベントに含まれるフィールドは上書き、含まれないフィールドは前の値を残す
//! - 到着順のみ。状態の優先順位（SUCCESS の後の STARTED を無視する等）は持たない
//! - task-sent の hostname は送信側クライアントなので worker にしない
//! - uuid の無いイベント（worker-heartbeat など）はタスクを作らない

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::{EventKind, RawEvent, TaskId, TaskStatus};

/// Published by the client, not a worker.
const CLIENT_EVENT: &str = "task-sent";

/// Attributes that make up [`TaskView::info`].
const INFO_FIELDS: [&str; 12] = [
    "args",
    "kwargs",
    "retries",
    "result",
    "eta",
    "runtime",
    "expires",
    "exception",
    "exchange",
    "routing_key",
    "root_id",
    "parent_id",
];

/// Aggregated view of one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskView {
    pub status: Option<TaskStatus>,
    pub worker: Option<String>,
    attrs: Map<String, Value>,
}

impl TaskView {
    pub fn name(&self) -> Option<&str> {
        self.str_attr("name")
    }

    pub fn traceback(&self) -> Option<&str> {
        self.str_attr("traceback")
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    fn str_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    /// Informational fields that are currently set.
    pub fn info(&self) -> Map<String, Value> {
        INFO_FIELDS
            .iter()
            .filter_map(|key| self.attrs.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect()
    }

    fn merge(&mut self, kind: &EventKind, event: &RawEvent) {
        for (key, value) in &event.fields {
            if !value.is_null() {
                self.attrs.insert(key.clone(), value.clone());
            }
        }
        if event.event_type != CLIENT_EVENT
            && let Some(hostname) = &event.hostname
        {
            self.worker = Some(hostname.clone());
        }
        if let EventKind::Task(task_kind) = kind {
            self.status = Some(task_kind.status());
        }
    }
}

/// Per-task views, owned by the ingest thread.
#[derive(Debug, Default)]
pub struct TaskStateTable {
    tasks: HashMap<TaskId, TaskView>,
}

impl TaskStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the table. Events without a task id leave it untouched.
    pub fn apply(&mut self, kind: &EventKind, event: &RawEvent) {
        if let Some(task_id) = event.task_id() {
            self.tasks.entry(task_id).or_default().merge(kind, event);
        }
    }

    pub fn task(&self, task_id: &TaskId) -> Option<&TaskView> {
        self.tasks.get(task_id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}
