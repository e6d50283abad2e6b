//! Events - イベントソースから届く生イベントと、その種別
//!
//! # 種別の扱い
//! - 名前付きのタスクイベント（task-received など 6 種）は [`TaskEventKind`] に対応付ける
//! - それ以外（worker-heartbeat, task-sent など）は [`EventKind::Other`]（ワイルドカード）
//!
//! 文字列キーでハンドラを引く代わりに enum で分岐するので、
//! 新しい種別を足したときに match の網羅性チェックが効く。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{TaskId, TaskStatus};

/// One message as delivered by the event source.
///
/// Only `type` is required. Everything else is optional because sources
/// send partial events (a `task-started` carries no `name`, a heartbeat has
/// no `uuid`). Unknown attributes are kept in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            uuid: None,
            hostname: None,
            fields: Map::new(),
        }
    }

    /// Builder-style helper, mostly for tests and in-process sources.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// Task id carried by the event, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        self.uuid
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(TaskId::new)
    }
}

/// The six task lifecycle events that produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    Received,
    Started,
    Succeeded,
    Failed,
    Retried,
    Revoked,
}

impl TaskEventKind {
    pub const ALL: [TaskEventKind; 6] = [
        TaskEventKind::Received,
        TaskEventKind::Started,
        TaskEventKind::Succeeded,
        TaskEventKind::Failed,
        TaskEventKind::Retried,
        TaskEventKind::Revoked,
    ];

    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }

    pub fn event_type(self) -> &'static str {
        match self {
            TaskEventKind::Received => "task-received",
            TaskEventKind::Started => "task-started",
            TaskEventKind::Succeeded => "task-succeeded",
            TaskEventKind::Failed => "task-failed",
            TaskEventKind::Retried => "task-retried",
            TaskEventKind::Revoked => "task-revoked",
        }
    }

    /// Status written to the store for this event.
    pub fn status(self) -> TaskStatus {
        match self {
            TaskEventKind::Received => TaskStatus::Received,
            TaskEventKind::Started => TaskStatus::Started,
            TaskEventKind::Succeeded => TaskStatus::Success,
            TaskEventKind::Failed => TaskStatus::Failure,
            TaskEventKind::Retried => TaskStatus::Retry,
            TaskEventKind::Revoked => TaskStatus::Revoked,
        }
    }
}

/// Dispatch key for an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A named task lifecycle event.
    Task(TaskEventKind),
    /// Anything else; handled by the wildcard path (bookkeeping only).
    Other(String),
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match TaskEventKind::from_event_type(event_type) {
            Some(kind) => EventKind::Task(kind),
            None => EventKind::Other(event_type.to_string()),
        }
    }
}
