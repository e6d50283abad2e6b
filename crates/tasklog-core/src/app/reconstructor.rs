//! EventStateReconstructor - 生イベントから TaskRecord を組み立てる
//!
//! # フロー（取り込みスレッド上で同期的に実行）
//! 1. 全イベントを [`TaskStateTable`] に適用（ワイルドカード含む）
//! 2. 名前付きタスクイベントなら、集約ビューから TaskRecord を 1 件作る
//! 3. [`Deduplicator`] で同じステータスの連続を捨てる
//! 4. 残ったものを [`BufferedChannel`] に push（ブロックしない）
//!
//! ビューが欠けていても（RECEIVED より先に終端イベントが来た等）失敗にはせず、
//! 空欄のまま best-effort のレコードを出す。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::channel::{BufferedChannel, ChannelClosed};
use super::dedup::Deduplicator;
use super::state_table::{TaskStateTable, TaskView};
use super::status::MonitorStats;
use crate::domain::{EventKind, RawEvent, TaskEventKind, TaskId, TaskRecord};
use crate::ports::{Clock, EventHandler};

pub struct EventStateReconstructor {
    table: TaskStateTable,
    dedup: Deduplicator,
    clock: Arc<dyn Clock>,
    channel: Arc<BufferedChannel<TaskRecord>>,
    stats: Arc<MonitorStats>,
}

impl EventStateReconstructor {
    pub fn new(
        clock: Arc<dyn Clock>,
        channel: Arc<BufferedChannel<TaskRecord>>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            table: TaskStateTable::new(),
            dedup: Deduplicator::new(),
            clock,
            channel,
            stats,
        }
    }

    /// Apply `event` to the state table and, for a named task event, build
    /// the record it implies. Does not touch dedup or the channel.
    pub fn derive_record(&mut self, kind: &EventKind, event: &RawEvent) -> Option<TaskRecord> {
        self.table.apply(kind, event);
        self.stats.set_tasks_tracked(self.table.task_count());

        let EventKind::Task(task_kind) = kind else {
            debug!(event_type = %event.event_type, "wildcard event");
            return None;
        };
        let Some(task_id) = event.task_id() else {
            warn!(event_type = %event.event_type, "task event without uuid, skipping");
            self.stats.event_unkeyed();
            return None;
        };

        let empty = TaskView::default();
        let view = self.table.task(&task_id).unwrap_or(&empty);
        Some(self.build_record(*task_kind, task_id, view))
    }

    fn build_record(
        &self,
        kind: TaskEventKind,
        task_id: TaskId,
        view: &TaskView,
    ) -> TaskRecord {
        let status = kind.status();
        let info = view.info();
        TaskRecord {
            task_id,
            task_name: view.name().unwrap_or_default().to_string(),
            status,
            worker: view.worker.clone(),
            date_done: status.is_done().then(|| self.clock.now()),
            traceback: view.traceback().map(str::to_string),
            result: Value::Object(info).to_string(),
            args: dump_or(view.attr("args"), Value::Array(Vec::new())),
            kwargs: dump_or(view.attr("kwargs"), Value::Object(Default::default())),
        }
    }

    fn route(&mut self, record: TaskRecord) {
        if !self.dedup.should_persist(&record.task_id, record.status) {
            debug!(task_id = %record.task_id, status = %record.status, "unchanged status, skipping");
            self.stats.record_deduplicated();
            return;
        }

        info!(
            task_id = %record.task_id,
            status = %record.status,
            "TASK {}: {}[{}] {}",
            record.status,
            record.task_name,
            record.task_id,
            record.result
        );
        match self.channel.push(record) {
            Ok(()) => self.stats.record_emitted(),
            Err(ChannelClosed(record)) => {
                warn!(
                    task_id = %record.task_id,
                    status = %record.status,
                    "monitor is shutting down, record dropped"
                );
                self.stats.record_rejected();
            }
        }
    }
}

impl EventHandler for EventStateReconstructor {
    fn on_event(&mut self, kind: EventKind, event: RawEvent) {
        self.stats.event_seen();
        if let Some(record) = self.derive_record(&kind, &event) {
            self.route(record);
        }
    }
}

/// JSON text of `value`, or of `default` when the value is missing or empty.
fn dump_or(value: Option<&Value>, default: Value) -> String {
    let is_empty = match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    };
    match value {
        Some(v) if !is_empty => v.to_string(),
        _ => default.to_string(),
    }
}
