//! Status - モニタの稼働カウンタ
//!
//! 取り込みスレッドと flush スレッドの両方から更新されるので atomic で持つ。
//! 参照側は [`MonitorStats::snapshot`] でシリアライズ可能なビューを取る。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MonitorStats {
    events_seen: AtomicU64,
    events_unkeyed: AtomicU64,
    records_emitted: AtomicU64,
    records_deduplicated: AtomicU64,
    records_rejected: AtomicU64,
    flushes: AtomicU64,
    rows_created: AtomicU64,
    rows_updated: AtomicU64,
    batches_dropped: AtomicU64,
    entries_dropped: AtomicU64,
    tasks_tracked: AtomicU64,
}

/// Point-in-time copy of [`MonitorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_seen: u64,
    pub events_unkeyed: u64,
    pub records_emitted: u64,
    pub records_deduplicated: u64,
    pub records_rejected: u64,
    pub flushes: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub batches_dropped: u64,
    pub entries_dropped: u64,
    /// Distinct task ids seen so far.
    pub tasks_tracked: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn event_seen(&self) {
        bump(&self.events_seen, 1);
    }

    pub(crate) fn event_unkeyed(&self) {
        bump(&self.events_unkeyed, 1);
    }

    pub(crate) fn record_emitted(&self) {
        bump(&self.records_emitted, 1);
    }

    pub(crate) fn record_deduplicated(&self) {
        bump(&self.records_deduplicated, 1);
    }

    pub(crate) fn record_rejected(&self) {
        bump(&self.records_rejected, 1);
    }

    pub(crate) fn flushed(&self, created: usize, updated: usize) {
        bump(&self.flushes, 1);
        bump(&self.rows_created, created as u64);
        bump(&self.rows_updated, updated as u64);
    }

    pub(crate) fn batch_dropped(&self, entries: usize) {
        bump(&self.flushes, 1);
        bump(&self.batches_dropped, 1);
        bump(&self.entries_dropped, entries as u64);
    }

    /// Inserts went through; the update partition was lost.
    pub(crate) fn partially_flushed(&self, created: usize, dropped: usize) {
        bump(&self.flushes, 1);
        bump(&self.rows_created, created as u64);
        bump(&self.batches_dropped, 1);
        bump(&self.entries_dropped, dropped as u64);
    }

    pub(crate) fn set_tasks_tracked(&self, tasks: usize) {
        self.tasks_tracked.store(tasks as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            events_seen: load(&self.events_seen),
            events_unkeyed: load(&self.events_unkeyed),
            records_emitted: load(&self.records_emitted),
            records_deduplicated: load(&self.records_deduplicated),
            records_rejected: load(&self.records_rejected),
            flushes: load(&self.flushes),
            rows_created: load(&self.rows_created),
            rows_updated: load(&self.rows_updated),
            batches_dropped: load(&self.batches_dropped),
            entries_dropped: load(&self.entries_dropped),
            tasks_tracked: load(&self.tasks_tracked),
        }
    }
}
