//! BatchFlusher - バッファを溜めて結果ストアへ一括書き込みするループ
//!
//! # フロー（専用スレッドで実行）
//! 1. channel から timeout 付きで pop
//! 2. センチネル → 残りを flush して終了
//! 3. タイムアウト → バッファが空でなければ flush
//! 4. エントリ → バッファに追加、`batch_size` に達したら flush
//!
//! # flush の中身
//! - 同じ task_id のエントリは最後のものだけ残す（到着位置は最初のものを維持）
//! - `existing_ids` で既存行を調べ、新規は `bulk_insert`、既存は `bulk_update`
//! - ストアの失敗はログに残してバッチを捨てる（リトライ・再キューはしない）
//! - insert が通った後に update が失敗したら、捨てるのは update 分だけ
//! - 成否に関わらず最後に `release_connections` を呼ぶ

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::channel::{BufferedChannel, Pop};
use super::status::MonitorStats;
use crate::domain::{StoreError, TaskRecord, UpdateField};
use crate::ports::ResultStore;

/// What a single flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to write.
    Empty,
    Written { created: usize, updated: usize },
    /// A store call failed before anything was written; the batch was discarded.
    Dropped { entries: usize },
    /// New rows were inserted, then the update of existing rows failed.
    Partial { created: usize, dropped: usize },
}

/// A store call failed part-way through a batch.
struct WriteFailure {
    created: usize,
    dropped: usize,
    error: StoreError,
}

pub struct BatchFlusher<S> {
    store: S,
    channel: Arc<BufferedChannel<TaskRecord>>,
    batch_size: usize,
    flush_interval: Duration,
    stats: Arc<MonitorStats>,
}

impl<S: ResultStore> BatchFlusher<S> {
    pub fn new(
        store: S,
        channel: Arc<BufferedChannel<TaskRecord>>,
        batch_size: usize,
        flush_interval: Duration,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            store,
            channel,
            batch_size: batch_size.max(1),
            flush_interval,
            stats,
        }
    }

    /// Drain the channel until the sentinel, then return the store.
    ///
    /// Every entry pushed before `close()` ends up in exactly one flush.
    pub fn run(mut self) -> S {
        let mut buffer: Vec<TaskRecord> = Vec::new();
        // Arrival time of the oldest buffered entry.
        let mut oldest: Option<Instant> = None;

        loop {
            if let Some(at) = oldest
                && at.elapsed() >= self.flush_interval
            {
                self.flush(std::mem::take(&mut buffer));
                oldest = None;
            }
            let timeout = match oldest {
                Some(at) => self.flush_interval.saturating_sub(at.elapsed()),
                None => self.flush_interval,
            };

            match self.channel.pop(timeout) {
                Pop::Sentinel => {
                    debug!(pending = buffer.len(), "sentinel received, final flush");
                    self.flush(std::mem::take(&mut buffer));
                    break;
                }
                Pop::TimedOut => {
                    if !buffer.is_empty() {
                        self.flush(std::mem::take(&mut buffer));
                    }
                    oldest = None;
                }
                Pop::Item(record) => {
                    oldest.get_or_insert_with(Instant::now);
                    buffer.push(record);
                    if buffer.len() >= self.batch_size {
                        self.flush(std::mem::take(&mut buffer));
                        oldest = None;
                    }
                }
            }
        }

        self.store
    }

    /// Write one batch. Store errors are logged; whatever was not written is dropped.
    pub fn flush(&mut self, batch: Vec<TaskRecord>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let outcome = match self.write_batch(collapse_by_task(batch)) {
            Ok((created, updated)) => {
                if created > 0 {
                    info!(created, "created task results");
                }
                if updated > 0 {
                    info!(updated, "updated task results");
                }
                self.stats.flushed(created, updated);
                FlushOutcome::Written { created, updated }
            }
            Err(WriteFailure {
                created: 0,
                dropped,
                error,
            }) => {
                error!(batch_len = dropped, error = %error, "error flushing buffer, batch dropped");
                self.stats.batch_dropped(dropped);
                FlushOutcome::Dropped { entries: dropped }
            }
            Err(WriteFailure {
                created,
                dropped,
                error,
            }) => {
                info!(created, "created task results");
                error!(dropped, error = %error, "error updating task results, updates dropped");
                self.stats.partially_flushed(created, dropped);
                FlushOutcome::Partial { created, dropped }
            }
        };

        if let Err(e) = self.store.release_connections() {
            error!(error = %e, "failed to release store connections");
        }
        outcome
    }

    fn write_batch(&mut self, batch: Vec<TaskRecord>) -> Result<(usize, usize), WriteFailure> {
        let total = batch.len();
        let nothing_written = |error: StoreError| WriteFailure {
            created: 0,
            dropped: total,
            error,
        };

        let ids: Vec<_> = batch.iter().map(|r| r.task_id.clone()).collect();
        let existing = self.store.existing_ids(&ids).map_err(nothing_written)?;

        let (to_update, to_create): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|record| existing.contains(&record.task_id));

        let created = if to_create.is_empty() {
            0
        } else {
            self.store.bulk_insert(&to_create).map_err(nothing_written)?
        };
        let updated = if to_update.is_empty() {
            0
        } else {
            self.store
                .bulk_update(&to_update, &UpdateField::ALL)
                .map_err(|error| WriteFailure {
                    created,
                    dropped: to_update.len(),
                    error,
                })?
        };
        Ok((created, updated))
    }
}

/// Keep the last entry per task id, at the position of that id's first entry.
fn collapse_by_task(batch: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let mut slots: HashMap<_, usize> = HashMap::with_capacity(batch.len());
    let mut out: Vec<TaskRecord> = Vec::with_capacity(batch.len());
    for record in batch {
        match slots.get(&record.task_id) {
            Some(&i) => out[i] = record,
            None => {
                slots.insert(record.task_id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskStatus};
    use crate::impls::{InMemoryResultStore, StoreOp};
    use std::thread;

    fn record(id: &str, status: TaskStatus) -> TaskRecord {
        TaskRecord::new(id, "vod.encode", status)
    }

    fn flusher(
        store: InMemoryResultStore,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (BatchFlusher<InMemoryResultStore>, Arc<BufferedChannel<TaskRecord>>) {
        let channel = Arc::new(BufferedChannel::new());
        let flusher = BatchFlusher::new(
            store,
            Arc::clone(&channel),
            batch_size,
            flush_interval,
            Arc::new(MonitorStats::new()),
        );
        (flusher, channel)
    }

    #[test]
    fn size_threshold_flushes_without_waiting() {
        let store = InMemoryResultStore::new();
        let (flusher, channel) = flusher(store.clone(), 2, Duration::from_secs(60));
        let worker = thread::spawn(move || flusher.run());

        let start = Instant::now();
        channel.push(record("t1", TaskStatus::Received)).unwrap();
        channel.push(record("t2", TaskStatus::Received)).unwrap();

        assert!(store.wait_for_rows(2, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));

        channel.close();
        worker.join().unwrap();
        // One flush holding both entries; the final flush had nothing left.
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Exists(vec![TaskId::new("t1"), TaskId::new("t2")]),
                StoreOp::Insert(vec![TaskId::new("t1"), TaskId::new("t2")]),
                StoreOp::Release,
            ]
        );
    }

    #[test]
    fn interval_flushes_partial_batch() {
        let store = InMemoryResultStore::new();
        let (flusher, channel) = flusher(store.clone(), 100, Duration::from_millis(300));
        let worker = thread::spawn(move || flusher.run());

        let start = Instant::now();
        channel.push(record("t1", TaskStatus::Received)).unwrap();

        assert!(store.wait_for_rows(1, Duration::from_secs(3)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "flushed too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "flushed too late: {elapsed:?}");

        channel.close();
        worker.join().unwrap();
    }

    #[test]
    fn trickle_does_not_postpone_interval_flush() {
        let store = InMemoryResultStore::new();
        let (flusher, channel) = flusher(store.clone(), 100, Duration::from_millis(400));
        let worker = thread::spawn(move || flusher.run());

        let start = Instant::now();
        for i in 0..6 {
            channel.push(record(&format!("t{i}"), TaskStatus::Received)).unwrap();
            thread::sleep(Duration::from_millis(150));
        }
        // Six entries spaced 150ms apart: a deadline of oldest + 400ms means
        // the first flush happens long before the last push.
        let first_flush = store
            .ops()
            .iter()
            .any(|op| matches!(op, StoreOp::Insert(_)));
        assert!(first_flush, "no flush after {:?}", start.elapsed());

        channel.close();
        worker.join().unwrap();
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn sentinel_flushes_remaining_entries() {
        let store = InMemoryResultStore::new();
        let (flusher, channel) = flusher(store.clone(), 100, Duration::from_secs(60));

        channel.push(record("t1", TaskStatus::Received)).unwrap();
        channel.push(record("t2", TaskStatus::Started)).unwrap();
        channel.close();

        let returned = flusher.run();
        assert_eq!(returned.len(), 2);
        assert_eq!(store.get(&TaskId::new("t2")).unwrap().status, TaskStatus::Started);
    }

    #[test]
    fn batch_is_partitioned_into_create_and_update() {
        let store = InMemoryResultStore::new();
        store.seed(record("t1", TaskStatus::Received));
        let (mut flusher, _channel) = flusher(store.clone(), 100, Duration::from_secs(60));

        let outcome = flusher.flush(vec![
            record("t1", TaskStatus::Success),
            record("t2", TaskStatus::Received),
        ]);

        assert_eq!(outcome, FlushOutcome::Written { created: 1, updated: 1 });
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Exists(vec![TaskId::new("t1"), TaskId::new("t2")]),
                StoreOp::Insert(vec![TaskId::new("t2")]),
                StoreOp::Update(vec![TaskId::new("t1")], UpdateField::ALL.to_vec()),
                StoreOp::Release,
            ]
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().status, TaskStatus::Success);
    }

    #[test]
    fn same_task_in_one_batch_keeps_last_status() {
        let store = InMemoryResultStore::new();
        let (mut flusher, _channel) = flusher(store.clone(), 100, Duration::from_secs(60));

        flusher.flush(vec![
            record("t1", TaskStatus::Received),
            record("t2", TaskStatus::Received),
            record("t1", TaskStatus::Started),
            record("t1", TaskStatus::Success),
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().status, TaskStatus::Success);
        assert_eq!(
            store.ops()[1],
            StoreOp::Insert(vec![TaskId::new("t1"), TaskId::new("t2")])
        );
    }

    #[test]
    fn store_failure_drops_batch_and_still_releases() {
        let store = InMemoryResultStore::new();
        store.fail_next(StoreError::Unavailable("db down".to_string()));
        let stats = Arc::new(MonitorStats::new());
        let mut flusher = BatchFlusher::new(
            store.clone(),
            Arc::new(BufferedChannel::new()),
            100,
            Duration::from_secs(60),
            Arc::clone(&stats),
        );

        let outcome = flusher.flush(vec![record("t1", TaskStatus::Received)]);
        assert_eq!(outcome, FlushOutcome::Dropped { entries: 1 });
        assert!(store.is_empty());
        assert_eq!(store.ops().last(), Some(&StoreOp::Release));

        let snap = stats.snapshot();
        assert_eq!(snap.batches_dropped, 1);
        assert_eq!(snap.entries_dropped, 1);

        // The next batch goes through normally.
        let outcome = flusher.flush(vec![record("t2", TaskStatus::Received)]);
        assert_eq!(outcome, FlushOutcome::Written { created: 1, updated: 0 });
    }

    #[test]
    fn failed_update_keeps_inserted_rows_in_the_count() {
        let store = InMemoryResultStore::new();
        store.seed(record("t1", TaskStatus::Received));
        store.fail_next_update(StoreError::Unavailable("db down".to_string()));
        let stats = Arc::new(MonitorStats::new());
        let mut flusher = BatchFlusher::new(
            store.clone(),
            Arc::new(BufferedChannel::new()),
            100,
            Duration::from_secs(60),
            Arc::clone(&stats),
        );

        let outcome = flusher.flush(vec![
            record("t1", TaskStatus::Started),
            record("t2", TaskStatus::Received),
        ]);
        assert_eq!(outcome, FlushOutcome::Partial { created: 1, dropped: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().status, TaskStatus::Received);
        assert_eq!(store.ops().last(), Some(&StoreOp::Release));

        let snap = stats.snapshot();
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.rows_created, 1);
        assert_eq!(snap.rows_updated, 0);
        assert_eq!(snap.batches_dropped, 1);
        assert_eq!(snap.entries_dropped, 1);
    }

    #[test]
    fn release_failure_does_not_stop_the_loop() {
        let store = InMemoryResultStore::new();
        store.fail_release(true);
        let (flusher, channel) = flusher(store.clone(), 1, Duration::from_secs(60));

        channel.push(record("t1", TaskStatus::Received)).unwrap();
        channel.push(record("t2", TaskStatus::Received)).unwrap();
        channel.close();

        flusher.run();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_flush_touches_nothing() {
        let store = InMemoryResultStore::new();
        let (mut flusher, _channel) = flusher(store.clone(), 10, Duration::from_secs(60));
        assert_eq!(flusher.flush(Vec::new()), FlushOutcome::Empty);
        assert!(store.ops().is_empty());
    }

    #[test]
    fn collapse_keeps_first_position_and_last_value() {
        let collapsed = collapse_by_task(vec![
            record("a", TaskStatus::Received),
            record("b", TaskStatus::Received),
            record("a", TaskStatus::Started),
        ]);
        let view: Vec<_> = collapsed
            .iter()
            .map(|r| (r.task_id.as_str(), r.status))
            .collect();
        assert_eq!(view, vec![("a", TaskStatus::Started), ("b", TaskStatus::Received)]);
    }
}
