//! InMemoryResultStore - 開発・テスト用の結果ストア
//!
//! # 学習ポイント
//! - Arc<Mutex<..>> を clone で共有し、flusher スレッドに move した後も外から観測できる
//! - 呼ばれた操作を [`StoreOp`] として記録する（バッチの分割を検証するため）
//! - 失敗注入（`fail_next`, `fail_next_update`, `fail_release`）
//! - Condvar で「行数が N に達するまで待つ」

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::{StoreError, TaskId, TaskRecord, UpdateField};
use crate::ports::ResultStore;

/// One call made against the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(Vec<TaskId>),
    Insert(Vec<TaskId>),
    Update(Vec<TaskId>, Vec<UpdateField>),
    Release,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<TaskId, TaskRecord>,
    ops: Vec<StoreOp>,
    fail_next: Option<StoreError>,
    fail_update: Option<StoreError>,
    fail_release: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Condvar>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a row directly, bypassing the op log.
    pub fn seed(&self, record: TaskRecord) {
        self.lock().rows.insert(record.task_id.clone(), record);
    }

    /// Make the next data call (exists / insert / update) fail with `error`.
    pub fn fail_next(&self, error: StoreError) {
        self.lock().fail_next = Some(error);
    }

    /// Make the next `bulk_update` fail, leaving exists and insert alone.
    pub fn fail_next_update(&self, error: StoreError) {
        self.lock().fail_update = Some(error);
    }

    /// Make every `release_connections` call fail.
    pub fn fail_release(&self, fail: bool) {
        self.lock().fail_release = fail;
    }

    pub fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.lock().rows.get(task_id).cloned()
    }

    pub fn rows(&self) -> Vec<TaskRecord> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at least `n` rows exist. Returns `false` on timeout.
    pub fn wait_for_rows(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while guard.rows.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn begin(&self, op: StoreOp) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut guard = self.lock();
        guard.ops.push(op);
        match guard.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }
}

fn ids_of(records: &[TaskRecord]) -> Vec<TaskId> {
    records.iter().map(|r| r.task_id.clone()).collect()
}

impl ResultStore for InMemoryResultStore {
    fn existing_ids(&mut self, ids: &[TaskId]) -> Result<HashSet<TaskId>, StoreError> {
        let guard = self.begin(StoreOp::Exists(ids.to_vec()))?;
        Ok(ids
            .iter()
            .filter(|id| guard.rows.contains_key(*id))
            .cloned()
            .collect())
    }

    fn bulk_insert(&mut self, records: &[TaskRecord]) -> Result<usize, StoreError> {
        let mut guard = self.begin(StoreOp::Insert(ids_of(records)))?;
        // Unique key on task_id: the whole insert fails, as a database would.
        let mut seen = HashSet::new();
        for record in records {
            if guard.rows.contains_key(&record.task_id) || !seen.insert(&record.task_id) {
                return Err(StoreError::Rejected(format!(
                    "duplicate key task_id={}",
                    record.task_id
                )));
            }
        }
        for record in records {
            guard.rows.insert(record.task_id.clone(), record.clone());
        }
        drop(guard);
        self.changed.notify_all();
        Ok(records.len())
    }

    fn bulk_update(
        &mut self,
        records: &[TaskRecord],
        fields: &[UpdateField],
    ) -> Result<usize, StoreError> {
        let mut guard = self.begin(StoreOp::Update(ids_of(records), fields.to_vec()))?;
        if let Some(err) = guard.fail_update.take() {
            return Err(err);
        }
        let mut written = 0;
        for record in records {
            if let Some(row) = guard.rows.get_mut(&record.task_id) {
                row.apply_fields(record, fields);
                written += 1;
            }
        }
        drop(guard);
        self.changed.notify_all();
        Ok(written)
    }

    fn release_connections(&mut self) -> Result<(), StoreError> {
        let mut guard = self.lock();
        guard.ops.push(StoreOp::Release);
        if guard.fail_release {
            return Err(StoreError::Unavailable("connection already gone".to_string()));
        }
        Ok(())
    }
}
