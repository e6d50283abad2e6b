//! ResultStore port - タスク結果の永続化先（正本）
//!
//! flusher が必要とする 4 操作だけを持つ:
//! - `existing_ids`: task_id の一括存在確認
//! - `bulk_insert`: 新規行の一括作成
//! - `bulk_update`: 既存行の一括更新（更新カラムを指定）
//! - `release_connections`: バッチごとの接続解放（冪等）
//!
//! スキーマやクエリ層はこのクレートの範囲外。

use std::collections::HashSet;

use crate::domain::{StoreError, TaskId, TaskRecord, UpdateField};

/// Durable store for task records, driven from the flusher thread only.
///
/// `Send` so it can be moved into the flusher thread; no `Sync` requirement
/// because a single thread owns it.
pub trait ResultStore: Send {
    /// Subset of `ids` that already have a row.
    fn existing_ids(&mut self, ids: &[TaskId]) -> Result<HashSet<TaskId>, StoreError>;

    /// Insert new rows. Returns the number of rows written.
    fn bulk_insert(&mut self, records: &[TaskRecord]) -> Result<usize, StoreError>;

    /// Overwrite `fields` on existing rows matched by `task_id`. Returns the
    /// number of rows written.
    fn bulk_update(
        &mut self,
        records: &[TaskRecord],
        fields: &[UpdateField],
    ) -> Result<usize, StoreError>;

    /// Drop any connection this thread holds. Called after every flush,
    /// successful or not; must be safe to call repeatedly.
    fn release_connections(&mut self) -> Result<(), StoreError>;
}

impl<S: ResultStore + ?Sized> ResultStore for Box<S> {
    fn existing_ids(&mut self, ids: &[TaskId]) -> Result<HashSet<TaskId>, StoreError> {
        (**self).existing_ids(ids)
    }

    fn bulk_insert(&mut self, records: &[TaskRecord]) -> Result<usize, StoreError> {
        (**self).bulk_insert(records)
    }

    fn bulk_update(
        &mut self,
        records: &[TaskRecord],
        fields: &[UpdateField],
    ) -> Result<usize, StoreError> {
        (**self).bulk_update(records, fields)
    }

    fn release_connections(&mut self) -> Result<(), StoreError> {
        (**self).release_connections()
    }
}
