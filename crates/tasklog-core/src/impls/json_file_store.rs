//! JsonFileStore - JSON ファイル 1 つを正本とする結果ストア
//!
//! 単一プロセスの CLI 用。ファイルの中身は `task_id -> TaskRecord` のオブジェクト。
//!
//! # 「接続」の扱い
//! 最初の操作でファイルを読み込み、メモリ上に保持する（これを接続とみなす）。
//! `release_connections` で破棄し、次のバッチでは読み直す。
//! 書き込みは同じディレクトリの一時ファイルに書いてから rename する。
//! 失敗時は一時ファイルを消し、メモリ上の変更も捨てる（次の操作で読み直す）。

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::{StoreError, TaskId, TaskRecord, UpdateField};
use crate::ports::ResultStore;

type Rows = BTreeMap<TaskId, TaskRecord>;

pub struct JsonFileStore {
    path: PathBuf,
    loaded: Option<Rows>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored row straight from disk.
    pub fn read_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(read_rows(&self.path)?.into_values().collect())
    }

    fn rows(&mut self) -> Result<&mut Rows, StoreError> {
        if self.loaded.is_none() {
            debug!(path = %self.path.display(), "loading result store");
            self.loaded = Some(read_rows(&self.path)?);
        }
        Ok(self.loaded.get_or_insert_with(Rows::new))
    }

    /// Write the cached rows back. On failure the cache is dropped so the
    /// next call sees what is actually on disk.
    fn persist(&mut self) -> Result<(), StoreError> {
        let written = match &self.loaded {
            Some(rows) => write_rows(&self.path, rows),
            None => Ok(()),
        };
        if written.is_err() {
            self.loaded = None;
        }
        written
    }
}

fn read_rows(path: &Path) -> Result<Rows, StoreError> {
    match File::open(path) {
        Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Rows::new()),
        Err(e) => Err(e.into()),
    }
}

/// Dropping the `NamedTempFile` on an early return removes it.
fn write_rows(path: &Path, rows: &Rows) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, rows)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl ResultStore for JsonFileStore {
    fn existing_ids(&mut self, ids: &[TaskId]) -> Result<HashSet<TaskId>, StoreError> {
        let rows = self.rows()?;
        Ok(ids.iter().filter(|id| rows.contains_key(*id)).cloned().collect())
    }

    fn bulk_insert(&mut self, records: &[TaskRecord]) -> Result<usize, StoreError> {
        let rows = self.rows()?;
        if let Some(dup) = records.iter().find(|r| rows.contains_key(&r.task_id)) {
            return Err(StoreError::Rejected(format!(
                "duplicate key task_id={}",
                dup.task_id
            )));
        }
        for record in records {
            rows.insert(record.task_id.clone(), record.clone());
        }
        self.persist()?;
        Ok(records.len())
    }

    fn bulk_update(
        &mut self,
        records: &[TaskRecord],
        fields: &[UpdateField],
    ) -> Result<usize, StoreError> {
        let rows = self.rows()?;
        let mut written = 0;
        for record in records {
            if let Some(row) = rows.get_mut(&record.task_id) {
                row.apply_fields(record, fields);
                written += 1;
            }
        }
        self.persist()?;
        Ok(written)
    }

    fn release_connections(&mut self) -> Result<(), StoreError> {
        self.loaded = None;
        Ok(())
    }
}
