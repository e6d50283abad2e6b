//! Deduplicator - 冗長な書き込みの抑制
//!
//! task_id ごとに「最後に enqueue したステータス」を覚えておき、
//! 同じステータスが連続した場合は書き込みを捨てる。
//!
//! # スレッドモデル
//! 取り込みスレッドからのみ呼ばれるので、ロックは持たない（`&mut self`）。
//!
//! # メモリ
//! 一度見た task_id は消さない。長時間稼働では task_id の数に比例して増える。

use std::collections::HashMap;

use crate::domain::{TaskId, TaskStatus};

#[derive(Debug, Default)]
pub struct Deduplicator {
    last_status: HashMap<TaskId, TaskStatus>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` (and no change) when `status` equals the last status recorded
    /// for `task_id`; otherwise records it and returns `true`.
    pub fn should_persist(&mut self, task_id: &TaskId, status: TaskStatus) -> bool {
        if self.last_status.get(task_id) == Some(&status) {
            return false;
        }
        self.last_status.insert(task_id.clone(), status);
        true
    }

    pub fn last_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.last_status.get(task_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use crate::domain::TaskStatus::*;

    fn count_persisted(dedup: &mut Deduplicator, id: &str, statuses: &[TaskStatus]) -> usize {
        let id = TaskId::new(id);
        statuses
            .iter()
            .filter(|status| dedup.should_persist(&id, **status))
            .count()
    }

    #[rstest]
    #[case::repeated_started(&[Received, Started, Started, Started], 2)]
    #[case::all_distinct(&[Received, Started, Success], 3)]
    #[case::retry_loop(&[Received, Started, Retry, Started, Success], 5)]
    #[case::duplicate_terminal(&[Success, Success], 1)]
    #[case::empty(&[], 0)]
    fn consecutive_repeats_are_suppressed(#[case] statuses: &[TaskStatus], #[case] expected: usize) {
        let mut dedup = Deduplicator::new();
        assert_eq!(count_persisted(&mut dedup, "t1", statuses), expected);
    }

    #[test]
    fn suppressed_write_leaves_map_unchanged() {
        let mut dedup = Deduplicator::new();
        let id = TaskId::new("t1");
        assert!(dedup.should_persist(&id, Started));
        assert!(!dedup.should_persist(&id, Started));
        assert_eq!(dedup.last_status(&id), Some(Started));
    }

    #[test]
    fn task_ids_are_tracked_independently() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.should_persist(&TaskId::new("t1"), Received));
        assert!(dedup.should_persist(&TaskId::new("t2"), Received));
        assert!(!dedup.should_persist(&TaskId::new("t1"), Received));
        assert_eq!(dedup.last_status(&TaskId::new("t2")), Some(Received));
    }
}
