//! Impls - ports のプロセス内実装
//!
//! # 含まれる実装
//! - **InMemoryResultStore**: テスト・開発用の結果ストア（操作ログと失敗注入つき）
//! - **JsonFileStore**: JSON ファイル 1 つを正本にする結果ストア（CLI 用）
//! - **JsonLinesSource**: 1 行 1 イベントの JSON を読むソース
//! - **ChannelSource**: mpsc でプロセス内から流し込むソース

pub mod channel_source;
pub mod json_file_store;
pub mod jsonl_source;
pub mod memory_store;

pub use self::channel_source::ChannelSource;
pub use self::json_file_store::JsonFileStore;
pub use self::jsonl_source::JsonLinesSource;
pub use self::memory_store::{InMemoryResultStore, StoreOp};
