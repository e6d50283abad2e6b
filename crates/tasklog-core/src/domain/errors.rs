//! Errors - エラー型と分類
//!
//! # 分類
//! - [`StoreError`]: 結果ストアへの書き込み失敗（flusher がログに残してバッチを破棄する）
//! - [`SourceError`]: イベントソースの致命的な失敗（capture が終了する）
//! - [`ConfigError`]: 設定値の検証エラー（起動前に Fail-fast）
//! - [`MonitorError`]: ライフサイクル操作のエラー
//!
//! 壊れたイベント 1 件のような一時的な問題はエラーにせず、その場でログに残して続行する。

use thiserror::Error;

/// Failure of a result store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),

    #[error("result store rejected the write: {0}")]
    Rejected(String),

    #[error("result store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("result store encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure that ends an event capture.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("event source i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("batch_size must be >= 1 (got {0})")]
    InvalidBatchSize(usize),

    #[error("flush_interval must be greater than zero")]
    InvalidFlushInterval,

    #[error("environment: {0}")]
    Env(#[from] envconfig::Error),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor was already started or stopped")]
    AlreadyStarted,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to spawn flusher thread: {0}")]
    Spawn(std::io::Error),
}
