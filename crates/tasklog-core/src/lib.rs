//! tasklog-core
//!
//! Buffered tracker for asynchronous task lifecycle events.
//!
//! イベントソースから届くタスクイベントを集約し、ステータスの変化だけを
//! バッチで結果ストアへ書き込む。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, TaskStatus, TaskRecord, RawEvent, errors）
//! - **ports**: 抽象化レイヤー（EventSource, ResultStore, Clock）
//! - **app**: reconstructor, dedup, channel, flusher, monitor
//! - **impls**: ports のプロセス内実装（InMemoryResultStore, JsonFileStore, JsonLinesSource, ChannelSource）
//! - **config**: 環境変数からの設定読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{MonitorHandle, MonitorPhase, StatsSnapshot, TaskMonitor};
pub use config::MonitorConfig;
