//! Ports - 外部システムとの境界
//!
//! このクレートが「使う側」として要求するインターフェースだけを定義する。
//! メッセージブローカーやデータベースの実装はこのクレートの外側に置く。
//!
//! - **EventSource**: タスクイベントの購読（ブロッキング capture）
//! - **ResultStore**: タスク結果の正本（存在確認・一括作成・一括更新・接続解放）
//! - **Clock**: 時刻（`date_done` の付与）

pub mod clock;
pub mod event_source;
pub mod result_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_source::{EventHandler, EventSource, StopSignal};
pub use self::result_store::ResultStore;
