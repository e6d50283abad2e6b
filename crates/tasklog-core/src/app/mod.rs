//! App - アプリケーション層
//!
//! domain と ports を組み合わせて、イベント取り込みからバッチ永続化までを実装する。
//!
//! # 主要コンポーネント
//! - **EventStateReconstructor**: 生イベント → 集約ビュー → TaskRecord
//! - **Deduplicator**: 同じステータスの連続書き込みを抑制
//! - **BufferedChannel**: 取り込みスレッドと flush スレッドの受け渡し（センチネル付き）
//! - **BatchFlusher**: サイズ/時間で区切って結果ストアへ一括書き込み
//! - **TaskMonitor**: 上記のワイヤリングと起動・停止

pub mod channel;
pub mod dedup;
pub mod flusher;
pub mod monitor;
pub mod reconstructor;
pub mod state_table;
pub mod status;

// 主要な型を再エクスポート
pub use self::channel::{BufferedChannel, ChannelClosed, Pop};
pub use self::dedup::Deduplicator;
pub use self::flusher::{BatchFlusher, FlushOutcome};
pub use self::monitor::{MonitorHandle, MonitorPhase, TaskMonitor};
pub use self::reconstructor::EventStateReconstructor;
pub use self::state_table::{TaskStateTable, TaskView};
pub use self::status::{MonitorStats, StatsSnapshot};
