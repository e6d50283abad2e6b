//! EventSource port - タスクイベントの購読
//!
//! 実際のメッセージブローカー（AMQP など）の接続はこのクレートの外側。
//! ここでは「capture を呼ぶとブロックし、届いたイベントをハンドラに渡し続ける」
//! という最小限の契約だけを定義する。
//!
//! # 配信セマンティクス
//! - at-least-once（重複あり）、順序入れ替わりあり
//! - 「いずれ届く」以上の保証は仮定しない

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{EventKind, RawEvent, SourceError};

/// Receives every event the source delivers.
///
/// The source parses the event type once and passes the typed [`EventKind`];
/// named task events and the wildcard both arrive through this one entry
/// point, and the implementor matches on the kind.
pub trait EventHandler {
    fn on_event(&mut self, kind: EventKind, event: RawEvent);
}

/// A subscription that blocks the calling thread while delivering events.
pub trait EventSource {
    /// Deliver events to `handler` until the source is exhausted or `stop`
    /// is raised.
    ///
    /// Implementations must check `stop` at least once per wake-up so that a
    /// stop request from another thread ends the capture promptly.
    fn capture(
        &mut self,
        handler: &mut dyn EventHandler,
        stop: &StopSignal,
    ) -> Result<(), SourceError>;
}

/// Cooperative stop flag shared between the capture loop and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
