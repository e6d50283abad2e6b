//! ChannelSource - プロセス内から mpsc でイベントを流し込むソース
//!
//! ブローカー接続を持たない埋め込み用途とテスト用。
//! `wakeup` 間隔ごとに stop を確認するので、別スレッドからの停止要求に追従できる。

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::domain::{RawEvent, SourceError};
use crate::ports::{EventHandler, EventSource, StopSignal};

const DEFAULT_WAKEUP: Duration = Duration::from_millis(100);

pub struct ChannelSource {
    rx: Receiver<RawEvent>,
    wakeup: Duration,
}

impl ChannelSource {
    /// A source plus the sender that feeds it. Dropping every sender ends the
    /// capture once queued events are delivered.
    pub fn new() -> (Self, Sender<RawEvent>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                wakeup: DEFAULT_WAKEUP,
            },
            tx,
        )
    }

    pub fn with_wakeup(mut self, wakeup: Duration) -> Self {
        self.wakeup = wakeup;
        self
    }
}

impl EventSource for ChannelSource {
    fn capture(
        &mut self,
        handler: &mut dyn EventHandler,
        stop: &StopSignal,
    ) -> Result<(), SourceError> {
        while !stop.is_raised() {
            match self.rx.recv_timeout(self.wakeup) {
                Ok(event) => handler.on_event(event.kind(), event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}
