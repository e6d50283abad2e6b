//! JsonLinesSource - 1 行 1 イベントの JSON を読むイベントソース
//!
//! ブローカーから吐き出したイベントログの再生や、パイプでの受け取りに使う。
//! 壊れた行は警告を出して読み飛ばす（1 件の不正でキャプチャを止めない）。

use std::io::BufRead;

use tracing::warn;

use crate::domain::{RawEvent, SourceError};
use crate::ports::{EventHandler, EventSource, StopSignal};

pub struct JsonLinesSource<R> {
    reader: R,
    line_no: u64,
    skipped: u64,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines that could not be decoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead> EventSource for JsonLinesSource<R> {
    fn capture(
        &mut self,
        handler: &mut dyn EventHandler,
        stop: &StopSignal,
    ) -> Result<(), SourceError> {
        let mut line = Vec::new();
        while !stop.is_raised() {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            self.line_no += 1;

            let text = line.trim_ascii();
            if text.is_empty() {
                continue;
            }
            // Bytes, not str: a line of invalid UTF-8 is one bad event, not a broken stream.
            match serde_json::from_slice::<RawEvent>(text) {
                Ok(event) => handler.on_event(event.kind(), event),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "malformed event, skipping");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;
    use std::io::Cursor;

    #[derive(Default)]
    struct Collect(Vec<(EventKind, RawEvent)>);

    impl EventHandler for Collect {
        fn on_event(&mut self, kind: EventKind, event: RawEvent) {
            self.0.push((kind, event));
        }
    }

    #[test]
    fn delivers_each_line_and_skips_garbage() {
        let input = concat!(
            r#"{"type":"task-received","uuid":"t1","name":"vod.encode"}"#,
            "\n\n",
            "{not json\n",
            r#"{"uuid":"no-type"}"#,
            "\n",
            r#"{"type":"worker-heartbeat","hostname":"celery@a"}"#,
            "\n",
        );
        let mut source = JsonLinesSource::new(Cursor::new(input));
        let mut sink = Collect::default();
        source.capture(&mut sink, &StopSignal::new()).unwrap();

        assert_eq!(sink.0.len(), 2);
        assert!(matches!(sink.0[0].0, EventKind::Task(_)));
        assert_eq!(sink.0[1].0, EventKind::Other("worker-heartbeat".to_string()));
        assert_eq!(source.skipped(), 2);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_not_fatal() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"type":"task-received","uuid":"t1"}"#);
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(br#"{"type":"task-started","uuid":"t1"}"#);
        input.push(b'\n');

        let mut source = JsonLinesSource::new(Cursor::new(input));
        let mut sink = Collect::default();
        source.capture(&mut sink, &StopSignal::new()).unwrap();

        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[1].1.event_type, "task-started");
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn raised_stop_ends_capture_before_reading() {
        let input = r#"{"type":"task-received","uuid":"t1"}"#;
        let mut source = JsonLinesSource::new(Cursor::new(input));
        let mut sink = Collect::default();
        let stop = StopSignal::new();
        stop.raise();
        source.capture(&mut sink, &stop).unwrap();
        assert!(sink.0.is_empty());
    }
}
