//! BufferedChannel - 取り込みスレッドと flush スレッドの受け渡し口
//!
//! # 学習ポイント
//! - Mutex + Condvar による timeout 付き blocking pop
//! - push は絶対にブロックしない（容量無制限）
//! - close() が「センチネルの投入」に相当する
//!
//! # センチネルの扱い
//! センチネルを値としてキューに積む代わりに `closed` フラグを持つ。
//! close 前に積まれたエントリは全て FIFO で取り出され、空になった時点で
//! [`Pop::Sentinel`] が返る。論理的には「末尾にセンチネルがある」のと同じ。

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of a timed [`BufferedChannel::pop`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pop<T> {
    Item(T),
    /// The channel was closed and everything pushed before the close has
    /// been handed out.
    Sentinel,
    /// Nothing arrived within the timeout.
    TimedOut,
}

/// Returned by `push` after `close`; gives the entry back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelClosed<T>(pub T);

impl<T> fmt::Display for ChannelClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel closed")
    }
}

impl<T: fmt::Debug> std::error::Error for ChannelClosed<T> {}

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Unbounded single-producer/single-consumer FIFO with a shutdown marker.
///
/// Nothing stops several producers or consumers from sharing it, but the
/// monitor only ever uses one of each, which is what gives per-task ordering.
pub struct BufferedChannel<T> {
    state: Mutex<ChannelState<T>>,
    condvar: Condvar,
}

impl<T> BufferedChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        // A panicking holder cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without blocking.
    pub fn push(&self, item: T) -> Result<(), ChannelClosed<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(ChannelClosed(item));
        }
        state.queue.push_back(item);
        drop(state);
        self.condvar.notify_one();
        Ok(())
    }

    /// Push the sentinel. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dequeue, waiting at most `timeout`.
    pub fn pop(&self, timeout: Duration) -> Pop<T> {
        let start = Instant::now();
        let mut guard = self.lock();
        loop {
            if let Some(item) = guard.queue.pop_front() {
                return Pop::Item(item);
            }
            if guard.closed {
                return Pop::Sentinel;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Pop::TimedOut;
            }
            let remaining = timeout - elapsed;
            let (new_guard, _result) = self
                .condvar
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            guard = new_guard;
            // Spurious wake-ups and timeouts both loop back: the queue and
            // the deadline are re-checked at the top.
        }
    }
}

impl<T> Default for BufferedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_is_fifo() {
        let channel = BufferedChannel::new();
        channel.push(1).unwrap();
        channel.push(2).unwrap();
        channel.push(3).unwrap();
        assert_eq!(channel.len(), 3);
        assert_eq!(channel.pop(Duration::from_millis(10)), Pop::Item(1));
        assert_eq!(channel.pop(Duration::from_millis(10)), Pop::Item(2));
        assert_eq!(channel.pop(Duration::from_millis(10)), Pop::Item(3));
        assert!(channel.is_empty());
    }

    #[test]
    fn pop_times_out_when_empty() {
        let channel: BufferedChannel<u32> = BufferedChannel::new();
        let start = Instant::now();
        let popped = channel.pop(Duration::from_millis(200));
        assert_eq!(popped, Pop::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn close_drains_queue_before_sentinel() {
        let channel = BufferedChannel::new();
        channel.push("a").unwrap();
        channel.push("b").unwrap();
        channel.close();
        channel.close();

        assert_eq!(channel.pop(Duration::from_secs(1)), Pop::Item("a"));
        assert_eq!(channel.pop(Duration::from_secs(1)), Pop::Item("b"));
        assert_eq!(channel.pop(Duration::from_secs(1)), Pop::Sentinel);
        assert_eq!(channel.pop(Duration::from_secs(1)), Pop::Sentinel);
    }

    #[test]
    fn push_after_close_returns_the_entry() {
        let channel = BufferedChannel::new();
        channel.close();
        assert_eq!(channel.push(7), Err(ChannelClosed(7)));
        assert!(channel.is_closed());
        assert!(channel.is_empty());
    }

    #[test]
    fn push_wakes_waiting_pop() {
        let channel = Arc::new(BufferedChannel::new());
        let consumer = thread::spawn({
            let channel = Arc::clone(&channel);
            move || channel.pop(Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(100));
        let start = Instant::now();
        channel.push(42).unwrap();

        assert_eq!(consumer.join().unwrap(), Pop::Item(42));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn close_wakes_waiting_pop() {
        let channel: Arc<BufferedChannel<u32>> = Arc::new(BufferedChannel::new());
        let consumer = thread::spawn({
            let channel = Arc::clone(&channel);
            move || channel.pop(Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(100));
        let start = Instant::now();
        channel.close();

        assert_eq!(consumer.join().unwrap(), Pop::Sentinel);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
