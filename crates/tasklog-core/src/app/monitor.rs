//! TaskMonitor - 取り込みと flush のワイヤリング、ライフサイクル管理
//!
//! # スレッド構成
//! - 取り込みスレッド: `start()` を呼んだスレッド。EventSource の capture 内でブロックし、
//!   reconstructor → dedup → channel.push を同期的に実行する
//! - flush スレッド: `start()` が起動する `tasklog-flusher`
//!
//! # 状態遷移
//! `Created → Running → Stopping → Stopped`
//! - Stopping → Stopped は flush スレッドの join（= 最終 flush）完了後のみ
//! - `stop()` はどのスレッドからでも呼べる。二重に呼んでも Stopped まで待って戻る

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use super::channel::BufferedChannel;
use super::flusher::BatchFlusher;
use super::reconstructor::EventStateReconstructor;
use super::status::{MonitorStats, StatsSnapshot};
use crate::config::MonitorConfig;
use crate::domain::{MonitorError, TaskRecord};
use crate::ports::{Clock, EventSource, ResultStore, StopSignal, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// State shared by the monitor, its handles, and the shutdown path.
struct Lifecycle {
    phase: Mutex<MonitorPhase>,
    phase_changed: Condvar,
    stop: StopSignal,
    channel: Arc<BufferedChannel<TaskRecord>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<MonitorStats>,
}

impl Lifecycle {
    fn lock_phase(&self) -> MutexGuard<'_, MonitorPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: MonitorPhase) {
        *self.lock_phase() = phase;
        self.phase_changed.notify_all();
    }

    /// Stop flag, sentinel, join. Returns once the phase is `Stopped`.
    fn shutdown(&self) {
        {
            let mut phase = self.lock_phase();
            loop {
                match *phase {
                    MonitorPhase::Created => {
                        *phase = MonitorPhase::Stopped;
                        self.stop.raise();
                        self.channel.close();
                        self.phase_changed.notify_all();
                        return;
                    }
                    MonitorPhase::Running => {
                        *phase = MonitorPhase::Stopping;
                        break;
                    }
                    MonitorPhase::Stopping => {
                        phase = self
                            .phase_changed
                            .wait(phase)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    MonitorPhase::Stopped => return,
                }
            }
        }

        info!("stopping task monitor");
        self.stop.raise();
        self.channel.close();

        let handle = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("flusher thread panicked; buffered records may be lost");
        }

        self.set_phase(MonitorPhase::Stopped);
        info!(stats = ?self.stats.snapshot(), "task monitor stopped");
    }
}

/// Cloneable remote control for a [`TaskMonitor`].
///
/// Hand this to a signal handler or another thread; `stop()` blocks until the
/// final flush has completed.
#[derive(Clone)]
pub struct MonitorHandle {
    lifecycle: Arc<Lifecycle>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.lifecycle.shutdown();
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.lifecycle.lock_phase()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.lifecycle.stats.snapshot()
    }
}

/// Buffered task-event tracker.
///
/// # 使用例
/// ```ignore
/// let mut monitor = TaskMonitor::new(MonitorConfig::default(), store);
/// let handle = monitor.handle();
/// // elsewhere: handle.stop();
/// monitor.start(&mut source)?;
/// ```
pub struct TaskMonitor {
    config: MonitorConfig,
    store: Option<Box<dyn ResultStore>>,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<Lifecycle>,
}

impl TaskMonitor {
    pub fn new<S: ResultStore + 'static>(config: MonitorConfig, store: S) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock<S: ResultStore + 'static>(
        config: MonitorConfig,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lifecycle = Lifecycle {
            phase: Mutex::new(MonitorPhase::Created),
            phase_changed: Condvar::new(),
            stop: StopSignal::new(),
            channel: Arc::new(BufferedChannel::new()),
            flusher: Mutex::new(None),
            stats: Arc::new(MonitorStats::new()),
        };
        Self {
            config,
            store: Some(Box::new(store)),
            clock,
            lifecycle: Arc::new(lifecycle),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.lifecycle.lock_phase()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.lifecycle.stats.snapshot()
    }

    /// Start the flusher thread, then capture events on the calling thread
    /// until the source ends or a stop is requested.
    ///
    /// The shutdown sequence (sentinel + join) always runs before this
    /// returns, including when the source fails.
    pub fn start(&mut self, source: &mut dyn EventSource) -> Result<(), MonitorError> {
        self.launch_flusher()?;

        info!(
            batch_size = self.config.batch_size(),
            flush_interval = ?self.config.flush_interval(),
            "starting task monitor"
        );
        let mut reconstructor = EventStateReconstructor::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.lifecycle.channel),
            Arc::clone(&self.lifecycle.stats),
        );
        let captured = source.capture(&mut reconstructor, &self.lifecycle.stop);
        if let Err(e) = &captured {
            error!(error = %e, "event capture failed");
        }

        self.lifecycle.shutdown();
        captured.map_err(MonitorError::from)
    }

    pub fn stop(&self) {
        self.lifecycle.shutdown();
    }

    fn launch_flusher(&mut self) -> Result<(), MonitorError> {
        let mut phase = self.lifecycle.lock_phase();
        if *phase != MonitorPhase::Created {
            return Err(MonitorError::AlreadyStarted);
        }
        let store = self.store.take().ok_or(MonitorError::AlreadyStarted)?;

        let flusher = BatchFlusher::new(
            store,
            Arc::clone(&self.lifecycle.channel),
            self.config.batch_size(),
            self.config.flush_interval(),
            Arc::clone(&self.lifecycle.stats),
        );
        let spawned = thread::Builder::new()
            .name("tasklog-flusher".to_string())
            .spawn(move || {
                flusher.run();
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *phase = MonitorPhase::Stopped;
                self.lifecycle.phase_changed.notify_all();
                return Err(MonitorError::Spawn(e));
            }
        };

        *self
            .lifecycle
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *phase = MonitorPhase::Running;
        self.lifecycle.phase_changed.notify_all();
        Ok(())
    }
}
