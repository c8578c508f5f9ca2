//! One-shot timers used by the debounce gate.
//!
//! A [`Timer`] runs a task once after a delay, unless the returned
//! [`TimerHandle`] is cancelled (or dropped) first. Cancellation is
//! best-effort: a task that has already started is not interrupted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;

pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Shared cancellation flag between a handle and its scheduled task
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancels the scheduled task when cancelled or dropped.
pub struct TimerHandle {
    token: CancelToken,
    wake: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(token: CancelToken) -> Self {
        Self { token, wake: None }
    }

    /// `wake` runs on cancellation, to release whatever the task waits on.
    pub fn with_waker(token: CancelToken, wake: impl FnOnce() + Send + 'static) -> Self {
        Self {
            token,
            wake: Some(Box::new(wake)),
        }
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(wake) = self.wake.take() {
            wake();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Each scheduled task gets its own thread that waits on a channel with a
/// timeout; cancelling the handle wakes it early.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimer;

impl ThreadTimer {
    pub fn new() -> Self {
        Self
    }
}

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let token = CancelToken::new();
        let thread_token = token.clone();
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);

        let spawned = thread::Builder::new()
            .name("turntable-timer".to_string())
            .spawn(move || {
                match wake_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) if !thread_token.is_cancelled() => task(),
                    _ => log::trace!("Timer cancelled before firing"),
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn timer thread: {}", e);
        }

        TimerHandle::with_waker(token, move || {
            let _ = wake_tx.try_send(());
        })
    }
}

/// Schedules tasks on a tokio runtime. The task body runs on the blocking
/// pool since it usually takes the player lock.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: tokio::runtime::Handle,
}

impl TokioTimer {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Timer on the runtime of the calling context, if there is one
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let token = CancelToken::new();
        let task_token = token.clone();

        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_token.is_cancelled() {
                return;
            }
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                log::error!("Timer task panicked: {}", e);
            }
        });
        let abort = join.abort_handle();

        TimerHandle::with_waker(token, move || abort.abort())
    }
}

/// Timer that only fires when told to. Lets callers drive debounce timing
/// deterministically (tests, simulations).
#[derive(Default)]
pub struct ManualTimer {
    scheduled: Mutex<Vec<Scheduled>>,
}

struct Scheduled {
    delay: Duration,
    token: CancelToken,
    task: TimerTask,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of scheduled tasks that have not been cancelled
    pub fn pending(&self) -> usize {
        self.scheduled
            .lock()
            .iter()
            .filter(|s| !s.token.is_cancelled())
            .count()
    }

    /// Delays of the live scheduled tasks, oldest first
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.scheduled
            .lock()
            .iter()
            .filter(|s| !s.token.is_cancelled())
            .map(|s| s.delay)
            .collect()
    }

    /// Run every live task. Returns how many ran.
    pub fn fire_all(&self) -> usize {
        // Tasks may schedule again, so the lock is released before running them
        let due: Vec<Scheduled> = std::mem::take(&mut *self.scheduled.lock());
        let mut ran = 0;
        for scheduled in due {
            if !scheduled.token.is_cancelled() {
                (scheduled.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Run every task, including cancelled ones.
    ///
    /// Models a timer that was superseded just as it started firing.
    pub fn fire_all_ignoring_cancellation(&self) -> usize {
        let due: Vec<Scheduled> = std::mem::take(&mut *self.scheduled.lock());
        let ran = due.len();
        for scheduled in due {
            (scheduled.task)();
        }
        ran
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let token = CancelToken::new();
        self.scheduled.lock().push(Scheduled {
            delay,
            token: token.clone(),
            task,
        });
        TimerHandle::new(token)
    }
}
