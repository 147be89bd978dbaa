//! Idle timer scheduling.
//!
//! The coordinator only needs "run this once after a delay, unless
//! cancelled". [`TokioScheduler`] does that on a tokio runtime;
//! [`ManualScheduler`] lets an embedder (or a test) decide when timers fire.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::LookupError;

/// Work run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send>;

/// A scheduled timer.
pub trait TimerHandle: Send {
    /// Prevent the task from running. Cancelling a fired timer does nothing.
    fn cancel(self: Box<Self>);
}

/// Delayed task scheduler.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    ///
    /// Called with the coordinator state locked: `task` must not run before
    /// this method returns.
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

// =============================================================================
// Tokio
// =============================================================================

/// Scheduler spawning one sleeping task per timer.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling task.
    pub fn current() -> Result<Self, LookupError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(join)
    }
}

impl TimerHandle for JoinHandle<()> {
    fn cancel(self: Box<Self>) {
        self.abort();
    }
}

// =============================================================================
// Manual
// =============================================================================

struct ManualTimer {
    id: u64,
    delay: Duration,
    task: TimerTask,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Scheduler whose timers fire only when told to.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

struct ManualHandle {
    id: u64,
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Delays of the armed timers, oldest first.
    pub fn delays(&self) -> Vec<Duration> {
        self.state.lock().timers.iter().map(|t| t.delay).collect()
    }

    /// Fire every armed timer. Returns how many fired.
    pub fn fire_all(&self) -> usize {
        let timers = std::mem::take(&mut self.state.lock().timers);
        let fired = timers.len();
        for timer in timers {
            (timer.task)();
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.timers.push(ManualTimer { id, delay, task });
        Box::new(ManualHandle {
            id,
            state: self.state.clone(),
        })
    }
}

impl TimerHandle for ManualHandle {
    fn cancel(self: Box<Self>) {
        self.state.lock().timers.retain(|t| t.id != self.id);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("armed", &self.armed())
            .finish()
    }
}
