//! Timer plumbing shared by both simulators.
//!
//! Each simulator owns one [`TimerSlot`]. The slot holds at most one tokio
//! task; arming an occupied slot is refused, disarming aborts the task, and
//! dropping the slot disarms it. Two cadences are provided:
//! - [`fixed_period`]: tick every `period`, first tick one period after arming.
//! - [`rearming`]: sleep a given first delay, tick, then draw a fresh delay
//!   before every following tick.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Holder for a simulator's single timer task.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Whether a task is held and still running. A task that ended, for
    /// example by panicking, no longer counts.
    pub(crate) fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn `task` on the ambient tokio runtime.
    ///
    /// Returns `false` without spawning when the slot is already armed or no
    /// runtime is available.
    pub(crate) fn arm<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_armed() {
            return false;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                self.handle = Some(runtime.spawn(task));
                true
            }
            Err(e) => {
                log::warn!("no tokio runtime available, timer not armed: {e}");
                false
            }
        }
    }

    /// Abort the task, if any. Returns whether a task was running.
    pub(crate) fn disarm(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Call `on_tick` every `period`, starting one period from now.
pub(crate) fn fixed_period<F>(period: Duration, mut on_tick: F) -> impl Future<Output = ()> + Send
where
    F: FnMut() + Send + 'static,
{
    let first = Instant::now() + period;
    async move {
        let mut interval = tokio::time::interval_at(first, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            on_tick();
        }
    }
}

/// Sleep for `first`, call `on_tick`, then repeat with `next_delay()` before
/// every following tick.
pub(crate) fn rearming<D, F>(
    first: Duration,
    mut next_delay: D,
    mut on_tick: F,
) -> impl Future<Output = ()> + Send
where
    D: FnMut() -> Duration + Send + 'static,
    F: FnMut() + Send + 'static,
{
    async move {
        let mut delay = first;
        loop {
            log::trace!("next tick in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
            on_tick();
            delay = next_delay();
        }
    }
}
