//! Delayed and recurring task scheduling over the Tokio timer.
//!
//! The correlator arms one delayed task per declared reaction timeout,
//! and the lifecycle layer drives its heartbeat loop off a recurring
//! task. Both come with a [`TaskHandle`] so the winner of a
//! receive/timeout race can cancel the loser.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Handle to a scheduled task; cancelling aborts the underlying
/// Tokio task. Cancelling an already-finished task is a no-op.
#[derive(Debug)]
pub struct TaskHandle {
    inner: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Cancels the task. Safe to call more than once.
    pub fn cancel(&self) {
        self.inner.abort();
    }

    /// Whether the task has already run to completion or been aborted.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Schedules callbacks on the Tokio runtime.
///
/// Stateless — each correlator owns one so the scheduling surface can
/// be swapped or instrumented per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutScheduler;

impl TimeoutScheduler {
    /// Creates a scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Runs `task` once after `delay`.
    pub fn run_later(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> TaskHandle {
        TaskHandle {
            inner: tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            }),
        }
    }

    /// Runs `task` every `every`, starting one interval from now.
    pub fn run_interval(
        &self,
        every: Duration,
        mut task: impl FnMut() + Send + 'static,
    ) -> TaskHandle {
        TaskHandle {
            inner: tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick of a Tokio interval fires immediately.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    task();
                }
            }),
        }
    }
}
