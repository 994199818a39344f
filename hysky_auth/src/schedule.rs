//! Deferred execution of refresh cycles

use std::{future::Future, pin::Pin, time::Duration};

/// A unit of work to run once its delay has elapsed
pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs tasks after a delay
///
/// Implementations decide the execution context. Every task handed to
/// [`schedule_once`][Scheduler::schedule_once] must eventually be run once
/// its delay has passed.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once, after `delay` has elapsed
    fn schedule_once(&self, delay: Duration, task: ScheduledTask);
}

/// A scheduler that spawns tasks on the ambient tokio runtime
///
/// Must be used from within a runtime context.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await
        });
    }
}
