//! Timer driver
//!
//! Debounce deadlines are plain timestamps on the orchestrator's clock, so
//! callers can drain by hand. This module runs the drain automatically on a
//! tokio task: it sleeps until the earliest pending deadline and wakes early
//! whenever a new request arrives.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::{Orchestrator, PassOutcome};

/// Owns the background drain task. Dropping the handle stops the task.
#[derive(Debug)]
#[must_use = "the timer stops when its handle is dropped"]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the driver. Pending tasks stay queued.
    pub fn stop(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Orchestrator {
    /// Start draining automatically on the current tokio runtime.
    ///
    /// Must be called from within a runtime. The task keeps the orchestrator
    /// alive until the returned handle is dropped.
    pub fn spawn_timer(self: &Arc<Self>) -> TimerHandle {
        let orchestrator = Arc::downgrade(self);
        TimerHandle {
            task: tokio::spawn(drive(orchestrator)),
        }
    }
}

async fn drive(orchestrator: Weak<Orchestrator>) {
    debug!("calculation timer started");
    loop {
        let Some(this) = orchestrator.upgrade() else {
            break;
        };

        let woken = this.wake.notified();
        tokio::pin!(woken);
        // Register before reading the queue so a request made in between
        // still wakes us.
        woken.as_mut().enable();

        let Some(deadline) = this.next_deadline() else {
            woken.await;
            continue;
        };

        let wait = deadline.saturating_sub(this.clock.now());
        if wait > 0 {
            trace!(wait_ms = wait, "waiting for debounce deadline");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
                _ = &mut woken => continue,
            }
        }

        match this.process_calculation_queue() {
            Ok(PassOutcome::AlreadyProcessing) => tokio::task::yield_now().await,
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "drain pass failed");
                woken.await;
            }
        }
    }
    debug!("calculation timer stopped");
}
