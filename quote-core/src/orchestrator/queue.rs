//! Calculation Queue
//!
//! The set of pending recalculation requests, keyed by component type. At
//! most one task exists per type: a repeated request overwrites the existing
//! task instead of adding a second one.
//!
//! The queue is deliberately unordered. Execution order is computed at drain
//! time from the dependency graph.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::component::{ComponentType, Timestamp};

/// One pending recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledTask {
    pub component_type: ComponentType,
    pub priority: i32,
    /// Time of the most recent request for this type.
    pub requested_at: Timestamp,
    /// When the debounce window closes.
    pub deadline: Timestamp,
    /// Skip whatever is left of the debounce window.
    pub immediate: bool,
    /// Stamp of the most recent request. A drain pass only removes a task if
    /// the stamp is unchanged, so a request made mid-pass survives.
    pub seq: u64,
}

impl ScheduledTask {
    pub fn is_ready(&self, now: Timestamp) -> bool {
        self.immediate || self.deadline <= now
    }
}

/// How a request landed in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Created,
    Coalesced,
}

#[derive(Debug, Default)]
pub(crate) struct CalculationQueue {
    tasks: DashMap<ComponentType, ScheduledTask>,
    next_seq: AtomicU64,
}

impl CalculationQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A direct request: the latest priority, immediate flag and deadline
    /// win.
    pub(crate) fn request(
        &self,
        component: &ComponentType,
        priority: i32,
        immediate: bool,
        now: Timestamp,
        window: u64,
    ) -> Enqueued {
        let seq = self.next_seq();
        let deadline = now.saturating_add(window);

        match self.tasks.entry(component.clone()) {
            Entry::Occupied(mut entry) => {
                let task = entry.get_mut();
                task.priority = priority;
                task.immediate = immediate;
                task.requested_at = now;
                task.deadline = deadline;
                task.seq = seq;
                Enqueued::Coalesced
            }
            Entry::Vacant(entry) => {
                entry.insert(ScheduledTask {
                    component_type: component.clone(),
                    priority,
                    requested_at: now,
                    deadline,
                    immediate,
                    seq,
                });
                Enqueued::Created
            }
        }
    }

    /// A request made on behalf of an upstream change.
    ///
    /// Never makes an existing task less urgent: its priority only goes up
    /// and its immediate flag is kept.
    pub(crate) fn propagate(
        &self,
        component: &ComponentType,
        priority: i32,
        now: Timestamp,
        window: u64,
    ) -> Enqueued {
        let seq = self.next_seq();
        let deadline = now.saturating_add(window);

        match self.tasks.entry(component.clone()) {
            Entry::Occupied(mut entry) => {
                let task = entry.get_mut();
                task.priority = task.priority.max(priority);
                task.requested_at = now;
                task.deadline = task.deadline.max(deadline);
                task.seq = seq;
                Enqueued::Coalesced
            }
            Entry::Vacant(entry) => {
                entry.insert(ScheduledTask {
                    component_type: component.clone(),
                    priority,
                    requested_at: now,
                    deadline,
                    immediate: false,
                    seq,
                });
                Enqueued::Created
            }
        }
    }

    /// Copy of every pending task.
    pub(crate) fn snapshot(&self) -> Vec<ScheduledTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Remove `task` unless it was re-requested after it was snapshotted.
    pub(crate) fn consume(&self, task: &ScheduledTask) -> bool {
        self.tasks
            .remove_if(&task.component_type, |_, current| current.seq == task.seq)
            .is_some()
    }

    /// Earliest moment a pending task becomes ready.
    pub(crate) fn next_deadline(&self) -> Option<Timestamp> {
        self.tasks
            .iter()
            .map(|entry| {
                let task = entry.value();
                if task.immediate {
                    task.requested_at
                } else {
                    task.deadline
                }
            })
            .min()
    }

    pub(crate) fn get(&self, component: &ComponentType) -> Option<ScheduledTask> {
        self.tasks.get(component).map(|entry| entry.value().clone())
    }

    pub(crate) fn clear(&self) -> usize {
        let count = self.tasks.len();
        self.tasks.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}
