//! Calculation history and performance metrics.
//!
//! Every executed calculation leaves one entry in a bounded ring buffer.
//! Once the buffer is full the oldest entry is evicted. Metrics are always
//! derived from what is currently in the buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::component::{ComponentType, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalculationHistoryEntry {
    pub component_type: ComponentType,
    pub duration: Duration,
    /// When the calculation started, on the orchestrator's clock.
    pub timestamp: Timestamp,
    pub succeeded: bool,
    /// Number of the drain pass that ran this calculation.
    pub pass: u64,
}

/// Aggregates for one component type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentMetrics {
    pub calculations: usize,
    pub failures: usize,
    pub average_duration: Duration,
    pub max_duration: Duration,
    pub last_duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_calculations: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration: Duration,
    pub max_duration: Duration,
    /// Completed drain passes since construction (not bounded).
    pub total_passes: u64,
    pub per_component: IndexMap<ComponentType, ComponentMetrics>,
}

impl PerformanceMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_calculations == 0 {
            return 1.0;
        }
        self.successful as f64 / self.total_calculations as f64
    }
}

#[derive(Debug)]
pub(crate) struct CalculationHistory {
    capacity: usize,
    entries: Mutex<VecDeque<CalculationHistoryEntry>>,
    passes: AtomicU64,
}

impl CalculationHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            passes: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, entry: CalculationHistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Start a new pass and return its number.
    pub(crate) fn begin_pass(&self) -> u64 {
        self.passes.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Up to `limit` entries, newest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<CalculationHistoryEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn metrics(&self) -> PerformanceMetrics {
        let entries = self.entries.lock();
        let mut metrics = PerformanceMetrics {
            total_passes: self.passes.load(Ordering::SeqCst),
            ..Default::default()
        };

        let mut total = Duration::ZERO;
        let mut per_total: IndexMap<ComponentType, Duration> = IndexMap::new();

        for entry in entries.iter() {
            metrics.total_calculations += 1;
            if entry.succeeded {
                metrics.successful += 1;
            } else {
                metrics.failed += 1;
            }
            total += entry.duration;
            metrics.max_duration = metrics.max_duration.max(entry.duration);

            let component = metrics
                .per_component
                .entry(entry.component_type.clone())
                .or_default();
            component.calculations += 1;
            if !entry.succeeded {
                component.failures += 1;
            }
            component.max_duration = component.max_duration.max(entry.duration);
            component.last_duration = entry.duration;
            *per_total.entry(entry.component_type.clone()).or_default() += entry.duration;
        }

        if metrics.total_calculations > 0 {
            metrics.average_duration = total / metrics.total_calculations as u32;
        }
        for (ty, component) in metrics.per_component.iter_mut() {
            if let Some(sum) = per_total.get(ty) {
                component.average_duration = *sum / component.calculations as u32;
            }
        }

        metrics
    }
}
