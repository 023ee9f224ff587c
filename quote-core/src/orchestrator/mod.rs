//! Calculation Orchestrator
//!
//! The orchestrator decides when and in which order components are priced.
//!
//! # Lifecycle
//!
//! Each drain cycle moves through three states:
//!
//! ```text
//! Idle --schedule--> Debouncing --deadline/immediate--> Processing --> Idle
//! ```
//!
//! Only one `Processing` phase runs at a time. A drain request made while a
//! pass is running is a no-op; the pending tasks stay queued for the next
//! drain.
//!
//! # Drain pass
//!
//! 1. Snapshot the pending tasks and keep the ready ones (debounce elapsed
//!    or `immediate`)
//! 2. Grow the ready set with enabled dependents, and with enabled
//!    dependencies that are dirty, have no result, or are pending themselves
//! 3. Order that set by dependency level (wildcards resolved against the
//!    live enabled set), then priority, then registration order
//! 4. Price each component with the engine and write the outcome back to the
//!    store. A failure is recorded on its component; components reading a
//!    failed one are skipped and stay dirty, everything else carries on
//! 5. Remove consumed tasks, unless they were re-requested mid-pass
//!
//! The pass itself is synchronous. Because dependencies always precede their
//! dependents in the order, every calculation sees fresh upstream results
//! without waiting on anything.

mod history;
mod processing;
mod queue;
mod timer;

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Instant;

use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, debug_span, error, info, warn};

use crate::clock::Clock;
use crate::component::{ComponentState, ComponentType, ErrorInfo, Timestamp};
use crate::config::OrchestratorConfig;
use crate::engine::{CalculationContext, CalculationEngine, DependencyResults};
use crate::error::{CalculationError, OrchestratorError};
use crate::graph::DependencyGraph;
use crate::store::{CalculationScheduler, Store};

pub use history::{CalculationHistoryEntry, ComponentMetrics, PerformanceMetrics};
pub use queue::{Enqueued, ScheduledTask};
pub use timer::TimerHandle;

use history::CalculationHistory;
use processing::ProcessingGuard;
use queue::CalculationQueue;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Where the orchestrator currently is in its drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorState {
    Idle,
    Debouncing,
    Processing,
}

/// Options for [`Orchestrator::schedule_calculation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// `None` uses the configured default priority.
    pub priority: Option<i32>,
    pub immediate: bool,
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// What happened during one drain pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub pass: u64,
    /// Every component the pass considered, in execution order.
    pub order: Vec<ComponentType>,
    pub succeeded: Vec<ComponentType>,
    pub failed: Vec<(ComponentType, CalculationError)>,
    /// Not computed because an upstream component failed or was skipped.
    pub skipped: Vec<ComponentType>,
    /// Not computed because the component is disabled.
    pub disabled: Vec<ComponentType>,
}

impl PassReport {
    /// Components whose engine call actually ran.
    pub fn executed(&self) -> impl Iterator<Item = &ComponentType> {
        self.order.iter().filter(|ty| {
            self.succeeded.contains(ty) || self.failed.iter().any(|(failed, _)| failed == *ty)
        })
    }
}

/// Outcome of a drain request.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Another pass holds the processing flag. Nothing was touched.
    AlreadyProcessing,
    /// No pending task was ready.
    NothingReady,
    Completed(PassReport),
}

impl PassOutcome {
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DrainMode {
    /// Only tasks whose debounce elapsed (or that are immediate).
    Ready,
    /// Every pending task.
    All,
}

pub struct Orchestrator {
    graph: DependencyGraph,
    store: Arc<Store>,
    engine: Box<dyn CalculationEngine>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    queue: CalculationQueue,
    history: CalculationHistory,
    processing: AtomicBool,
    wake: Notify,
}

impl Orchestrator {
    /// Validate `graph` and wire a new orchestrator to `store`.
    ///
    /// Refuses to build against a graph with any violation, or against a
    /// store that lacks one of the graph's components.
    pub fn new<E>(
        graph: DependencyGraph,
        store: Arc<Store>,
        engine: E,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Result<Arc<Self>>
    where
        E: CalculationEngine + 'static,
    {
        let violations = graph.validate();
        if !violations.is_empty() {
            for violation in &violations {
                error!(%violation, "dependency graph violation");
            }
            return Err(OrchestratorError::InvalidGraph(violations));
        }
        if let Some(missing) = graph.components().find(|ty| !store.contains(ty)) {
            return Err(OrchestratorError::MissingFromStore(missing.clone()));
        }

        let orchestrator = Arc::new(Self {
            history: CalculationHistory::new(config.max_history),
            graph,
            store,
            engine: Box::new(engine),
            clock,
            config,
            queue: CalculationQueue::new(),
            processing: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let scheduler: Weak<dyn CalculationScheduler> = Arc::downgrade(&orchestrator) as _;
        orchestrator.store.attach_scheduler(scheduler);
        Ok(orchestrator)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        if self.processing.load(std::sync::atomic::Ordering::Acquire) {
            OrchestratorState::Processing
        } else if self.queue.is_empty() {
            OrchestratorState::Idle
        } else {
            OrchestratorState::Debouncing
        }
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Request a recalculation of `component`.
    ///
    /// Repeated requests coalesce into one task and restart its debounce
    /// window. Every enabled component that reads `component`'s result is
    /// scheduled as well, never with more urgency than this request.
    pub fn schedule_calculation(&self, component: &ComponentType, options: ScheduleOptions) -> Result<Enqueued> {
        if !self.graph.contains(component) {
            return Err(OrchestratorError::UnknownComponent(component.clone()));
        }

        let now = self.clock.now();
        let priority = options.priority.unwrap_or(self.config.default_priority);
        let enqueued = self.queue.request(
            component,
            priority,
            options.immediate,
            now,
            self.config.debounce_for(component),
        );
        debug!(
            component = %component,
            priority,
            immediate = options.immediate,
            coalesced = enqueued == Enqueued::Coalesced,
            "calculation scheduled"
        );

        let enabled = self.store.enabled_types();
        for dependent in self.graph.get_dependents(component) {
            if enabled.contains(&dependent) {
                self.queue
                    .propagate(&dependent, priority, now, self.config.debounce_for(&dependent));
            }
        }

        self.wake.notify_one();
        Ok(enqueued)
    }

    /// Drop every pending task without running it. Returns how many were
    /// dropped.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "calculation queue cleared");
        }
        dropped
    }

    pub fn pending_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.queue.snapshot();
        tasks.sort_by(|a, b| a.component_type.cmp(&b.component_type));
        tasks
    }

    pub fn pending_task(&self, component: &ComponentType) -> Option<ScheduledTask> {
        self.queue.get(component)
    }

    /// Earliest time at which a pending task becomes ready.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.queue.next_deadline()
    }

    // ------------------------------------------------------------------------
    // Draining
    // ------------------------------------------------------------------------

    /// Run one drain pass over the tasks that are ready now.
    pub fn process_calculation_queue(&self) -> Result<PassOutcome> {
        self.drain(DrainMode::Ready)
    }

    /// Run one drain pass over every pending task, ignoring debounce.
    pub fn flush(&self) -> Result<PassOutcome> {
        self.drain(DrainMode::All)
    }

    fn drain(&self, mode: DrainMode) -> Result<PassOutcome> {
        let Some(_guard) = ProcessingGuard::try_acquire(&self.processing) else {
            debug!("drain requested while a pass is running");
            return Ok(PassOutcome::AlreadyProcessing);
        };

        let now = self.clock.now();
        let pending: HashMap<ComponentType, ScheduledTask> = self
            .queue
            .snapshot()
            .into_iter()
            .map(|task| (task.component_type.clone(), task))
            .collect();
        let ready: Vec<&ScheduledTask> = pending
            .values()
            .filter(|task| mode == DrainMode::All || task.is_ready(now))
            .collect();
        if ready.is_empty() {
            return Ok(PassOutcome::NothingReady);
        }

        let pass = self.history.begin_pass();
        let span = debug_span!("drain_pass", pass);
        let _entered = span.enter();

        let components = self.store.get_all_components();
        let enabled: HashSet<ComponentType> = components
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.component_type.clone())
            .collect();

        let mut seeds: Vec<ComponentType> = ready.iter().map(|t| t.component_type.clone()).collect();
        seeds.sort_by_key(|ty| self.graph.node(ty).map(|n| n.rank()));
        let members = self.execution_set(seeds, &components, &enabled, &pending);

        let order = self.graph.execution_order(&members, &enabled, |ty| {
            pending
                .get(ty)
                .map(|t| t.priority)
                .unwrap_or(self.config.default_priority)
        })?;

        debug!(
            ready = ready.len(),
            members = members.len(),
            "drain pass started"
        );

        let mut report = PassReport {
            pass,
            order: order.iter().map(|e| e.component_type.clone()).collect(),
            ..Default::default()
        };
        let mut unavailable: HashSet<ComponentType> = HashSet::new();

        for entry in &order {
            let ty = &entry.component_type;
            self.execute(ty, pass, &enabled, &mut unavailable, &mut report);
        }

        let mut consumed = 0;
        for ty in &members {
            if let Some(task) = pending.get(ty) {
                if self.queue.consume(task) {
                    consumed += 1;
                }
            }
        }

        info!(
            pass,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            executed = report.executed().count(),
            consumed,
            remaining = self.queue.len(),
            "drain pass finished"
        );
        Ok(PassOutcome::Completed(report))
    }

    /// Ready tasks, plus what must run alongside them.
    fn execution_set(
        &self,
        seeds: Vec<ComponentType>,
        components: &indexmap::IndexMap<ComponentType, ComponentState>,
        enabled: &HashSet<ComponentType>,
        pending: &HashMap<ComponentType, ScheduledTask>,
    ) -> IndexSet<ComponentType> {
        let mut members: IndexSet<ComponentType> = IndexSet::new();
        let mut work: Vec<ComponentType> = Vec::new();
        for seed in seeds {
            if members.insert(seed.clone()) {
                work.push(seed);
            }
        }

        while let Some(ty) = work.pop() {
            for dependent in self.graph.get_dependents(&ty) {
                if enabled.contains(&dependent) && members.insert(dependent.clone()) {
                    work.push(dependent);
                }
            }

            if !enabled.contains(&ty) {
                continue;
            }
            for dep in self.graph.resolved_dependencies(&ty, enabled) {
                if members.contains(&dep) || !enabled.contains(&dep) {
                    continue;
                }
                let stale = pending.contains_key(&dep)
                    || components
                        .get(&dep)
                        .map_or(true, |state| state.dirty || state.result.is_none());
                if stale {
                    members.insert(dep.clone());
                    work.push(dep);
                }
            }
        }

        members
    }

    /// Price one component and write the outcome back.
    fn execute(
        &self,
        ty: &ComponentType,
        pass: u64,
        enabled: &HashSet<ComponentType>,
        unavailable: &mut HashSet<ComponentType>,
        report: &mut PassReport,
    ) {
        let Some(state) = self.store.get_component(ty) else {
            return;
        };
        if !state.enabled {
            report.disabled.push(ty.clone());
            return;
        }

        let mut dependencies = DependencyResults::new();
        for dep in self.graph.resolved_dependencies(ty, enabled) {
            if unavailable.contains(&dep) {
                debug!(component = %ty, dependency = %dep, "skipped: dependency unavailable this pass");
                unavailable.insert(ty.clone());
                report.skipped.push(ty.clone());
                return;
            }
            match self.store.get_component(&dep) {
                Some(dep_state) if dep_state.enabled => match dep_state.result {
                    Some(result) => {
                        dependencies.insert(dep, result);
                    }
                    None => {
                        debug!(component = %ty, dependency = %dep, "skipped: dependency has no result");
                        unavailable.insert(ty.clone());
                        report.skipped.push(ty.clone());
                        return;
                    }
                },
                _ => {}
            }
        }

        let project = self.store.get_project();
        let ctx = CalculationContext {
            project: &project,
            dependencies: &dependencies,
        };

        let started_at = self.clock.now();
        let stopwatch = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.engine.compute(ty, &state.params, &ctx)))
            .unwrap_or_else(|panic| Err(CalculationError::Panicked(panic_message(panic.as_ref()))));
        let duration = stopwatch.elapsed();

        let succeeded = match outcome {
            Ok(result) => {
                if let Err(err) = self.store.set_result(ty, result) {
                    error!(component = %ty, error = %err, "failed to store calculation result");
                }
                report.succeeded.push(ty.clone());
                true
            }
            Err(err) => {
                warn!(component = %ty, error = %err, "calculation failed");
                if let Err(store_err) = self.store.set_error(ty, ErrorInfo::from(&err)) {
                    error!(component = %ty, error = %store_err, "failed to store calculation error");
                }
                unavailable.insert(ty.clone());
                report.failed.push((ty.clone(), err));
                false
            }
        };

        self.history.record(CalculationHistoryEntry {
            component_type: ty.clone(),
            duration,
            timestamp: started_at,
            succeeded,
            pass,
        });
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Up to `limit` history entries, newest first.
    pub fn get_calculation_history(&self, limit: usize) -> Vec<CalculationHistoryEntry> {
        self.history.recent(limit)
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        self.history.metrics()
    }
}

impl CalculationScheduler for Orchestrator {
    fn dependents_of(&self, component: &ComponentType) -> Vec<ComponentType> {
        self.graph.get_dependents(component).into_iter().collect()
    }

    fn schedule(&self, component: &ComponentType) {
        if let Err(err) = self.schedule_calculation(component, ScheduleOptions::default()) {
            warn!(component = %component, error = %err, "store requested an unschedulable component");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("pending", &self.queue.len())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
