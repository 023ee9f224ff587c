//! Reactive State Store
//!
//! The store owns the project metadata and the state of every component.
//! It is the only shared mutable resource in the core.
//!
//! # Mutation contract
//!
//! Every public mutation runs the same steps, in order:
//!
//! 1. Sanitize the incoming fields (see [`ParamSchema`])
//! 2. Apply business rules (see [`BusinessRules`]) to compute side effects
//! 3. Commit everything under one write lock and bump `version`
//! 4. Ask the attached scheduler to recalculate the affected components
//! 5. Notify listeners
//!
//! Side effects of a rule (disabling a peer, enabling a prerequisite) are
//! part of step 3. They never go back through the public API, so a single
//! update produces a single notification.
//!
//! The orchestrator writes back through [`Store::set_result`] and
//! [`Store::set_error`] only.
//!
//! # Locking
//!
//! No lock is held while the scheduler or a listener runs. Listeners may
//! freely read or mutate the store from inside a notification.

mod rules;
mod schema;
mod subscriber;

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::component::{
    ComponentDefaults, ComponentPatch, ComponentState, ComponentType, ErrorInfo, ProjectMetadata,
    ProjectPatch,
};
use crate::error::{ListenerError, StoreError};

pub use rules::BusinessRules;
pub use schema::{FieldRule, ParamSchema};
pub use subscriber::{ListenerId, Subscription};

use subscriber::ListenerRegistry;

/// Result type for store mutations. The `Ok` value is the new version.
pub type Result<T> = std::result::Result<T, StoreError>;

/// What a committed mutation changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StoreChange {
    Project,
    /// Params or enabled flags changed, including rule side effects.
    Components(Vec<ComponentType>),
    Result(ComponentType),
    Error(ComponentType),
    /// Components put back to their defaults. `project` is set when the
    /// project metadata was reset in the same commit.
    Reset {
        components: Vec<ComponentType>,
        project: bool,
    },
}

/// Delivered to every listener after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEvent {
    pub version: u64,
    pub change: StoreChange,
}

/// Hook the store uses to hand work to the calculation layer.
///
/// Implemented by the orchestrator. The store keeps only a weak reference.
pub trait CalculationScheduler: Send + Sync {
    /// Every component that reads `component`'s result, directly or not.
    fn dependents_of(&self, component: &ComponentType) -> Vec<ComponentType>;

    /// Request a recalculation of `component`.
    fn schedule(&self, component: &ComponentType);
}

/// Serializable copy of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u64,
    pub project: ProjectMetadata,
    pub components: IndexMap<ComponentType, ComponentState>,
}

#[derive(Debug)]
struct StoreState {
    project: ProjectMetadata,
    components: IndexMap<ComponentType, ComponentState>,
    version: u64,
}

pub struct Store {
    state: RwLock<StoreState>,
    defaults: IndexMap<ComponentType, ComponentDefaults>,
    default_project: ProjectMetadata,
    rules: BusinessRules,
    schema: ParamSchema,
    clock: Arc<dyn Clock>,
    listeners: Arc<ListenerRegistry>,
    scheduler: RwLock<Option<Weak<dyn CalculationScheduler>>>,
}

impl Store {
    /// Create a store with one component per entry of `defaults`.
    pub fn new<I>(project: ProjectMetadata, defaults: I) -> Self
    where
        I: IntoIterator<Item = ComponentDefaults>,
    {
        let defaults: IndexMap<ComponentType, ComponentDefaults> = defaults
            .into_iter()
            .map(|d| (d.component_type.clone(), d))
            .collect();
        let components = defaults
            .iter()
            .map(|(ty, d)| (ty.clone(), ComponentState::from_defaults(d)))
            .collect();

        Self {
            state: RwLock::new(StoreState {
                project: project.clone(),
                components,
                version: 0,
            }),
            defaults,
            default_project: project,
            rules: BusinessRules::default(),
            schema: ParamSchema::default(),
            clock: Arc::new(SystemClock::new()),
            listeners: Arc::new(ListenerRegistry::default()),
            scheduler: RwLock::new(None),
        }
    }

    /// Attach business rules. Unsatisfiable combinations are logged; enabling
    /// a component caught in one fails with [`StoreError::RuleConflict`].
    pub fn with_rules(mut self, rules: BusinessRules) -> Self {
        for conflict in rules.conflicts() {
            warn!(%conflict, "unsatisfiable business rule");
        }
        self.rules = rules;
        self
    }

    pub fn with_schema(mut self, schema: ParamSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the scheduler that receives recalculation requests.
    pub fn attach_scheduler(&self, scheduler: Weak<dyn CalculationScheduler>) {
        *self.scheduler.write() = Some(scheduler);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get_component(&self, component: &ComponentType) -> Option<ComponentState> {
        self.state.read().components.get(component).cloned()
    }

    pub fn get_all_components(&self) -> IndexMap<ComponentType, ComponentState> {
        self.state.read().components.clone()
    }

    pub fn get_project(&self) -> ProjectMetadata {
        self.state.read().project.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    pub fn contains(&self, component: &ComponentType) -> bool {
        self.state.read().components.contains_key(component)
    }

    pub fn enabled_types(&self) -> HashSet<ComponentType> {
        self.state
            .read()
            .components
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.component_type.clone())
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        StoreSnapshot {
            version: state.version,
            project: state.project.clone(),
            components: state.components.clone(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ------------------------------------------------------------------------
    // UI-facing mutations
    // ------------------------------------------------------------------------

    /// Apply a partial update to one component.
    ///
    /// Returns the new version. A patch that changes nothing commits nothing
    /// and returns the current version without scheduling or notifying.
    pub fn update_component(&self, component: &ComponentType, patch: ComponentPatch) -> Result<u64> {
        if patch.is_empty() {
            let state = self.state.read();
            return match state.components.contains_key(component) {
                true => Ok(state.version),
                false => Err(StoreError::UnknownComponent(component.clone())),
            };
        }
        let ComponentPatch {
            enabled,
            params,
            remove_params,
        } = patch;
        let params = self.schema.sanitize(component, params)?;
        let plan = match enabled {
            Some(true) => Some(self.rules.plan_enable(component)?),
            Some(false) => Some(self.rules.plan_disable(component)),
            None => None,
        };
        let scheduler = self.scheduler();

        let (version, affected) = {
            let mut state = self.state.write();
            let current = state
                .components
                .get_mut(component)
                .ok_or_else(|| StoreError::UnknownComponent(component.clone()))?;

            let mut params_changed = false;
            for (key, value) in params {
                if current.params.get(&key) != Some(&value) {
                    current.params.insert(key, value);
                    params_changed = true;
                }
            }
            for key in remove_params {
                params_changed |= current.params.shift_remove(&key).is_some();
            }
            if params_changed {
                current.dirty = true;
            }

            let mut affected: IndexSet<ComponentType> = IndexSet::new();
            if params_changed {
                affected.insert(component.clone());
            }
            if let Some(plan) = plan {
                for ty in &plan.enable {
                    if set_enabled(&mut state.components, ty, true) {
                        affected.insert(ty.clone());
                    }
                }
                for ty in &plan.disable {
                    if set_enabled(&mut state.components, ty, false) {
                        affected.insert(ty.clone());
                    }
                }
                if affected.len() > 1 {
                    debug!(component = %component, enabled = ?enabled, side_effects = ?affected, "business rules applied");
                }
            }

            if affected.is_empty() {
                return Ok(state.version);
            }

            mark_dependents_dirty(&mut state.components, &affected, scheduler.as_deref());
            state.version += 1;
            (state.version, affected.into_iter().collect::<Vec<_>>())
        };

        self.schedule(scheduler.as_deref(), &affected);
        self.notify(version, StoreChange::Components(affected));
        Ok(version)
    }

    /// Apply a partial update to the project metadata.
    ///
    /// Project fields feed every calculation, so every enabled component is
    /// rescheduled.
    pub fn update_project(&self, patch: ProjectPatch) -> Result<u64> {
        let scheduler = self.scheduler();
        let (version, affected) = {
            let mut state = self.state.write();
            let before = state.project.clone();
            patch.apply(&mut state.project);
            if state.project == before {
                return Ok(state.version);
            }

            let mut affected = Vec::new();
            for component in state.components.values_mut().filter(|c| c.enabled) {
                component.dirty = true;
                affected.push(component.component_type.clone());
            }
            state.version += 1;
            (state.version, affected)
        };

        self.schedule(scheduler.as_deref(), &affected);
        self.notify(version, StoreChange::Project);
        Ok(version)
    }

    /// Put one component back to its defaults.
    pub fn reset_component(&self, component: &ComponentType) -> Result<u64> {
        self.reset(std::slice::from_ref(component), false)
    }

    /// Put the project and every component back to their defaults, in one
    /// commit.
    pub fn reset_all(&self) -> Result<u64> {
        let all: Vec<ComponentType> = self.defaults.keys().cloned().collect();
        self.reset(&all, true)
    }

    fn reset(&self, components: &[ComponentType], project: bool) -> Result<u64> {
        let defaults = components
            .iter()
            .map(|ty| {
                self.defaults
                    .get(ty)
                    .ok_or_else(|| StoreError::UnknownComponent(ty.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let scheduler = self.scheduler();
        let version = {
            let mut state = self.state.write();
            if project {
                state.project = self.default_project.clone();
            }
            for defaults in defaults {
                state.components.insert(
                    defaults.component_type.clone(),
                    ComponentState::from_defaults(defaults),
                );
            }
            let affected: IndexSet<ComponentType> = components.iter().cloned().collect();
            mark_dependents_dirty(&mut state.components, &affected, scheduler.as_deref());
            state.version += 1;
            state.version
        };

        self.schedule(scheduler.as_deref(), components);
        self.notify(
            version,
            StoreChange::Reset {
                components: components.to_vec(),
                project,
            },
        );
        Ok(version)
    }

    // ------------------------------------------------------------------------
    // Orchestrator write-back
    // ------------------------------------------------------------------------

    /// Record a successful calculation.
    pub fn set_result(&self, component: &ComponentType, result: Value) -> Result<u64> {
        let now = self.clock.now();
        let version = {
            let mut state = self.state.write();
            let current = state
                .components
                .get_mut(component)
                .ok_or_else(|| StoreError::UnknownComponent(component.clone()))?;
            current.result = Some(result);
            current.error = None;
            current.dirty = false;
            current.last_computed_at = Some(now);
            state.version += 1;
            state.version
        };

        self.notify(version, StoreChange::Result(component.clone()));
        Ok(version)
    }

    /// Record a failed calculation. The stale result is dropped.
    pub fn set_error(&self, component: &ComponentType, error: ErrorInfo) -> Result<u64> {
        let now = self.clock.now();
        let version = {
            let mut state = self.state.write();
            let current = state
                .components
                .get_mut(component)
                .ok_or_else(|| StoreError::UnknownComponent(component.clone()))?;
            current.result = None;
            current.error = Some(error);
            current.dirty = false;
            current.last_computed_at = Some(now);
            state.version += 1;
            state.version
        };

        self.notify(version, StoreChange::Error(component.clone()));
        Ok(version)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Register a listener for committed mutations.
    ///
    /// The listener stays registered until the returned handle is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription::new(id, &self.listeners)
    }

    fn notify(&self, version: u64, change: StoreChange) {
        let event = StoreEvent { version, change };
        self.listeners.notify(&event);
    }

    fn scheduler(&self) -> Option<Arc<dyn CalculationScheduler>> {
        self.scheduler.read().as_ref().and_then(Weak::upgrade)
    }

    fn schedule(&self, scheduler: Option<&dyn CalculationScheduler>, components: &[ComponentType]) {
        if let Some(scheduler) = scheduler {
            for ty in components {
                scheduler.schedule(ty);
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Store")
            .field("version", &state.version)
            .field("components", &state.components.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Flip one component's enabled flag. Returns whether anything changed.
fn set_enabled(
    components: &mut IndexMap<ComponentType, ComponentState>,
    component: &ComponentType,
    enabled: bool,
) -> bool {
    let Some(state) = components.get_mut(component) else {
        return false;
    };
    if state.enabled == enabled {
        return false;
    }
    state.enabled = enabled;
    if enabled {
        state.dirty = true;
    } else {
        state.result = None;
        state.error = None;
        state.dirty = false;
    }
    true
}

fn mark_dependents_dirty(
    components: &mut IndexMap<ComponentType, ComponentState>,
    changed: &IndexSet<ComponentType>,
    scheduler: Option<&dyn CalculationScheduler>,
) {
    let Some(scheduler) = scheduler else {
        return;
    };
    for ty in changed {
        for dependent in scheduler.dependents_of(ty) {
            if let Some(state) = components.get_mut(&dependent) {
                if state.enabled {
                    state.dirty = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn ty(name: &str) -> ComponentType {
        ComponentType::from(name)
    }

    fn store() -> Store {
        Store::new(
            ProjectMetadata::default(),
            [
                ComponentDefaults::new("capital").enabled(true).param("amount", 1000),
                ComponentDefaults::new("support"),
                ComponentDefaults::new("prtg"),
                ComponentDefaults::new("checkmk"),
            ],
        )
        .with_rules(
            BusinessRules::new()
                .requires("support", "capital")
                .exclusive(["prtg", "checkmk"]),
        )
    }

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<ComponentType>>,
    }

    impl CalculationScheduler for RecordingScheduler {
        fn dependents_of(&self, component: &ComponentType) -> Vec<ComponentType> {
            if component.as_str() == "capital" {
                vec![ty("support")]
            } else {
                vec![]
            }
        }

        fn schedule(&self, component: &ComponentType) {
            self.scheduled.lock().push(component.clone());
        }
    }

    fn record_events(store: &Store) -> (Arc<Mutex<Vec<StoreEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = store.subscribe(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        (events, subscription)
    }

    #[test]
    fn update_merges_params_and_bumps_version() {
        let store = store();
        let version = store
            .update_component(&ty("capital"), ComponentPatch::new().param("term", 36))
            .unwrap();

        assert_eq!(version, 1);
        let capital = store.get_component(&ty("capital")).unwrap();
        assert_eq!(capital.params["amount"], json!(1000));
        assert_eq!(capital.params["term"], json!(36));
        assert!(capital.dirty);
    }

    #[test]
    fn no_op_update_commits_nothing() {
        let store = store();
        let (events, _sub) = record_events(&store);

        let version = store
            .update_component(&ty("capital"), ComponentPatch::new().param("amount", 1000).enable())
            .unwrap();

        assert_eq!(version, 0);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn unknown_component_is_rejected() {
        let store = store();
        let err = store
            .update_component(&ty("ghost"), ComponentPatch::new().enable())
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownComponent(ty("ghost")));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn invalid_params_are_rejected_before_commit() {
        let store = Store::new(ProjectMetadata::default(), [ComponentDefaults::new("capital")])
            .with_schema(ParamSchema::new().field("capital", "amount", FieldRule::Number { min: None, max: None }));
        let (events, _sub) = record_events(&store);

        let err = store
            .update_component(&ty("capital"), ComponentPatch::new().param("amount", "a lot"))
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidParam { .. }));
        assert_eq!(store.version(), 0);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn enabling_exclusive_peer_disables_others_in_one_commit() {
        let store = store();
        store
            .update_component(&ty("prtg"), ComponentPatch::new().enable())
            .unwrap();
        let (events, _sub) = record_events(&store);

        let version = store
            .update_component(&ty("checkmk"), ComponentPatch::new().enable())
            .unwrap();

        assert!(!store.get_component(&ty("prtg")).unwrap().enabled);
        assert!(store.get_component(&ty("checkmk")).unwrap().enabled);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            StoreEvent {
                version,
                change: StoreChange::Components(vec![ty("checkmk"), ty("prtg")]),
            }
        );
    }

    #[test]
    fn enabling_dependent_force_enables_prerequisite() {
        let store = store();
        store
            .update_component(&ty("capital"), ComponentPatch::new().disable())
            .unwrap();
        assert!(!store.get_component(&ty("capital")).unwrap().enabled);

        store
            .update_component(&ty("support"), ComponentPatch::new().enable())
            .unwrap();
        assert!(store.get_component(&ty("capital")).unwrap().enabled);
        assert!(store.get_component(&ty("support")).unwrap().enabled);
    }

    #[test]
    fn disabling_clears_result_and_error() {
        let store = store();
        store.set_result(&ty("capital"), json!(42)).unwrap();
        store
            .update_component(&ty("capital"), ComponentPatch::new().disable())
            .unwrap();

        let capital = store.get_component(&ty("capital")).unwrap();
        assert!(capital.result.is_none());
        assert!(!capital.dirty);
    }

    #[test]
    fn set_result_and_error_stamp_time_and_clear_dirty() {
        let clock = Arc::new(ManualClock::starting_at(100));
        let store = store().with_clock(clock.clone());

        store.set_result(&ty("capital"), json!(1200.0)).unwrap();
        let capital = store.get_component(&ty("capital")).unwrap();
        assert_eq!(capital.result, Some(json!(1200.0)));
        assert!(!capital.dirty);
        assert_eq!(capital.last_computed_at, Some(100));

        clock.advance(Duration::from_millis(5));
        let err = crate::error::CalculationError::Failed("rate missing".into());
        store.set_error(&ty("capital"), ErrorInfo::from(&err)).unwrap();
        let capital = store.get_component(&ty("capital")).unwrap();
        assert!(capital.result.is_none());
        assert_eq!(capital.error.unwrap().kind, "failed");
        assert_eq!(capital.last_computed_at, Some(105));
    }

    #[test]
    fn mutations_schedule_affected_and_dirty_dependents() {
        let store = store();
        let scheduler: Arc<RecordingScheduler> = Arc::new(RecordingScheduler::default());
        let weak: Weak<dyn CalculationScheduler> = Arc::downgrade(&scheduler) as Weak<dyn CalculationScheduler>;
        store.attach_scheduler(weak);

        store
            .update_component(&ty("support"), ComponentPatch::new().enable())
            .unwrap();
        store.set_result(&ty("support"), json!(10)).unwrap();
        assert!(!store.get_component(&ty("support")).unwrap().dirty);

        store
            .update_component(&ty("capital"), ComponentPatch::new().param("amount", 2000))
            .unwrap();

        assert!(store.get_component(&ty("support")).unwrap().dirty);
        assert_eq!(
            *scheduler.scheduled.lock(),
            vec![ty("support"), ty("capital")]
        );
    }

    #[test]
    fn project_update_reschedules_enabled_components() {
        let store = store();
        let scheduler = Arc::new(RecordingScheduler::default());
        let weak: Weak<dyn CalculationScheduler> = Arc::downgrade(&scheduler) as Weak<dyn CalculationScheduler>;
        store.attach_scheduler(weak);

        store.update_project(ProjectPatch::new().currency("USD")).unwrap();
        assert_eq!(*scheduler.scheduled.lock(), vec![ty("capital")]);
        assert_eq!(store.get_project().currency, "USD");

        let version = store.version();
        assert_eq!(store.update_project(ProjectPatch::new().currency("USD")).unwrap(), version);
    }

    #[test]
    fn listener_can_mutate_store_during_notification() {
        let store = Arc::new(store());
        let inner = Arc::downgrade(&store);
        let _sub = store.subscribe(move |event| {
            if let (StoreChange::Result(ty), Some(store)) = (&event.change, inner.upgrade()) {
                if ty.as_str() == "capital" {
                    store
                        .update_component(&"support".into(), ComponentPatch::new().param("hours", 4))
                        .map_err(|e| ListenerError::new(e.to_string()))?;
                }
            }
            Ok(())
        });

        store.set_result(&ty("capital"), json!(1)).unwrap();
        assert_eq!(store.get_component(&ty("support")).unwrap().params["hours"], json!(4));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn reset_restores_defaults() {
        let store = store();
        store
            .update_component(&ty("capital"), ComponentPatch::new().param("amount", 5))
            .unwrap();
        store.set_result(&ty("capital"), json!(5)).unwrap();

        store.reset_component(&ty("capital")).unwrap();
        let capital = store.get_component(&ty("capital")).unwrap();
        assert_eq!(capital.params["amount"], json!(1000));
        assert!(capital.result.is_none());
        assert!(capital.dirty);
    }

    #[test]
    fn reset_all_restores_project_in_the_same_commit() {
        let store = store();
        store.update_project(ProjectPatch::new().currency("USD")).unwrap();
        let before = store.version();
        let (events, _sub) = record_events(&store);

        let version = store.reset_all().unwrap();

        assert_eq!(version, before + 1);
        assert_eq!(store.get_project().currency, "EUR");
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].change,
            StoreChange::Reset { project: true, components } if components.len() == 4
        ));
    }

    #[test]
    fn reset_of_unknown_component_commits_nothing() {
        let store = store();
        let (events, _sub) = record_events(&store);

        let err = store.reset_component(&ty("ghost")).unwrap_err();

        assert_eq!(err, StoreError::UnknownComponent(ty("ghost")));
        assert_eq!(store.version(), 0);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn enabling_into_an_exclusive_conflict_is_rejected() {
        let store = Store::new(
            ProjectMetadata::default(),
            [
                ComponentDefaults::new("prtg"),
                ComponentDefaults::new("checkmk"),
                ComponentDefaults::new("bridge"),
            ],
        )
        .with_rules(
            BusinessRules::new()
                .requires("bridge", "prtg")
                .requires("bridge", "checkmk")
                .exclusive(["prtg", "checkmk"]),
        );
        let (events, _sub) = record_events(&store);

        let err = store
            .update_component(&ty("bridge"), ComponentPatch::new().enable())
            .unwrap_err();

        assert!(matches!(err, StoreError::RuleConflict { .. }));
        assert_eq!(store.version(), 0);
        assert!(events.lock().is_empty());
        for name in ["prtg", "checkmk", "bridge"] {
            assert!(!store.get_component(&ty(name)).unwrap().enabled);
        }
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let store = store();
        let (_events, first) = record_events(&store);
        let (_other, second) = record_events(&store);
        assert_eq!(store.listener_count(), 2);

        drop(first);
        assert_eq!(store.listener_count(), 1);
        drop(second);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let store = store();
        assert_eq!(store.update_component(&ty("capital"), ComponentPatch::new()).unwrap(), 0);
        assert_eq!(
            store.update_component(&ty("ghost"), ComponentPatch::new()).unwrap_err(),
            StoreError::UnknownComponent(ty("ghost"))
        );
    }

    #[test]
    fn snapshot_serializes() {
        let store = store();
        let snapshot = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(snapshot["version"], json!(0));
        assert_eq!(snapshot["components"]["capital"]["enabled"], json!(true));
    }
}
