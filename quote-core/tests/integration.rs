//! Integration tests for the calculation core
//!
//! These tests wire a store, a graph and an orchestrator together and drive
//! them the way the quote builder does: edits go into the store, time is
//! advanced, and the queue is drained.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use quote_core::store::BusinessRules;
use quote_core::{
    CalculationContext, CalculationError, ComponentDefaults, ComponentPatch, ComponentType,
    DependencyGraph, DependencySpec, FnEngine, GraphError, ManualClock, Orchestrator,
    OrchestratorConfig, OrchestratorState, Params, PassOutcome, ProjectMetadata, ProjectPatch,
    QuoteConfig, ScheduleOptions, Store, StoreChange, StoreEvent, SystemClock, Violation,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ty(name: &str) -> ComponentType {
    ComponentType::from(name)
}

/// One engine call: the component and the dependency results it saw.
#[derive(Debug, Clone)]
struct Call {
    component: String,
    dependencies: Vec<(String, Value)>,
    params: Params,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// Sums numeric params and dependency results. Fails when `fail` is set.
fn summing_engine(log: CallLog) -> impl quote_core::CalculationEngine {
    FnEngine::new(move |ty: &ComponentType, params: &Params, ctx: &CalculationContext<'_>| {
        log.lock().push(Call {
            component: ty.to_string(),
            dependencies: ctx
                .dependencies
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            params: params.clone(),
        });
        if params.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(CalculationError::Failed(format!("{ty}: rate table missing")));
        }
        let own: f64 = params.values().filter_map(Value::as_f64).sum();
        let upstream: f64 = ctx.dependencies.values().filter_map(Value::as_f64).sum();
        Ok(json!(own + upstream))
    })
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<Store>,
    orchestrator: Arc<Orchestrator>,
    calls: CallLog,
}

impl Harness {
    fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.component.clone()).collect()
    }

    fn call(&self, component: &str) -> Option<Call> {
        self.calls.lock().iter().find(|c| c.component == component).cloned()
    }

    fn settle(&self) -> PassOutcome {
        self.clock.advance(Duration::from_millis(50));
        self.orchestrator.process_calculation_queue().unwrap()
    }
}

/// capital, support -> capital, prtg, onboarding, assessment,
/// combined -> * (wildcard)
fn harness(enabled: &[&str]) -> Harness {
    init_tracing();

    let mut graph = DependencyGraph::new();
    for name in ["capital", "support", "prtg", "onboarding", "assessment", "combined"] {
        graph.register_component(name).unwrap();
    }
    graph.register_dependency("support", ["capital"]).unwrap();
    graph.register_dependency("combined", [DependencySpec::Wildcard]).unwrap();

    let clock = Arc::new(ManualClock::new());
    let defaults = graph
        .components()
        .map(|c| ComponentDefaults::new(c.clone()).enabled(enabled.contains(&c.as_str())))
        .collect::<Vec<_>>();
    let store = Arc::new(Store::new(ProjectMetadata::default(), defaults).with_clock(clock.clone()));

    let calls: CallLog = Arc::default();
    let orchestrator = Orchestrator::new(
        graph,
        store.clone(),
        summing_engine(calls.clone()),
        clock.clone(),
        OrchestratorConfig::default(),
    )
    .unwrap();

    Harness {
        clock,
        store,
        orchestrator,
        calls,
    }
}

// ----------------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------------

#[test]
fn scheduling_a_dependent_runs_its_base_first() {
    let h = harness(&["capital", "support"]);
    h.store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 1000))
        .unwrap();
    h.orchestrator.flush().unwrap();
    h.calls.lock().clear();

    // capital is clean now; make it stale without scheduling it.
    h.store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 1200))
        .unwrap();
    h.orchestrator.clear_queue();

    h.orchestrator
        .schedule_calculation(&ty("support"), ScheduleOptions::new())
        .unwrap();
    let outcome = h.settle();

    let report = outcome.report().unwrap();
    assert_eq!(report.order, vec![ty("capital"), ty("support")]);
    assert_eq!(h.names(), vec!["capital", "support"]);
    assert_eq!(
        h.call("support").unwrap().dependencies,
        vec![("capital".to_string(), json!(1200.0))]
    );

    let capital = h.store.get_component(&ty("capital")).unwrap();
    let support = h.store.get_component(&ty("support")).unwrap();
    assert_eq!(capital.result, Some(json!(1200.0)));
    assert_eq!(support.result, Some(json!(1200.0)));
    assert!(capital.error.is_none() && support.error.is_none());
    assert!(!capital.dirty && !support.dirty);
}

#[test]
fn clean_dependencies_are_not_recomputed() {
    let h = harness(&["capital", "support"]);
    h.orchestrator
        .schedule_calculation(&ty("capital"), ScheduleOptions::new())
        .unwrap();
    h.orchestrator.flush().unwrap();
    h.calls.lock().clear();

    h.store
        .update_component(&ty("support"), ComponentPatch::new().param("hours", 3))
        .unwrap();
    h.settle();

    assert_eq!(h.names(), vec!["support"]);
}

#[test]
fn higher_priority_runs_first_within_a_level() {
    let h = harness(&["capital", "prtg", "onboarding"]);

    h.orchestrator
        .schedule_calculation(&ty("capital"), ScheduleOptions::new().priority(3))
        .unwrap();
    h.orchestrator
        .schedule_calculation(&ty("onboarding"), ScheduleOptions::new())
        .unwrap();
    h.orchestrator
        .schedule_calculation(&ty("prtg"), ScheduleOptions::new().priority(1))
        .unwrap();
    h.clock.advance(Duration::from_millis(20));
    h.orchestrator
        .schedule_calculation(&ty("prtg"), ScheduleOptions::new().priority(5))
        .unwrap();

    h.clock.advance(Duration::from_millis(50));
    h.orchestrator.process_calculation_queue().unwrap();

    assert_eq!(h.names(), vec!["prtg", "capital", "onboarding"]);
}

// ----------------------------------------------------------------------------
// Debounce and dedup
// ----------------------------------------------------------------------------

#[test]
fn rapid_edits_coalesce_into_one_calculation_with_latest_params() {
    let h = harness(&["prtg"]);

    for hosts in 1..=5 {
        h.store
            .update_component(&ty("prtg"), ComponentPatch::new().param("hosts", hosts))
            .unwrap();
        h.clock.advance(Duration::from_millis(10));
    }
    assert_eq!(h.orchestrator.pending_tasks().len(), 1);
    assert_eq!(h.orchestrator.state(), OrchestratorState::Debouncing);

    h.settle();

    let calls = h.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params.get("hosts"), Some(&json!(5)));
    assert_eq!(h.store.get_component(&ty("prtg")).unwrap().result, Some(json!(5.0)));
    assert_eq!(h.orchestrator.state(), OrchestratorState::Idle);
}

#[test]
fn per_type_debounce_override() {
    init_tracing();
    let mut graph = DependencyGraph::new();
    graph.register_component("capital").unwrap();
    graph.register_component("combined").unwrap();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(
        Store::new(
            ProjectMetadata::default(),
            [
                ComponentDefaults::new("capital").enabled(true),
                ComponentDefaults::new("combined").enabled(true),
            ],
        )
        .with_clock(clock.clone()),
    );
    let calls: CallLog = Arc::default();
    let orchestrator = Orchestrator::new(
        graph,
        store,
        summing_engine(calls.clone()),
        clock.clone(),
        OrchestratorConfig::default()
            .with_debounce_ms(10)
            .with_debounce_override("combined", 200),
    )
    .unwrap();

    orchestrator.schedule_calculation(&ty("capital"), ScheduleOptions::new()).unwrap();
    orchestrator.schedule_calculation(&ty("combined"), ScheduleOptions::new()).unwrap();
    assert_eq!(orchestrator.next_deadline(), Some(10));

    clock.advance(Duration::from_millis(10));
    orchestrator.process_calculation_queue().unwrap();
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(orchestrator.next_deadline(), Some(200));

    clock.set(200);
    orchestrator.process_calculation_queue().unwrap();
    assert_eq!(calls.lock().len(), 2);
}

// ----------------------------------------------------------------------------
// Reentrancy
// ----------------------------------------------------------------------------

#[test]
fn drain_from_inside_a_pass_is_refused_and_work_stays_queued() {
    let h = harness(&["capital", "prtg"]);
    let orchestrator: Weak<Orchestrator> = Arc::downgrade(&h.orchestrator);
    let nested: Arc<Mutex<Vec<PassOutcome>>> = Arc::default();

    let seen = nested.clone();
    let _subscription = h.store.subscribe(move |event: &StoreEvent| {
        if event.change == StoreChange::Result(ty("capital")) {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator
                    .schedule_calculation(&ty("prtg"), ScheduleOptions::new().immediate())
                    .unwrap();
                assert_eq!(orchestrator.state(), OrchestratorState::Processing);
                seen.lock().push(orchestrator.process_calculation_queue().unwrap());
            }
        }
        Ok(())
    });

    h.orchestrator
        .schedule_calculation(&ty("capital"), ScheduleOptions::new().immediate())
        .unwrap();
    let outcome = h.orchestrator.process_calculation_queue().unwrap();

    assert_eq!(*nested.lock(), vec![PassOutcome::AlreadyProcessing]);
    assert_eq!(outcome.report().unwrap().succeeded, vec![ty("capital")]);
    assert!(h.orchestrator.pending_task(&ty("prtg")).is_some());

    h.orchestrator.process_calculation_queue().unwrap();
    assert_eq!(h.names(), vec!["capital", "prtg"]);
    assert!(h.orchestrator.pending_tasks().is_empty());
}

#[test]
fn reschedule_during_a_pass_survives_the_pass() {
    let h = harness(&["capital"]);
    let store = Arc::downgrade(&h.store);
    let edited = Arc::new(AtomicBool::new(false));

    let once = edited.clone();
    let _subscription = h.store.subscribe(move |event: &StoreEvent| {
        if matches!(event.change, StoreChange::Result(_)) && !once.swap(true, Ordering::SeqCst) {
            if let Some(store) = store.upgrade() {
                store
                    .update_component(&ty("capital"), ComponentPatch::new().param("amount", 7))
                    .unwrap();
            }
        }
        Ok(())
    });

    h.orchestrator
        .schedule_calculation(&ty("capital"), ScheduleOptions::new().immediate())
        .unwrap();
    h.orchestrator.process_calculation_queue().unwrap();

    assert!(edited.load(Ordering::SeqCst));
    assert!(h.orchestrator.pending_task(&ty("capital")).is_some());
    assert!(h.store.get_component(&ty("capital")).unwrap().dirty);

    h.settle();
    assert_eq!(h.names(), vec!["capital", "capital"]);
    assert_eq!(h.store.get_component(&ty("capital")).unwrap().result, Some(json!(7.0)));
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[test]
fn failure_is_isolated_to_its_component() {
    let h = harness(&["onboarding", "assessment"]);
    h.store
        .update_component(&ty("onboarding"), ComponentPatch::new().param("fail", true))
        .unwrap();
    h.store
        .update_component(&ty("assessment"), ComponentPatch::new().param("days", 4))
        .unwrap();

    let outcome = h.settle();
    let report = outcome.report().unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.succeeded, vec![ty("assessment")]);

    let onboarding = h.store.get_component(&ty("onboarding")).unwrap();
    let error = onboarding.error.unwrap();
    assert_eq!(error.kind, "failed");
    assert!(error.message.contains("rate table missing"));
    assert!(onboarding.result.is_none());

    let assessment = h.store.get_component(&ty("assessment")).unwrap();
    assert_eq!(assessment.result, Some(json!(4.0)));
    assert!(assessment.error.is_none());

    let history = h.orchestrator.get_calculation_history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|e| !e.succeeded).count(), 1);
    let metrics = h.orchestrator.get_performance_metrics();
    assert_eq!((metrics.successful, metrics.failed), (1, 1));
}

#[test]
fn fixing_the_input_clears_the_error() {
    let h = harness(&["capital", "support"]);
    h.store
        .update_component(&ty("capital"), ComponentPatch::new().param("fail", true))
        .unwrap();
    let outcome = h.settle();
    assert_eq!(outcome.report().unwrap().skipped, vec![ty("support")]);
    assert!(h.store.get_component(&ty("support")).unwrap().dirty);

    h.store
        .update_component(&ty("capital"), ComponentPatch::new().remove("fail").param("amount", 2))
        .unwrap();
    h.settle();

    let capital = h.store.get_component(&ty("capital")).unwrap();
    let support = h.store.get_component(&ty("support")).unwrap();
    assert!(capital.error.is_none());
    assert_eq!(support.result, Some(json!(2.0)));
    assert!(!support.dirty);
}

#[test]
fn failing_listener_does_not_stop_the_others() {
    let h = harness(&["capital"]);
    let delivered = Arc::new(AtomicUsize::new(0));

    let _failing = h.store.subscribe(|_: &StoreEvent| Err(quote_core::ListenerError::new("ui unmounted")));
    let _panicking = h.store.subscribe(|_: &StoreEvent| -> Result<(), quote_core::ListenerError> {
        panic!("render crashed")
    });
    let counter = delivered.clone();
    let _healthy = h.store.subscribe(move |_: &StoreEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    h.store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 1))
        .unwrap();
    h.settle();

    // one for the edit, one for the result
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
}

// ----------------------------------------------------------------------------
// Graph
// ----------------------------------------------------------------------------

#[test]
fn mutual_dependency_is_rejected() {
    let mut graph = DependencyGraph::new();
    graph.register_component("a").unwrap();
    graph.register_component("b").unwrap();
    graph.register_dependency("a", ["b"]).unwrap();

    let err = graph.register_dependency("b", ["a"]).unwrap_err();
    let GraphError::CycleDetected { path } = &err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert!(path.contains(&ty("a")) && path.contains(&ty("b")));
    assert!(graph.validate().is_empty());
}

#[test]
fn cyclic_table_fails_validation_and_cannot_be_scheduled() {
    let config = QuoteConfig::from_json(
        r#"{
            "graph": {
                "components": ["a", "b"],
                "dependencies": { "a": ["b"], "b": ["a"] }
            }
        }"#,
    )
    .unwrap();

    let graph = DependencyGraph::from_table(&config.graph);
    let violations = graph.validate();
    assert!(violations.iter().any(|v| matches!(
        v,
        Violation::Cycle { path } if path.contains(&ty("a")) && path.contains(&ty("b"))
    )));

    let calls: CallLog = Arc::default();
    let built = config.build(summing_engine(calls), Arc::new(ManualClock::new()));
    assert!(matches!(built, Err(quote_core::OrchestratorError::InvalidGraph(_))));
}

#[test]
fn wildcard_resolves_against_enabled_set_at_drain_time() {
    let h = harness(&["capital", "support", "combined"]);
    h.store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 10))
        .unwrap();
    h.store
        .update_component(&ty("support"), ComponentPatch::new().param("hours", 1))
        .unwrap();
    h.settle();
    h.calls.lock().clear();

    // Enabled after the graph was built: the wildcard picks it up.
    h.store
        .update_component(&ty("prtg"), ComponentPatch::new().enable().param("hosts", 100))
        .unwrap();
    h.orchestrator
        .schedule_calculation(&ty("combined"), ScheduleOptions::new())
        .unwrap();
    h.settle();

    let combined = h.call("combined").unwrap();
    let deps: Vec<&str> = combined.dependencies.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(deps, vec!["capital", "support", "prtg"]);
    assert_eq!(h.names().last().map(String::as_str), Some("combined"));
    assert_eq!(
        h.store.get_component(&ty("combined")).unwrap().result,
        Some(json!(10.0 + 11.0 + 100.0))
    );

    // Disabling drops it again.
    h.calls.lock().clear();
    h.store
        .update_component(&ty("prtg"), ComponentPatch::new().disable())
        .unwrap();
    h.settle();
    let deps: Vec<String> = h
        .call("combined")
        .unwrap()
        .dependencies
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(deps, vec!["capital", "support"]);
}

#[test]
fn two_wildcards_drain_without_a_cycle() {
    init_tracing();
    let mut graph = DependencyGraph::new();
    for name in ["w1", "w2", "x", "y", "capital"] {
        graph.register_component(name).unwrap();
    }
    graph.register_dependency("w1", [DependencySpec::Wildcard]).unwrap();
    graph.register_dependency("w2", [DependencySpec::Wildcard]).unwrap();
    graph.register_dependency("x", ["w1"]).unwrap();
    graph.register_dependency("y", ["w2"]).unwrap();
    assert!(graph.validate().is_empty());

    let defaults = graph
        .components()
        .map(|c| ComponentDefaults::new(c.clone()).enabled(true).param("base", 1))
        .collect::<Vec<_>>();
    let store = Arc::new(Store::new(ProjectMetadata::default(), defaults));
    let calls: CallLog = Arc::default();
    let orchestrator = Orchestrator::new(
        graph,
        store.clone(),
        summing_engine(calls.clone()),
        Arc::new(ManualClock::new()),
        OrchestratorConfig::default(),
    )
    .unwrap();

    orchestrator
        .schedule_calculation(&ty("capital"), ScheduleOptions::new().immediate())
        .unwrap();
    let outcome = orchestrator.flush().unwrap();
    let report = outcome.report().unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(store.get_component(&ty("capital")).unwrap().result, Some(json!(1.0)));
    assert_eq!(store.get_component(&ty("x")).unwrap().result, Some(json!(3.0)));
    assert!(orchestrator.pending_tasks().is_empty());

    let w1 = calls.lock().iter().find(|c| c.component == "w1").cloned().unwrap();
    let deps: Vec<&str> = w1.dependencies.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(deps, vec!["capital"]);
}

// ----------------------------------------------------------------------------
// Store wiring
// ----------------------------------------------------------------------------

#[test]
fn project_edit_reprices_every_enabled_component() {
    let h = harness(&["capital", "support", "assessment"]);

    h.store
        .update_project(ProjectPatch::new().customer(Some("Acme".into())))
        .unwrap();
    h.settle();

    let mut names = h.names();
    names.sort();
    assert_eq!(names, vec!["assessment", "capital", "support"]);
}

#[test]
fn exclusive_rule_side_effects_are_recalculated() {
    init_tracing();
    let mut graph = DependencyGraph::new();
    for name in ["capital", "leasing", "support"] {
        graph.register_component(name).unwrap();
    }
    graph.register_dependency("support", ["capital"]).unwrap();

    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(
        Store::new(
            ProjectMetadata::default(),
            [
                ComponentDefaults::new("capital").enabled(true).param("amount", 5),
                ComponentDefaults::new("leasing").param("amount", 9),
                ComponentDefaults::new("support").enabled(true),
            ],
        )
        .with_rules(BusinessRules::default().exclusive(["capital", "leasing"]))
        .with_clock(clock.clone()),
    );
    let calls: CallLog = Arc::default();
    let orchestrator = Orchestrator::new(
        graph,
        store.clone(),
        summing_engine(calls.clone()),
        clock.clone(),
        OrchestratorConfig::default(),
    )
    .unwrap();
    orchestrator.schedule_calculation(&ty("capital"), ScheduleOptions::new()).unwrap();
    orchestrator.flush().unwrap();

    let events: Arc<Mutex<Vec<StoreChange>>> = Arc::default();
    let sink = events.clone();
    let _subscription = store.subscribe(move |event: &StoreEvent| {
        sink.lock().push(event.change.clone());
        Ok(())
    });

    store
        .update_component(&ty("leasing"), ComponentPatch::new().enable())
        .unwrap();
    assert_eq!(
        events.lock().first(),
        Some(&StoreChange::Components(vec![ty("leasing"), ty("capital")]))
    );
    let capital = store.get_component(&ty("capital")).unwrap();
    assert!(!capital.enabled && capital.result.is_none());

    calls.lock().clear();
    orchestrator.flush().unwrap();
    let names: Vec<String> = calls.lock().iter().map(|c| c.component.clone()).collect();
    assert_eq!(names, vec!["leasing", "support"]);
    assert_eq!(store.get_component(&ty("support")).unwrap().result, Some(json!(0.0)));
}

#[test]
fn quote_config_builds_a_working_setup() {
    let config = QuoteConfig::from_json(
        r#"{
            "orchestrator": { "debounce_ms": 25, "max_history": 3 },
            "graph": {
                "components": ["capital", "support", "combined"],
                "dependencies": { "support": ["capital"], "combined": ["*"] }
            },
            "components": [
                { "component_type": "capital", "enabled": true, "params": { "amount": 40 } },
                { "component_type": "support", "enabled": true, "params": { "hours": 2 } },
                { "component_type": "combined", "enabled": true, "params": {} }
            ],
            "schema": { "capital": { "amount": { "type": "number", "min": 0 } } }
        }"#,
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new());
    let calls: CallLog = Arc::default();
    let (store, orchestrator) = config.build(summing_engine(calls.clone()), clock.clone()).unwrap();

    store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", "-5"))
        .unwrap();
    assert_eq!(store.get_component(&ty("capital")).unwrap().params["amount"], json!(0.0));

    clock.advance(Duration::from_millis(25));
    let outcome = orchestrator.process_calculation_queue().unwrap();
    assert_eq!(
        outcome.report().unwrap().order,
        vec![ty("capital"), ty("support"), ty("combined")]
    );
    assert_eq!(orchestrator.get_calculation_history(10).len(), 3);
    assert_eq!(orchestrator.get_performance_metrics().total_passes, 1);
}

// ----------------------------------------------------------------------------
// Timer driver
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timer_drains_after_the_debounce_window() {
    init_tracing();
    let mut graph = DependencyGraph::new();
    graph.register_component("capital").unwrap();
    graph.register_component("support").unwrap();
    graph.register_dependency("support", ["capital"]).unwrap();

    let clock = Arc::new(SystemClock::new());
    let store = Arc::new(
        Store::new(
            ProjectMetadata::default(),
            [
                ComponentDefaults::new("capital").enabled(true),
                ComponentDefaults::new("support").enabled(true),
            ],
        )
        .with_clock(clock.clone()),
    );
    let calls: CallLog = Arc::default();
    let orchestrator = Orchestrator::new(
        graph,
        store.clone(),
        summing_engine(calls.clone()),
        clock,
        OrchestratorConfig::default(),
    )
    .unwrap();
    let timer = orchestrator.spawn_timer();

    store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 3))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 4))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(calls.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get_component(&ty("support")).unwrap().result, Some(json!(4.0)));
    assert_eq!(calls.lock().len(), 2);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);

    timer.stop();
    store
        .update_component(&ty("capital"), ComponentPatch::new().param("amount", 5))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.lock().len(), 2);
    assert_eq!(orchestrator.pending_tasks().len(), 2);
}
