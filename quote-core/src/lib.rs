//! Quote Core
//!
//! This crate provides the calculation core of the quote builder. A quote is
//! made of pricing components (capital, support, monitoring, ...). Some of
//! them read the results of others, and every edit should reprice exactly
//! what it affects, in the right order and without redundant work.
//!
//! It implements:
//!
//! - A component dependency graph with cycle detection, leveled ordering and
//!   wildcard ("depends on every enabled component") resolution
//! - A debounced, deduplicating, priority-aware calculation orchestrator
//! - A reactive store holding project metadata and per-component state, with
//!   business rules and change notifications
//!
//! # Architecture
//!
//! - `graph`: the static dependency structure
//! - `store`: the single source of truth for component state
//! - `orchestrator`: the queue, the drain pass, history and metrics
//! - `engine`: the seam where the actual pricing logic plugs in
//! - `config`: JSON-loadable setup tying the three together
//!
//! The store never owns the orchestrator. It reaches it through a weak
//! [`store::CalculationScheduler`] reference that the orchestrator attaches
//! when it is built.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quote_core::{ComponentPatch, FnEngine, QuoteConfig, SystemClock};
//!
//! let config = QuoteConfig::from_json(RAW)?;
//! let engine = FnEngine::new(|ty, params, ctx| price(ty, params, ctx));
//! let (store, orchestrator) = config.build(engine, Arc::new(SystemClock::new()))?;
//! let _timer = orchestrator.spawn_timer();
//!
//! // Edits schedule their own recalculation; the timer drains after 50ms.
//! store.update_component(&"capital".into(), ComponentPatch::new().param("amount", 250_000))?;
//! ```

pub mod clock;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use component::{
    ComponentDefaults, ComponentPatch, ComponentState, ComponentType, ErrorInfo, Params,
    ProjectMetadata, ProjectPatch, Timestamp,
};
pub use config::{OrchestratorConfig, QuoteConfig};
pub use engine::{CalculationContext, CalculationEngine, DependencyResults, FnEngine};
pub use error::{CalculationError, ConfigError, GraphError, ListenerError, OrchestratorError, StoreError};
pub use graph::{DependencyGraph, DependencySpec, DependencyTable, Violation};
pub use orchestrator::{
    Orchestrator, OrchestratorState, PassOutcome, PassReport, ScheduleOptions, TimerHandle,
};
pub use store::{Store, StoreChange, StoreEvent, Subscription};
