//! Configuration
//!
//! Everything the core needs is passed in through constructors. There are no
//! environment variables, flags or process-wide tables, so any number of
//! independent graphs and orchestrators can live side by side.
//!
//! A complete setup can be described by one JSON document:
//!
//! ```json
//! {
//!   "orchestrator": { "debounce_ms": 50, "max_history": 200 },
//!   "graph": {
//!     "components": ["capital", "support", "combined"],
//!     "dependencies": { "support": ["capital"], "combined": ["*"] }
//!   },
//!   "components": [{ "component_type": "capital", "enabled": true }],
//!   "rules": { "prerequisites": { "support": ["capital"] } }
//! }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::component::{ComponentDefaults, ComponentType, ProjectMetadata};
use crate::engine::CalculationEngine;
use crate::error::{ConfigError, OrchestratorError};
use crate::graph::{DependencyGraph, DependencyTable};
use crate::orchestrator::Orchestrator;
use crate::store::{BusinessRules, ParamSchema, Store};

pub const DEFAULT_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_PRIORITY: i32 = 0;
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Debounce window applied after each schedule request.
    pub debounce_ms: u64,
    /// Priority used when a request does not name one.
    pub default_priority: i32,
    /// Capacity of the calculation history ring buffer.
    pub max_history: usize,
    /// Per-type debounce windows that replace `debounce_ms`.
    pub debounce_overrides_ms: IndexMap<ComponentType, u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            default_priority: DEFAULT_PRIORITY,
            max_history: DEFAULT_MAX_HISTORY,
            debounce_overrides_ms: IndexMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Debounce window for `component`, in milliseconds.
    pub fn debounce_for(&self, component: &ComponentType) -> u64 {
        self.debounce_overrides_ms
            .get(component)
            .copied()
            .unwrap_or(self.debounce_ms)
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_debounce_override(mut self, component: impl Into<ComponentType>, debounce_ms: u64) -> Self {
        self.debounce_overrides_ms.insert(component.into(), debounce_ms);
        self
    }
}

/// A whole quote-builder setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub orchestrator: OrchestratorConfig,
    pub graph: DependencyTable,
    pub project: ProjectMetadata,
    /// Defaults for components. Graph components without an entry start
    /// disabled with empty params.
    pub components: Vec<ComponentDefaults>,
    pub rules: BusinessRules,
    pub schema: ParamSchema,
}

impl QuoteConfig {
    /// Parse and sanity-check a configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Catch references to component types the graph does not declare, and
    /// business rules that can never be satisfied.
    pub fn check(&self) -> Result<(), ConfigError> {
        let known = |ty: &ComponentType| self.graph.components.contains(ty);

        if let Some(d) = self.components.iter().find(|d| !known(&d.component_type)) {
            return Err(ConfigError::Invalid(format!(
                "defaults given for undeclared component `{}`",
                d.component_type
            )));
        }
        if let Some(ty) = self.orchestrator.debounce_overrides_ms.keys().find(|t| !known(t)) {
            return Err(ConfigError::Invalid(format!(
                "debounce override for undeclared component `{ty}`"
            )));
        }
        if let Some(conflict) = self.rules.conflicts().into_iter().next() {
            return Err(ConfigError::Invalid(conflict.to_string()));
        }
        Ok(())
    }

    /// Build the graph, the store and the orchestrator wired to each other.
    pub fn build<E>(
        self,
        engine: E,
        clock: Arc<dyn Clock>,
    ) -> Result<(Arc<Store>, Arc<Orchestrator>), OrchestratorError>
    where
        E: CalculationEngine + 'static,
    {
        let graph = DependencyGraph::from_table(&self.graph);

        let mut defaults: IndexMap<ComponentType, ComponentDefaults> = self
            .graph
            .components
            .iter()
            .map(|ty| (ty.clone(), ComponentDefaults::new(ty.clone())))
            .collect();
        for d in self.components {
            defaults.insert(d.component_type.clone(), d);
        }

        let store = Arc::new(
            Store::new(self.project, defaults.into_values())
                .with_rules(self.rules)
                .with_schema(self.schema)
                .with_clock(clock.clone()),
        );
        let orchestrator = Orchestrator::new(graph, store.clone(), engine, clock, self.orchestrator)?;
        Ok((store, orchestrator))
    }
}

/// Parse an orchestrator config on its own.
pub fn load_config_json(raw: &str) -> Result<OrchestratorConfig, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parse a dependency table on its own.
pub fn load_table_json(raw: &str) -> Result<DependencyTable, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}
