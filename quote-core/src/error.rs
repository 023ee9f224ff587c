//! Error Types
//!
//! Structural errors (unknown component types, dependency cycles) are
//! returned synchronously to whoever caused them. Calculation and listener
//! errors are absorbed: the orchestrator records calculation failures on the
//! component, and the store logs listener failures and keeps notifying.

use thiserror::Error;

use crate::component::ComponentType;

/// Errors raised while building or querying the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A dependency declaration or query referenced a type that was never
    /// registered as a node.
    #[error("unknown component type `{0}`")]
    UnknownComponent(ComponentType),

    /// The same component type was registered twice.
    #[error("component type `{0}` is already registered")]
    DuplicateComponent(ComponentType),

    /// The graph contains (or an edge would close) a cycle.
    ///
    /// `path` lists the cycle's members, starting and ending at the same type.
    #[error("dependency cycle detected: {}", format_path(.path))]
    CycleDetected { path: Vec<ComponentType> },
}

/// Errors raised by the store's mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown component type `{0}`")]
    UnknownComponent(ComponentType),

    /// A parameter failed sanitization. Nothing was committed.
    #[error("invalid parameter `{field}` for `{component}`: {reason}")]
    InvalidParam {
        component: ComponentType,
        field: String,
        reason: String,
    },

    /// Enabling `component` would force on two members of one exclusive
    /// group. Nothing was committed.
    #[error("cannot enable `{component}`: it requires both `{first}` and `{second}`, which are exclusive")]
    RuleConflict {
        component: ComponentType,
        first: ComponentType,
        second: ComponentType,
    },
}

/// A failure reported by the calculation engine for one component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("calculation failed: {0}")]
    Failed(String),

    #[error("missing parameter `{0}`")]
    MissingParam(String),

    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParam { field: String, reason: String },

    /// The engine panicked. The panic was caught at the pass boundary.
    #[error("calculation panicked: {0}")]
    Panicked(String),
}

impl CalculationError {
    /// Short machine-readable label, stored alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            CalculationError::Failed(_) => "failed",
            CalculationError::MissingParam(_) => "missing_param",
            CalculationError::InvalidParam { .. } => "invalid_param",
            CalculationError::Panicked(_) => "panicked",
        }
    }
}

/// Returned by a store listener that could not handle a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised by the orchestrator's public API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// The graph failed validation; the orchestrator refuses to schedule
    /// against it.
    #[error("dependency graph is invalid ({} violations)", .0.len())]
    InvalidGraph(Vec<crate::graph::Violation>),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown component type `{0}`")]
    UnknownComponent(ComponentType),

    /// The store and the graph disagree on the set of component types.
    #[error("component type `{0}` is in the graph but not in the store")]
    MissingFromStore(ComponentType),
}

/// Errors raised while loading configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn format_path(path: &[ComponentType]) -> String {
    path.iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
