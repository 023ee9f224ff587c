//! Calculation Engine Seam
//!
//! The pricing formulas live outside this crate. The orchestrator only needs a
//! pure, fast function per component type that turns parameters plus the
//! results of declared dependencies into a priced result.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::component::{ComponentType, Params, ProjectMetadata};
use crate::error::CalculationError;

/// Results of a component's resolved dependencies, in resolution order.
pub type DependencyResults = IndexMap<ComponentType, Value>;

/// Everything besides its own params that a calculation may read.
#[derive(Debug, Clone, Copy)]
pub struct CalculationContext<'a> {
    pub project: &'a ProjectMetadata,
    pub dependencies: &'a DependencyResults,
}

impl<'a> CalculationContext<'a> {
    /// Result of one dependency, if it was available for this pass.
    pub fn dependency(&self, ty: &str) -> Option<&'a Value> {
        self.dependencies.get(ty)
    }
}

/// Computes one component's price.
///
/// Implementations must be pure and must not block: they run inline inside a
/// drain pass.
pub trait CalculationEngine: Send + Sync {
    fn compute(
        &self,
        component: &ComponentType,
        params: &Params,
        ctx: &CalculationContext<'_>,
    ) -> Result<Value, CalculationError>;
}

impl<E: CalculationEngine + ?Sized> CalculationEngine for Arc<E> {
    fn compute(
        &self,
        component: &ComponentType,
        params: &Params,
        ctx: &CalculationContext<'_>,
    ) -> Result<Value, CalculationError> {
        (**self).compute(component, params, ctx)
    }
}

/// Adapter turning a closure into an engine.
pub struct FnEngine<F> {
    compute: F,
}

impl<F> FnEngine<F>
where
    F: Fn(&ComponentType, &Params, &CalculationContext<'_>) -> Result<Value, CalculationError>
        + Send
        + Sync,
{
    pub fn new(compute: F) -> Self {
        Self { compute }
    }
}

impl<F> CalculationEngine for FnEngine<F>
where
    F: Fn(&ComponentType, &Params, &CalculationContext<'_>) -> Result<Value, CalculationError>
        + Send
        + Sync,
{
    fn compute(
        &self,
        component: &ComponentType,
        params: &Params,
        ctx: &CalculationContext<'_>,
    ) -> Result<Value, CalculationError> {
        (self.compute)(component, params, ctx)
    }
}
