//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph:
//! one node per registered component type.

use smallvec::SmallVec;

use crate::component::ComponentType;

/// Edge list. Most components read at most a handful of others.
pub type Edges = SmallVec<[ComponentType; 4]>;

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    /// The component type this node stands for.
    component_type: ComponentType,

    /// Registration position. Used as the deterministic tie-break.
    rank: usize,

    /// Types whose results this node reads (parents in the DAG).
    dependencies: Edges,

    /// Types that read this node's result (children in the DAG).
    dependents: Edges,

    /// Whether this node also reads every other enabled component.
    wildcard: bool,
}

impl ComponentNode {
    pub fn new(component_type: ComponentType, rank: usize) -> Self {
        Self {
            component_type,
            rank,
            dependencies: Edges::new(),
            dependents: Edges::new(),
            wildcard: false,
        }
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.component_type
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub(crate) fn mark_wildcard(&mut self) {
        self.wildcard = true;
    }

    /// Add a dependency. Duplicate edges are ignored.
    pub(crate) fn add_dependency(&mut self, ty: ComponentType) -> bool {
        if self.dependencies.contains(&ty) {
            return false;
        }
        self.dependencies.push(ty);
        true
    }

    pub(crate) fn add_dependent(&mut self, ty: ComponentType) {
        if !self.dependents.contains(&ty) {
            self.dependents.push(ty);
        }
    }

    /// Static dependencies, in declaration order.
    pub fn dependencies(&self) -> &[ComponentType] {
        &self.dependencies
    }

    /// Direct static dependents, in declaration order.
    pub fn dependents(&self) -> &[ComponentType] {
        &self.dependents
    }
}
