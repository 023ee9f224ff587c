//! Dependency Graph
//!
//! This module implements the static graph describing which component
//! types need which other component types' results before they can be
//! priced.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are component types, registered up front
//! - Edges are dependencies: if `support` reads `capital`'s result, there is an
//!   edge from `capital` to `support`
//! - A node may also carry a wildcard dependency, meaning "every other
//!   enabled component". Wildcards are never stored as edges; they are
//!   resolved against the live enabled set whenever an order is computed.
//!
//! # Design Decisions
//!
//! 1. Nodes are kept in an `IndexMap` so registration order is the
//!    deterministic tie-break for every ordering the graph produces.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are stored to
//!    make dirty propagation a plain traversal.
//!
//! 3. A wildcard node only resolves to types that do not read a wildcard,
//!    directly or through static edges. With several wildcard nodes, anything
//!    looser lets two of them reach each other through their dependents.

mod node;
mod order;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::OnceLock;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::component::ComponentType;
use crate::error::GraphError;

pub use node::ComponentNode;
pub use order::Leveled;

/// Marker used for the wildcard dependency in configuration tables.
pub const WILDCARD: &str = "*";

/// One entry in a dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencySpec {
    /// Reads one specific component type.
    Component(ComponentType),
    /// Reads every other currently enabled component type.
    Wildcard,
}

impl From<&str> for DependencySpec {
    fn from(name: &str) -> Self {
        if name == WILDCARD {
            DependencySpec::Wildcard
        } else {
            DependencySpec::Component(name.into())
        }
    }
}

impl From<ComponentType> for DependencySpec {
    fn from(ty: ComponentType) -> Self {
        DependencySpec::Component(ty)
    }
}

impl Serialize for DependencySpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DependencySpec::Component(ty) => serializer.serialize_str(ty.as_str()),
            DependencySpec::Wildcard => serializer.serialize_str(WILDCARD),
        }
    }
}

impl<'de> Deserialize<'de> for DependencySpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DependencySpec::from(raw.as_str()))
    }
}

/// Declarative form of a graph, as loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyTable {
    /// Every component type, in registration order.
    pub components: Vec<ComponentType>,
    /// `type -> what it reads`.
    pub dependencies: IndexMap<ComponentType, Vec<DependencySpec>>,
}

/// A structural problem found by [`DependencyGraph::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A cycle; the path starts and ends at the same type.
    Cycle { path: Vec<ComponentType> },
    /// `from` references a type that was never registered.
    UnknownComponent {
        from: ComponentType,
        missing: ComponentType,
    },
    /// A type was listed more than once.
    DuplicateComponent { component: ComponentType },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Cycle { path } => {
                let path: Vec<&str> = path.iter().map(|t| t.as_str()).collect();
                write!(f, "cycle: {}", path.join(" -> "))
            }
            Violation::UnknownComponent { from, missing } => {
                write!(f, "`{from}` depends on unknown component `{missing}`")
            }
            Violation::DuplicateComponent { component } => {
                write!(f, "`{component}` is registered more than once")
            }
        }
    }
}

/// The component dependency graph.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// All nodes, in registration order.
    nodes: IndexMap<ComponentType, ComponentNode>,

    /// Problems recorded by an unchecked bulk load, reported by `validate`.
    recorded: Vec<Violation>,

    /// Cached full ordering. Reset on every mutation.
    order_cache: OnceLock<Result<Vec<Leveled>, GraphError>>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a configuration table.
    ///
    /// Unlike [`register_dependency`](Self::register_dependency), this does
    /// not reject bad entries. Unknown references and cycles are kept (or
    /// recorded) so that [`validate`](Self::validate) can report every
    /// problem at once.
    pub fn from_table(table: &DependencyTable) -> Self {
        let mut graph = Self::new();

        for ty in &table.components {
            if graph.register_component(ty.clone()).is_err() {
                graph.recorded.push(Violation::DuplicateComponent {
                    component: ty.clone(),
                });
            }
        }

        for (from, specs) in &table.dependencies {
            if !graph.nodes.contains_key(from) {
                graph.recorded.push(Violation::UnknownComponent {
                    from: from.clone(),
                    missing: from.clone(),
                });
                continue;
            }
            for spec in specs {
                match spec {
                    DependencySpec::Wildcard => {
                        if let Some(node) = graph.nodes.get_mut(from) {
                            node.mark_wildcard();
                        }
                    }
                    DependencySpec::Component(dep) if graph.nodes.contains_key(dep) => {
                        graph.link(from, dep);
                    }
                    DependencySpec::Component(dep) => {
                        graph.recorded.push(Violation::UnknownComponent {
                            from: from.clone(),
                            missing: dep.clone(),
                        });
                    }
                }
            }
        }

        graph
    }

    /// Register a component type as a node.
    pub fn register_component(&mut self, ty: impl Into<ComponentType>) -> Result<(), GraphError> {
        let ty = ty.into();
        if self.nodes.contains_key(&ty) {
            return Err(GraphError::DuplicateComponent(ty));
        }
        let rank = self.nodes.len();
        self.nodes.insert(ty.clone(), ComponentNode::new(ty, rank));
        self.invalidate();
        Ok(())
    }

    /// Declare that `ty` reads the results of `deps`.
    ///
    /// All-or-nothing: if any entry is rejected, no edge is added.
    pub fn register_dependency<I, S>(&mut self, ty: impl Into<ComponentType>, deps: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<DependencySpec>,
    {
        let ty = ty.into();
        if !self.nodes.contains_key(&ty) {
            return Err(GraphError::UnknownComponent(ty));
        }

        let specs: Vec<DependencySpec> = deps.into_iter().map(Into::into).collect();
        for spec in &specs {
            if let DependencySpec::Component(dep) = spec {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnknownComponent(dep.clone()));
                }
                if let Some(path) = self.path_between(dep, &ty) {
                    let mut cycle = Vec::with_capacity(path.len() + 1);
                    cycle.push(ty.clone());
                    cycle.extend(path);
                    return Err(GraphError::CycleDetected { path: cycle });
                }
            }
        }

        for spec in specs {
            match spec {
                DependencySpec::Wildcard => {
                    if let Some(node) = self.nodes.get_mut(&ty) {
                        node.mark_wildcard();
                    }
                }
                DependencySpec::Component(dep) => self.link(&ty, &dep),
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Check the whole graph. An empty result means the graph is usable.
    ///
    /// Besides static cycles, this also orders the graph with every type
    /// enabled and wildcards resolved, so no cycle can surface at drain time.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = self.recorded.clone();
        let cycles = self.find_cycles();
        let statically_acyclic = cycles.is_empty();
        violations.extend(cycles.into_iter().map(|path| Violation::Cycle { path }));

        if statically_acyclic {
            if let Err(GraphError::CycleDetected { path }) = self.leveled() {
                violations.push(Violation::Cycle { path });
            }
        }
        violations
    }

    /// A total order over every node consistent with all edges.
    ///
    /// Wildcard nodes come after every type they could resolve to.
    pub fn topological_order(&self) -> Result<Vec<ComponentType>, GraphError> {
        self.leveled()
            .map(|order| order.iter().map(|e| e.component_type.clone()).collect())
    }

    /// The level of `ty` in the full ordering (0 for nodes without
    /// dependencies).
    pub fn level(&self, ty: &ComponentType) -> Option<usize> {
        self.leveled()
            .ok()?
            .iter()
            .find(|e| &e.component_type == ty)
            .map(|e| e.level)
    }

    /// Every type that directly or transitively reads `ty`'s result,
    /// including wildcard nodes.
    pub fn get_dependents(&self, ty: &ComponentType) -> IndexSet<ComponentType> {
        let readers_of_wildcards = self.wildcard_readers();
        let mut found = IndexSet::new();
        let mut queue = VecDeque::from([ty.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };

            let mut next: Vec<ComponentType> = node.dependents().to_vec();
            if !node.is_wildcard() && !readers_of_wildcards.contains(&current) {
                next.extend(self.wildcard_nodes().map(|w| w.component_type().clone()));
            }

            for dependent in next {
                if &dependent != ty && found.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        found
    }

    /// Expand `for_type`'s wildcard against the enabled set.
    ///
    /// The result is every other enabled type in registration order, minus
    /// wildcard nodes and minus every type that reads a wildcard node through
    /// static edges (which covers `for_type`'s own dependents).
    pub fn resolve_wildcard(
        &self,
        enabled: &HashSet<ComponentType>,
        for_type: &ComponentType,
    ) -> IndexSet<ComponentType> {
        let excluded = self.wildcard_readers();
        self.nodes
            .values()
            .filter(|n| !n.is_wildcard())
            .map(|n| n.component_type())
            .filter(|t| *t != for_type && enabled.contains(*t) && !excluded.contains(*t))
            .cloned()
            .collect()
    }

    /// Static dependencies plus the resolved wildcard, if any.
    pub fn resolved_dependencies(
        &self,
        ty: &ComponentType,
        enabled: &HashSet<ComponentType>,
    ) -> IndexSet<ComponentType> {
        let Some(node) = self.nodes.get(ty) else {
            return IndexSet::new();
        };
        let mut deps: IndexSet<ComponentType> = node.dependencies().iter().cloned().collect();
        if node.is_wildcard() {
            deps.extend(self.resolve_wildcard(enabled, ty));
        }
        deps
    }

    /// Order `members` for execution against the given enabled set.
    ///
    /// Dependencies come first. Members on the same level run in descending
    /// `priority_of` order, then in registration order.
    pub fn execution_order<P>(
        &self,
        members: &IndexSet<ComponentType>,
        enabled: &HashSet<ComponentType>,
        priority_of: P,
    ) -> Result<Vec<Leveled>, GraphError>
    where
        P: Fn(&ComponentType) -> i32,
    {
        if let Some(unknown) = members.iter().find(|m| !self.nodes.contains_key(*m)) {
            return Err(GraphError::UnknownComponent(unknown.clone()));
        }
        order::leveled_order(
            members,
            |ty| self.resolved_dependencies(ty, enabled).into_iter().collect(),
            |ty| self.rank(ty),
            priority_of,
        )
        .map_err(|leftover| self.cycle_error(&leftover))
    }

    /// Static dependencies of `ty`.
    pub fn dependencies(&self, ty: &ComponentType) -> &[ComponentType] {
        self.nodes.get(ty).map(|n| n.dependencies()).unwrap_or(&[])
    }

    pub fn has_wildcard(&self, ty: &ComponentType) -> bool {
        self.nodes.get(ty).is_some_and(|n| n.is_wildcard())
    }

    pub fn contains(&self, ty: &ComponentType) -> bool {
        self.nodes.contains_key(ty)
    }

    pub fn node(&self, ty: &ComponentType) -> Option<&ComponentNode> {
        self.nodes.get(ty)
    }

    /// Registered types in registration order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentType> {
        self.nodes.keys()
    }

    fn rank(&self, ty: &ComponentType) -> usize {
        self.nodes.get(ty).map(|n| n.rank()).unwrap_or(usize::MAX)
    }

    fn link(&mut self, from: &ComponentType, dep: &ComponentType) {
        let added = match self.nodes.get_mut(from) {
            Some(node) => node.add_dependency(dep.clone()),
            None => false,
        };
        if added {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.add_dependent(from.clone());
            }
        }
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.order_cache = OnceLock::new();
    }

    fn wildcard_nodes(&self) -> impl Iterator<Item = &ComponentNode> {
        self.nodes.values().filter(|n| n.is_wildcard())
    }

    /// Types that read some wildcard node, directly or transitively, through
    /// static edges. Wildcards never resolve to these.
    fn wildcard_readers(&self) -> HashSet<ComponentType> {
        let mut readers = HashSet::new();
        for wildcard in self.wildcard_nodes() {
            readers.extend(self.static_dependents(wildcard.component_type()));
        }
        readers
    }

    /// Transitive dependents through static edges only.
    fn static_dependents(&self, ty: &ComponentType) -> HashSet<ComponentType> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for dependent in node.dependents() {
                    if found.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        found
    }

    /// DFS along dependency edges from `start`, looking for `target`.
    ///
    /// Returns the path `start .. target` if one exists.
    fn path_between(&self, start: &ComponentType, target: &ComponentType) -> Option<Vec<ComponentType>> {
        let mut stack = vec![(start.clone(), vec![start.clone()])];
        let mut visited = HashSet::new();

        while let Some((current, path)) = stack.pop() {
            if &current == target {
                return Some(path);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for dep in node.dependencies().iter().rev() {
                    let mut next = path.clone();
                    next.push(dep.clone());
                    stack.push((dep.clone(), next));
                }
            }
        }
        None
    }

    /// Every distinct cycle reachable through static edges.
    fn find_cycles(&self) -> Vec<Vec<ComponentType>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            ty: &ComponentType,
            marks: &mut IndexMap<ComponentType, Mark>,
            stack: &mut Vec<ComponentType>,
            cycles: &mut Vec<Vec<ComponentType>>,
        ) {
            marks.insert(ty.clone(), Mark::InProgress);
            stack.push(ty.clone());

            for dep in graph.dependencies(ty) {
                match marks.get(dep).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Unvisited => visit(graph, dep, marks, stack, cycles),
                    Mark::InProgress => {
                        if let Some(start) = stack.iter().position(|t| t == dep) {
                            let mut path = stack[start..].to_vec();
                            path.push(dep.clone());
                            cycles.push(path);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks.insert(ty.clone(), Mark::Done);
        }

        let mut marks: IndexMap<ComponentType, Mark> = self
            .nodes
            .keys()
            .map(|k| (k.clone(), Mark::Unvisited))
            .collect();
        let mut cycles = Vec::new();
        let mut stack = Vec::new();

        for ty in self.nodes.keys() {
            if marks.get(ty).copied() == Some(Mark::Unvisited) {
                visit(self, ty, &mut marks, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn cycle_error(&self, leftover: &[ComponentType]) -> GraphError {
        let path = self
            .find_cycles()
            .into_iter()
            .next()
            .unwrap_or_else(|| leftover.to_vec());
        GraphError::CycleDetected { path }
    }

    fn leveled(&self) -> Result<&[Leveled], GraphError> {
        self.order_cache
            .get_or_init(|| {
                let all: IndexSet<ComponentType> = self.nodes.keys().cloned().collect();
                let everything: HashSet<ComponentType> = all.iter().cloned().collect();
                self.execution_order(&all, &everything, |_| 0)
            })
            .as_ref()
            .map(|order| order.as_slice())
            .map_err(Clone::clone)
    }
}
