//! Execution Ordering
//!
//! Orders a set of component types so that dependencies always come before
//! their dependents.
//!
//! # Algorithm
//!
//! Kahn's algorithm, extended to track levels:
//!
//! 1. Count each member's in-degree, only counting edges inside the set
//! 2. Members with in-degree zero are level 0
//! 3. Removing a member lowers its dependents' in-degree; a dependent's level
//!    is one more than the deepest dependency removed so far
//! 4. Sort by (level, priority descending, registration rank)
//!
//! A dependency's level is always strictly lower than its dependent's, so the
//! final sort can never invert an edge. Priority only reorders members that
//! share a level.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;

use crate::component::ComponentType;

/// A member of an ordering together with its level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leveled {
    pub component_type: ComponentType,
    pub level: usize,
}

/// Order `members` by dependency level.
///
/// `deps_of` returns the dependencies of a member (members outside the set are
/// ignored). Returns the members left over when the set contains a cycle.
pub(crate) fn leveled_order<D, R, P>(
    members: &IndexSet<ComponentType>,
    deps_of: D,
    rank_of: R,
    priority_of: P,
) -> Result<Vec<Leveled>, Vec<ComponentType>>
where
    D: Fn(&ComponentType) -> Vec<ComponentType>,
    R: Fn(&ComponentType) -> usize,
    P: Fn(&ComponentType) -> i32,
{
    let mut in_degree: HashMap<&ComponentType, usize> = HashMap::with_capacity(members.len());
    let mut dependents: HashMap<&ComponentType, Vec<&ComponentType>> = HashMap::new();
    let mut level: HashMap<&ComponentType, usize> = HashMap::with_capacity(members.len());
    let mut queue = VecDeque::new();

    // Calculate in-degrees (only counting edges within the member set)
    for member in members {
        let mut degree = 0;
        for dep in deps_of(member) {
            if let Some(dep) = members.get(&dep) {
                if dep != member {
                    degree += 1;
                    dependents.entry(dep).or_default().push(member);
                }
            }
        }
        in_degree.insert(member, degree);
        if degree == 0 {
            level.insert(member, 0);
            queue.push_back(member);
        }
    }

    let mut result = Vec::with_capacity(members.len());
    while let Some(member) = queue.pop_front() {
        let member_level = level.get(member).copied().unwrap_or(0);
        result.push(Leveled {
            component_type: member.clone(),
            level: member_level,
        });

        if let Some(children) = dependents.get(member) {
            for &child in children {
                let child_level = level.entry(child).or_insert(0);
                *child_level = (*child_level).max(member_level + 1);
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    if result.len() < members.len() {
        let leftover = members
            .iter()
            .filter(|m| in_degree.get(m).is_some_and(|d| *d > 0))
            .cloned()
            .collect();
        return Err(leftover);
    }

    result.sort_by_key(|entry| {
        (
            entry.level,
            Reverse(priority_of(&entry.component_type)),
            rank_of(&entry.component_type),
        )
    });
    Ok(result)
}
