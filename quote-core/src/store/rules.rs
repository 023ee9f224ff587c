//! Business rules applied inside a component commit.
//!
//! Two kinds of rule exist:
//!
//! - exclusive groups: at most one member of a group is enabled; enabling one
//!   disables the others
//! - prerequisites: enabling a component force-enables what it requires, and
//!   disabling a prerequisite disables everything that requires it
//!
//! Rules only produce a plan. The store applies the plan in the same commit
//! as the triggering update, so no rule ever re-enters the public mutation
//! API.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::component::ComponentType;
use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRules {
    exclusive_groups: Vec<Vec<ComponentType>>,
    prerequisites: IndexMap<ComponentType, Vec<ComponentType>>,
}

/// Enabled-flag changes implied by one toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TogglePlan {
    pub enable: IndexSet<ComponentType>,
    pub disable: IndexSet<ComponentType>,
}

impl BusinessRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a mutually exclusive group.
    pub fn exclusive<I, T>(mut self, group: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ComponentType>,
    {
        self.exclusive_groups
            .push(group.into_iter().map(Into::into).collect());
        self
    }

    /// Declare that `component` can only be enabled together with
    /// `prerequisite`.
    pub fn requires(mut self, component: impl Into<ComponentType>, prerequisite: impl Into<ComponentType>) -> Self {
        let prerequisite = prerequisite.into();
        let entry = self.prerequisites.entry(component.into()).or_default();
        if !entry.contains(&prerequisite) {
            entry.push(prerequisite);
        }
        self
    }

    pub fn prerequisites_of(&self, component: &ComponentType) -> &[ComponentType] {
        self.prerequisites
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Peers that are disabled when `component` is enabled.
    pub fn exclusive_peers(&self, component: &ComponentType) -> IndexSet<ComponentType> {
        self.exclusive_groups
            .iter()
            .filter(|group| group.contains(component))
            .flatten()
            .filter(|peer| *peer != component)
            .cloned()
            .collect()
    }

    /// Every rule combination that can never be satisfied: a component whose
    /// prerequisites include two members of one exclusive group.
    pub fn conflicts(&self) -> Vec<StoreError> {
        self.prerequisites
            .keys()
            .filter_map(|ty| self.plan_enable(ty).err())
            .collect()
    }

    /// Everything that changes when `component` is enabled.
    ///
    /// Fails when the prerequisites of `component` would break an exclusive
    /// group.
    pub(crate) fn plan_enable(&self, component: &ComponentType) -> Result<TogglePlan, StoreError> {
        let enable = self.closure(component, |ty| self.prerequisites_of(ty).to_vec());

        for group in &self.exclusive_groups {
            let mut members = group.iter().filter(|ty| enable.contains(*ty));
            if let (Some(first), Some(second)) = (members.next(), members.next()) {
                return Err(StoreError::RuleConflict {
                    component: component.clone(),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }

        let mut disable = IndexSet::new();
        for ty in &enable {
            for peer in self.exclusive_peers(ty) {
                if enable.contains(&peer) {
                    continue;
                }
                for cascaded in self.plan_disable(&peer).disable {
                    if !enable.contains(&cascaded) {
                        disable.insert(cascaded);
                    }
                }
            }
        }

        Ok(TogglePlan { enable, disable })
    }

    /// Everything that changes when `component` is disabled.
    pub(crate) fn plan_disable(&self, component: &ComponentType) -> TogglePlan {
        let disable = self.closure(component, |ty| self.required_by(ty));
        TogglePlan {
            enable: IndexSet::new(),
            disable,
        }
    }

    fn required_by(&self, prerequisite: &ComponentType) -> Vec<ComponentType> {
        self.prerequisites
            .iter()
            .filter(|(_, reqs)| reqs.contains(prerequisite))
            .map(|(ty, _)| ty.clone())
            .collect()
    }

    /// `start` plus everything reachable through `next`.
    fn closure<F>(&self, start: &ComponentType, next: F) -> IndexSet<ComponentType>
    where
        F: Fn(&ComponentType) -> Vec<ComponentType>,
    {
        let mut found = IndexSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(current) = queue.pop_front() {
            for ty in next(&current) {
                if found.insert(ty.clone()) {
                    queue.push_back(ty);
                }
            }
        }
        found
    }
}
