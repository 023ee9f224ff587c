//! Component Model
//!
//! A component is one pricing module of a quote (monitoring, capital
//! financing, support, ...). The store owns every component's state; this
//! module only defines the shapes.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::CalculationError;

/// Milliseconds since the owning clock's origin.
pub type Timestamp = u64;

/// Component parameters, kept in insertion order.
pub type Params = IndexMap<String, Value>;

/// Identifier of a component type.
///
/// Cloning is a reference-count bump, so the orchestrator can pass types
/// around freely while building execution orders.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType(Arc<str>);

impl ComponentType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ComponentType {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ComponentType> for ComponentType {
    fn from(ty: &ComponentType) -> Self {
        ty.clone()
    }
}

impl std::borrow::Borrow<str> for ComponentType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for ComponentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ComponentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Error details recorded on a component whose calculation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&CalculationError> for ErrorInfo {
    fn from(err: &CalculationError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Initial state of a component, used on creation and on reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefaults {
    pub component_type: ComponentType,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub params: Params,
}

impl ComponentDefaults {
    pub fn new(component_type: impl Into<ComponentType>) -> Self {
        Self {
            component_type: component_type.into(),
            enabled: false,
            params: Params::new(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// The live state of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub component_type: ComponentType,
    pub enabled: bool,
    pub params: Params,
    pub result: Option<Value>,
    /// Set when params (or an upstream result) changed since the last
    /// write-back from the orchestrator.
    pub dirty: bool,
    pub error: Option<ErrorInfo>,
    pub last_computed_at: Option<Timestamp>,
}

impl ComponentState {
    /// Components start dirty so the first pass computes them.
    pub fn from_defaults(defaults: &ComponentDefaults) -> Self {
        Self {
            component_type: defaults.component_type.clone(),
            enabled: defaults.enabled,
            params: defaults.params.clone(),
            result: None,
            dirty: true,
            error: None,
            last_computed_at: None,
        }
    }
}

/// A partial update to one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentPatch {
    pub enabled: Option<bool>,
    /// Merged into the existing params; later keys win.
    pub params: Params,
    pub remove_params: Vec<String>,
}

impl ComponentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self) -> Self {
        self.enabled = Some(true);
        self
    }

    pub fn disable(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove_params.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.params.is_empty() && self.remove_params.is_empty()
    }
}

/// Quote-wide metadata shared by every component's calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectMetadata {
    pub name: String,
    pub customer: Option<String>,
    pub currency: String,
    pub fields: Params,
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            customer: None,
            currency: "EUR".to_string(),
            fields: Params::new(),
        }
    }
}

/// A partial update to the project metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub customer: Option<Option<String>>,
    pub currency: Option<String>,
    pub fields: Params,
}

impl ProjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn customer(mut self, customer: Option<String>) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub(crate) fn apply(self, project: &mut ProjectMetadata) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(customer) = self.customer {
            project.customer = customer;
        }
        if let Some(currency) = self.currency {
            project.currency = currency;
        }
        for (key, value) in self.fields {
            project.fields.insert(key, value);
        }
    }
}
