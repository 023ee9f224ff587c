//! Parameter sanitization.
//!
//! Form widgets hand over loosely typed values ("12" for a number, "true"
//! for a checkbox). A [`ParamSchema`] coerces them to the declared type and
//! clamps numbers into bounds before the store commits anything. Fields
//! without a rule pass through untouched, as does `null` (clearing a field).

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::component::{ComponentType, Params};
use crate::error::StoreError;

/// How one parameter is coerced and checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldRule {
    /// Floating-point number, clamped into `[min, max]`.
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Whole number, clamped into `[min, max]`.
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Bool,
    /// Free text. Longer values are rejected, not truncated.
    Text {
        #[serde(default)]
        max_len: Option<usize>,
    },
    /// One of a fixed set of strings.
    Choice { values: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSchema {
    fields: HashMap<ComponentType, IndexMap<String, FieldRule>>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, component: impl Into<ComponentType>, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields
            .entry(component.into())
            .or_default()
            .insert(name.into(), rule);
        self
    }

    pub fn rule(&self, component: &ComponentType, name: &str) -> Option<&FieldRule> {
        self.fields.get(component)?.get(name)
    }

    /// Coerce every field of `params` that has a rule.
    ///
    /// Fails on the first field that cannot be coerced; nothing is partially
    /// applied.
    pub fn sanitize(&self, component: &ComponentType, params: Params) -> Result<Params, StoreError> {
        let Some(rules) = self.fields.get(component) else {
            return Ok(params);
        };

        params
            .into_iter()
            .map(|(name, value)| match rules.get(&name) {
                Some(rule) if !value.is_null() => rule
                    .apply(value)
                    .map(|value| (name.clone(), value))
                    .map_err(|reason| StoreError::InvalidParam {
                        component: component.clone(),
                        field: name,
                        reason,
                    }),
                _ => Ok((name, value)),
            })
            .collect()
    }
}

impl FieldRule {
    fn apply(&self, value: Value) -> Result<Value, String> {
        match self {
            FieldRule::Number { min, max } => {
                let mut n = as_f64(&value).ok_or_else(|| format!("expected a number, got {value}"))?;
                if !n.is_finite() {
                    return Err("number must be finite".to_string());
                }
                if let Some(min) = min {
                    n = n.max(*min);
                }
                if let Some(max) = max {
                    n = n.min(*max);
                }
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| "number must be finite".to_string())
            }
            FieldRule::Integer { min, max } => {
                let mut n = as_i64(&value).ok_or_else(|| format!("expected a whole number, got {value}"))?;
                if let Some(min) = min {
                    n = n.max(*min);
                }
                if let Some(max) = max {
                    n = n.min(*max);
                }
                Ok(Value::from(n))
            }
            FieldRule::Bool => as_bool(&value)
                .map(Value::Bool)
                .ok_or_else(|| format!("expected a boolean, got {value}")),
            FieldRule::Text { max_len } => {
                let text = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => return Err(format!("expected text, got {other}")),
                };
                match max_len {
                    Some(max) if text.chars().count() > *max => {
                        Err(format!("text longer than {max} characters"))
                    }
                    _ => Ok(Value::String(text)),
                }
            }
            FieldRule::Choice { values } => match value {
                Value::String(s) if values.contains(&s) => Ok(Value::String(s)),
                other => Err(format!("expected one of {values:?}, got {other}")),
            },
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
