// Facts: typed key/value pairs accumulated during a run.
//
// Every fact key has a declared type in the project's fact registry.
// Values entering the engine (answers, literals, calculation inputs) pass
// through an explicit per-declared-type coercion; non-coercible input fails
// loudly rather than being massaged into place.

use crate::expr::types::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// FACT TYPES & VALUES
// ============================================================================

/// Declared type of a fact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Boolean,
    Number,
    Text,
    /// Closed set of string values. Evaluates as text.
    Enum,
}

impl FactType {
    pub fn value_type(&self) -> ValueType {
        match self {
            FactType::Boolean => ValueType::Boolean,
            FactType::Number => ValueType::Number,
            FactType::Text | FactType::Enum => ValueType::Text,
        }
    }

    /// Coerce a raw JSON value to this declared type.
    ///
    /// Strict: booleans stay booleans, numbers stay numbers, strings stay
    /// strings. `1` does not become `true` and `"5"` does not become `5.0`.
    pub fn coerce(&self, key: &str, raw: &serde_json::Value) -> Result<FactValue, CoercionError> {
        let coerced = match self {
            FactType::Boolean => raw.as_bool().map(FactValue::Boolean),
            FactType::Number => raw.as_f64().map(FactValue::Number),
            FactType::Text | FactType::Enum => {
                raw.as_str().map(|s| FactValue::Text(s.to_string()))
            }
        };

        coerced.ok_or_else(|| CoercionError::NotCoercible {
            key: key.to_string(),
            expected: *self,
            found: raw.clone(),
        })
    }
}

/// Runtime fact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl FactValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            FactValue::Boolean(_) => ValueType::Boolean,
            FactValue::Number(_) => ValueType::Number,
            FactValue::Text(_) => ValueType::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FactValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Coercion failures at the storage boundary.
#[derive(Debug, Error, PartialEq)]
pub enum CoercionError {
    #[error("value {found} cannot coerce to declared type {expected:?} for fact '{key}'")]
    NotCoercible {
        key: String,
        expected: FactType,
        found: serde_json::Value,
    },
}

// ============================================================================
// REGISTRY & RECORDS
// ============================================================================

/// Fact key → declared type, materialized alongside a loaded graph.
pub type FactRegistry = BTreeMap<String, FactType>;

/// A fact definition as supplied by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDefinition {
    pub key: String,
    pub fact_type: FactType,
}

/// One stored fact, tagged with the answer batch that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub key: String,
    pub value: FactValue,
    pub batch_id: u64,
}

/// Current fact view: key → value, latest batch wins.
pub type FactMap = BTreeMap<String, FactValue>;

/// Fold append-only records into the current view.
///
/// Records are stored in insertion order, so a later batch re-producing a
/// key simply overwrites the earlier value in the view.
pub fn latest_view(records: &[FactRecord]) -> FactMap {
    let mut view = FactMap::new();
    for record in records {
        view.insert(record.key.clone(), record.value.clone());
    }
    view
}

// ============================================================================
// TESTS
// ============================================================================
