//! Typed state values and the condition language used by goal targets,
//! selection rules, and action preconditions.

use serde::{Deserialize, Serialize};

/// A single world-state value.
///
/// `Null` is a real value distinguishable from an absent key only through the
/// condition language (`null` matches both); typed getters treat it as unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<StateValue>),
    Null,
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view, coercing integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Int(i) => Some(*i as f64),
            StateValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    /// Equality with numeric coercion, so `Int(5)` satisfies a `Float(5.0)`
    /// condition and vice versa.
    pub fn loosely_eq(&self, other: &StateValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self == other
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        StateValue::Int(v as i64)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Float(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::String(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::String(v)
    }
}

/// Evaluate one condition against an optional actual value.
///
/// The expected side encodes operators as string prefixes: `>=`, `<=`, `<`,
/// `>` compare numerically (coercing through f64), `!null` requires the key
/// to hold a non-null value, `null` requires it to be absent or null. A list
/// expects membership. Anything else is loose equality; an absent key never
/// satisfies an equality or comparison condition.
pub fn condition_met(expected: &StateValue, actual: Option<&StateValue>) -> bool {
    match expected {
        StateValue::String(s) => {
            if let Some(rest) = s.strip_prefix(">=") {
                return numeric_cmp(actual, rest, |a, b| a >= b);
            }
            if let Some(rest) = s.strip_prefix("<=") {
                return numeric_cmp(actual, rest, |a, b| a <= b);
            }
            if let Some(rest) = s.strip_prefix('<') {
                return numeric_cmp(actual, rest, |a, b| a < b);
            }
            if let Some(rest) = s.strip_prefix('>') {
                return numeric_cmp(actual, rest, |a, b| a > b);
            }
            if s == "!null" {
                return matches!(actual, Some(v) if !v.is_null());
            }
            if s == "null" {
                return actual.is_none() || actual.is_some_and(StateValue::is_null);
            }
            matches!(actual, Some(v) if v.loosely_eq(expected))
        }
        StateValue::List(candidates) => {
            matches!(actual, Some(v) if candidates.iter().any(|c| v.loosely_eq(c)))
        }
        StateValue::Null => actual.is_none() || actual.is_some_and(StateValue::is_null),
        _ => matches!(actual, Some(v) if v.loosely_eq(expected)),
    }
}

fn numeric_cmp(actual: Option<&StateValue>, threshold: &str, op: impl Fn(f64, f64) -> bool) -> bool {
    let Some(actual) = actual.and_then(StateValue::as_f64) else {
        return false;
    };
    let Ok(threshold) = threshold.trim().parse::<f64>() else {
        return false;
    };
    op(actual, threshold)
}
