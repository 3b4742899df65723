//! State values and partitions.

#![allow(missing_docs)]

use std::fmt;

use smol_str::SmolStr;

/// Which half of the state store a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Volatile sensor/derived data, never written to storage.
    Live,
    /// Operator configuration, mirrored to storage on save.
    Persisted,
}

impl Partition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Persisted => "persisted",
        }
    }
}

/// Kind tag of a [`StateValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Str,
}

/// A single value held by the state store.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Int(i64),
    Float(f64),
    Str(SmolStr),
}

impl StateValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Float view; integers widen, strings do not convert.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(value) => Some(*value as f64),
            Self::Str(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// JSON form used by snapshots and the persisted document.
    ///
    /// Non-finite floats have no JSON representation and yield `None`.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Int(value) => Some(serde_json::Value::Number((*value).into())),
            Self::Float(value) => {
                serde_json::Number::from_f64(*value).map(serde_json::Value::Number)
            }
            Self::Str(value) => Some(serde_json::Value::String(value.to_string())),
        }
    }

    /// Accepts the scalar JSON shapes a stored document may contain.
    ///
    /// Numbers written with a fraction or exponent stay floats, so `20.0`
    /// reloads as a float and `20` as an integer. Booleans map to 0/1.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Some(Self::Int(value))
                } else if number.is_u64() {
                    None
                } else {
                    number.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(text) => Some(Self::Str(SmolStr::new(text))),
            serde_json::Value::Bool(flag) => Some(Self::Int(i64::from(*flag))),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Str(SmolStr::new(value))
    }
}

impl From<SmolStr> for StateValue {
    fn from(value: SmolStr) -> Self {
        Self::Str(value)
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Str(SmolStr::new(value))
    }
}
