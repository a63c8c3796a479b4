use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point scalar
    Float(f64),
    /// List of integers
    Ints(Vec<i64>),
    /// List of floats
    Floats(Vec<f64>),
}

impl Attribute {
    /// Human readable kind of the value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Attribute::Bool(_) => "bool",
            Attribute::Int(_) => "int",
            Attribute::Float(_) => "float",
            Attribute::Ints(_) => "int list",
            Attribute::Floats(_) => "float list",
        }
    }
}

impl From<bool> for Attribute {
    fn from(v: bool) -> Self {
        Attribute::Bool(v)
    }
}

impl From<i64> for Attribute {
    fn from(v: i64) -> Self {
        Attribute::Int(v)
    }
}

impl From<usize> for Attribute {
    fn from(v: usize) -> Self {
        Attribute::Int(v as i64)
    }
}

impl From<f32> for Attribute {
    fn from(v: f32) -> Self {
        Attribute::Float(v as f64)
    }
}

impl From<f64> for Attribute {
    fn from(v: f64) -> Self {
        Attribute::Float(v)
    }
}

impl<const N: usize> From<[usize; N]> for Attribute {
    fn from(v: [usize; N]) -> Self {
        Attribute::Ints(v.iter().map(|&x| x as i64).collect())
    }
}

impl From<Vec<i64>> for Attribute {
    fn from(v: Vec<i64>) -> Self {
        Attribute::Ints(v)
    }
}

impl From<Vec<f64>> for Attribute {
    fn from(v: Vec<f64>) -> Self {
        Attribute::Floats(v)
    }
}

/// Key-value configuration handed to a function when it is created.
///
/// Values are read once at creation time; missing or malformed keys surface as
/// [`ConfigError`] before any computation happens.
///
/// # Example
///
/// ```
/// use tessera_ops::FuncConfig;
///
/// let config = FuncConfig::new()
///     .set("strides", [1, 2])
///     .set("paddings", [0, 0])
///     .set("groups", 1usize);
///
/// assert_eq!(config.get_usize_pair("strides").unwrap(), [1, 2]);
/// assert_eq!(config.get_usize("groups").unwrap(), 1);
/// assert!(config.get_usize("missing").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncConfig {
    attrs: BTreeMap<String, Attribute>,
}

fn non_negative(key: &str, v: i64) -> Result<usize, ConfigError> {
    usize::try_from(v).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("{v} is negative"),
    })
}

impl FuncConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Attribute>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Returns the raw attribute stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.attrs.get(key)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    fn require(&self, key: &str) -> Result<&Attribute, ConfigError> {
        self.attrs
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Reads a non-negative integer.
    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigError> {
        match self.require(key)? {
            Attribute::Int(v) => non_negative(key, *v),
            other => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "int",
                actual: other.kind(),
            }),
        }
    }

    /// Reads an ordered pair of non-negative integers, e.g. `(height, width)`.
    pub fn get_usize_pair(&self, key: &str) -> Result<[usize; 2], ConfigError> {
        match self.require(key)? {
            Attribute::Ints(v) => match v.as_slice() {
                [a, b] => Ok([non_negative(key, *a)?, non_negative(key, *b)?]),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("expected 2 values, got {}", v.len()),
                }),
            },
            other => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "int list",
                actual: other.kind(),
            }),
        }
    }

    /// Reads a float, accepting integers, or returns `default` when absent.
    pub fn get_f32_or(&self, key: &str, default: f32) -> Result<f32, ConfigError> {
        match self.attrs.get(key) {
            None => Ok(default),
            Some(Attribute::Float(v)) => Ok(*v as f32),
            Some(Attribute::Int(v)) => Ok(*v as f32),
            Some(other) => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "float",
                actual: other.kind(),
            }),
        }
    }

    /// Reads a boolean flag, or returns `default` when absent.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.attrs.get(key) {
            None => Ok(default),
            Some(Attribute::Bool(v)) => Ok(*v),
            Some(other) => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "bool",
                actual: other.kind(),
            }),
        }
    }
}
