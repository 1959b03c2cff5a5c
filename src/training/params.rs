//! Hyperparameters forwarded to regressor constructors

use crate::error::{TabregError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value as it appears in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl ParamValue {
    /// Values supplied as command-line overrides arrive as strings, so string
    /// forms of numbers and booleans are accepted too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(x) => Some(*x),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(x) if x.fract() == 0.0 => Some(*x as i64),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Str(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            ParamValue::Null => true,
            ParamValue::Str(s) => matches!(s.trim(), "null" | "None" | "~"),
            _ => false,
        }
    }
}

/// Named hyperparameters for one regressor
pub type ModelParams = BTreeMap<String, ParamValue>;

/// Typed accessors that turn a bad value into a configuration error naming
/// the parameter
pub struct ParamReader<'a> {
    model: &'a str,
    name: &'a str,
    value: &'a ParamValue,
}

impl<'a> ParamReader<'a> {
    pub fn new(model: &'a str, name: &'a str, value: &'a ParamValue) -> Self {
        Self { model, name, value }
    }

    fn fail(&self, expected: &str) -> TabregError {
        TabregError::invalid_param(self.model, self.name, format!("expected {}, got {}", expected, self.value))
    }

    pub fn f64(&self) -> Result<f64> {
        self.value.as_f64().ok_or_else(|| self.fail("a number"))
    }

    pub fn positive_f64(&self) -> Result<f64> {
        let v = self.f64()?;
        if v > 0.0 {
            Ok(v)
        } else {
            Err(self.fail("a positive number"))
        }
    }

    pub fn non_negative_f64(&self) -> Result<f64> {
        let v = self.f64()?;
        if v >= 0.0 {
            Ok(v)
        } else {
            Err(self.fail("a non-negative number"))
        }
    }

    pub fn usize(&self) -> Result<usize> {
        self.value.as_usize().ok_or_else(|| self.fail("a non-negative integer"))
    }

    pub fn i64(&self) -> Result<i64> {
        self.value.as_i64().ok_or_else(|| self.fail("an integer"))
    }

    pub fn bool(&self) -> Result<bool> {
        self.value.as_bool().ok_or_else(|| self.fail("a boolean"))
    }

    pub fn str(&self) -> Result<&'a str> {
        self.value.as_str().ok_or_else(|| self.fail("a string"))
    }

    pub fn optional_usize(&self) -> Result<Option<usize>> {
        if self.value.is_null() {
            Ok(None)
        } else {
            self.usize().map(Some)
        }
    }

    pub fn unknown(&self) -> TabregError {
        TabregError::invalid_param(self.model, self.name, "unknown parameter")
    }

    pub fn value(&self) -> &'a ParamValue {
        self.value
    }

    pub fn name(&self) -> &'a str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialize() {
        let params: ModelParams =
            serde_json::from_str(r#"{"alpha": 0.1, "n_estimators": 100, "kernel": "rbf", "max_depth": null, "bootstrap": false}"#)
                .unwrap();
        assert_eq!(params["alpha"], ParamValue::Float(0.1));
        assert_eq!(params["n_estimators"], ParamValue::Int(100));
        assert_eq!(params["kernel"], ParamValue::Str("rbf".to_string()));
        assert!(params["max_depth"].is_null());
        assert_eq!(params["bootstrap"], ParamValue::Bool(false));
    }

    #[test]
    fn test_string_overrides_parse() {
        assert_eq!(ParamValue::from("0.25").as_f64(), Some(0.25));
        assert_eq!(ParamValue::from("12").as_usize(), Some(12));
        assert_eq!(ParamValue::from("true").as_bool(), Some(true));
        assert!(ParamValue::from("null").is_null());
    }

    #[test]
    fn test_reader_reports_parameter_name() {
        let value = ParamValue::from("abc");
        let err = ParamReader::new("lasso", "alpha", &value).f64().unwrap_err();
        assert!(err.to_string().contains("'alpha'"));
        assert!(err.to_string().contains("lasso"));
    }
}
