//! Raw quote payloads
use serde_json::{Map, Value};
use std::fmt;

/// Field mapping returned by one fetch of one ticker from one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    fields: Map<String, Value>,
}

impl Quote {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a quote from a JSON value; anything but an object yields `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Get a present, non-null field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Numeric view of a field: numbers, booleans and numeric strings
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.field(name)? {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Label view of a field. Strings are used verbatim, other values as JSON text.
    pub fn label_value(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self.fields).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<Map<String, Value>> for Quote {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}
