//! Request envelope parsing.
//!
//! This module turns an arbitrary JSON value into a [`JsonRequest`]: the
//! correlation id echoed back to the caller, a non-empty method name, and the
//! parameters in either positional or keyed form. Malformed envelopes fail
//! before any handler runs.

use serde_json::{Map, Value};
use tracing::debug;

use super::errors::DispatchError;
use crate::server::DISPATCH_TARGET;

/// Parameters supplied with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Ordered positional arguments.
    Positional(Vec<Value>),
    /// Keyed arguments.
    Named(Map<String, Value>),
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Params {
    /// Returns the positional arguments, or an empty slice for keyed params.
    pub fn positional(&self) -> &[Value] {
        match self {
            Self::Positional(values) => values,
            Self::Named(_) => &[],
        }
    }

    /// Returns the keyed arguments when the request used named parameters.
    pub fn named(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Positional(_) => None,
            Self::Named(map) => Some(map),
        }
    }

    /// Returns the positional argument at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional().get(index)
    }

    /// Number of supplied arguments.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(map) => map.len(),
        }
    }

    /// Returns true when no arguments were supplied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the parameters back into a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Positional(values) => Value::Array(values.clone()),
            Self::Named(map) => Value::Object(map.clone()),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

/// Parsed JSON-RPC request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    /// Correlation id echoed back verbatim; null when absent.
    pub id: Value,
    /// Name of the method to invoke.
    pub method: String,
    /// Supplied parameters.
    pub params: Params,
}

impl JsonRequest {
    /// Parses a JSON value into a request envelope.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Parse` if the value is not an object, the
    /// method is missing, not a string or empty, or the params are neither an
    /// array nor an object.
    pub fn parse(value: &Value) -> Result<Self, DispatchError> {
        let Value::Object(object) = value else {
            return Err(DispatchError::parse("Invalid Request object"));
        };

        let id = object.get("id").cloned().unwrap_or(Value::Null);

        let method = match object.get("method") {
            None => return Err(DispatchError::parse("Missing method")),
            Some(Value::String(method)) => method.as_str(),
            Some(_) => return Err(DispatchError::parse("Method must be a string")),
        };
        if method.is_empty() {
            return Err(DispatchError::parse("Method must not be empty"));
        }

        debug!(
            target: DISPATCH_TARGET,
            method = %sanitize(method),
            "parsed request"
        );

        let params = match object.get("params") {
            None | Some(Value::Null) => Params::default(),
            Some(Value::Array(values)) => Params::Positional(values.clone()),
            Some(Value::Object(map)) => Params::Named(map.clone()),
            Some(_) => return Err(DispatchError::parse("Params must be an array or object")),
        };

        Ok(Self {
            id,
            method: method.to_owned(),
            params,
        })
    }
}

/// Recovers the correlation id of a request that failed to parse.
///
/// Returns the `id` member when the value is an object, otherwise null.
pub fn request_id(value: &Value) -> Value {
    value
        .as_object()
        .and_then(|object| object.get("id"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Strips characters that have no business in log lines.
fn sanitize(method: &str) -> String {
    method
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || " .,;-_/:?@()".contains(*ch))
        .collect()
}
