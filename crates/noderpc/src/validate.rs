//! Parameter type validation for command handlers.
//!
//! Handlers call [`check_types`] or [`check_object_types`] before consuming
//! their arguments. Neither function checks arity: only values that are
//! actually present are compared against the expected kinds.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// JSON value kinds a parameter may be required to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool,
    /// JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueKind {
    /// Returns the kind of a JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Returns the canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a parameter that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamLocation {
    /// Positional parameter index.
    Index(usize),
    /// Keyed parameter name.
    Key(String),
}

/// Raised when a parameter does not have the expected kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TypeMismatch {
    /// Offending parameter.
    pub location: ParamLocation,
    /// Kind the handler expected.
    pub expected: ValueKind,
    /// Kind that was supplied.
    pub actual: ValueKind,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            ParamLocation::Index(_) => {
                write!(f, "Expected type {}, got {}", self.expected, self.actual)
            }
            ParamLocation::Key(key) => write!(
                f,
                "Expected type {} for {key}, got {}",
                self.expected, self.actual
            ),
        }
    }
}

/// Validates positional parameters against an ordered list of kinds.
///
/// Supplying fewer values than kinds is accepted. A null value passes when
/// `allow_null` is set.
///
/// # Errors
///
/// Returns [`TypeMismatch`] for the first present value whose kind differs.
pub fn check_types(
    values: &[Value],
    expected: &[ValueKind],
    allow_null: bool,
) -> Result<(), TypeMismatch> {
    for (index, (value, kind)) in values.iter().zip(expected).enumerate() {
        if !matches_kind(value, *kind, allow_null) {
            return Err(TypeMismatch {
                location: ParamLocation::Index(index),
                expected: *kind,
                actual: ValueKind::of(value),
            });
        }
    }
    Ok(())
}

/// Validates keyed parameters against the expected kind of each key.
///
/// Keys missing from the object and keys absent from `expected` are not
/// checked.
///
/// # Errors
///
/// Returns [`TypeMismatch`] for the first shared key whose value differs.
pub fn check_object_types(
    object: &Map<String, Value>,
    expected: &BTreeMap<String, ValueKind>,
    allow_null: bool,
) -> Result<(), TypeMismatch> {
    for (key, kind) in expected {
        let Some(value) = object.get(key) else {
            continue;
        };
        if !matches_kind(value, *kind, allow_null) {
            return Err(TypeMismatch {
                location: ParamLocation::Key(key.clone()),
                expected: *kind,
                actual: ValueKind::of(value),
            });
        }
    }
    Ok(())
}

fn matches_kind(value: &Value, kind: ValueKind, allow_null: bool) -> bool {
    ValueKind::of(value) == kind || (allow_null && value.is_null())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn expectations(pairs: &[(&str, ValueKind)]) -> BTreeMap<String, ValueKind> {
        pairs
            .iter()
            .map(|(key, kind)| ((*key).to_owned(), *kind))
            .collect()
    }

    #[test]
    fn fewer_values_than_kinds_is_accepted() {
        let result = check_types(&[json!(5)], &[ValueKind::Number, ValueKind::String], false);
        assert!(result.is_ok());
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let error = check_types(&[json!(true)], &[ValueKind::Number], false)
            .expect_err("bool is not a number");
        assert_eq!(error.location, ParamLocation::Index(0));
        assert_eq!(error.expected, ValueKind::Number);
        assert_eq!(error.actual, ValueKind::Bool);
    }

    #[test]
    fn reports_the_offending_position() {
        let error = check_types(
            &[json!("a"), json!(1), json!({})],
            &[ValueKind::String, ValueKind::Number, ValueKind::Array],
            false,
        )
        .expect_err("object is not an array");
        assert_eq!(error.location, ParamLocation::Index(2));
    }

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn null_acceptance_follows_flag(#[case] allow_null: bool, #[case] accepted: bool) {
        let result = check_types(&[Value::Null], &[ValueKind::String], allow_null);
        assert_eq!(result.is_ok(), accepted);
    }

    #[test]
    fn null_matches_expected_null_kind() {
        assert!(check_types(&[Value::Null], &[ValueKind::Null], false).is_ok());
    }

    #[test]
    fn extra_values_are_unchecked() {
        let result = check_types(&[json!(1), json!("extra")], &[ValueKind::Number], false);
        assert!(result.is_ok());
    }

    #[test]
    fn object_check_ignores_missing_and_extra_keys() {
        let params = object(json!({"amount": 1.5, "comment": "hi"}));
        let expected = expectations(&[
            ("amount", ValueKind::Number),
            ("address", ValueKind::String),
        ]);
        assert!(check_object_types(&params, &expected, false).is_ok());
    }

    #[test]
    fn object_check_reports_key() {
        let params = object(json!({"amount": "lots"}));
        let expected = expectations(&[("amount", ValueKind::Number)]);
        let error = check_object_types(&params, &expected, false).expect_err("string amount");
        assert_eq!(error.location, ParamLocation::Key("amount".to_owned()));
        assert_eq!(
            error.to_string(),
            "Expected type number for amount, got string"
        );
    }

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn object_null_acceptance_follows_flag(#[case] allow_null: bool, #[case] accepted: bool) {
        let params = object(json!({"label": null}));
        let expected = expectations(&[("label", ValueKind::String)]);
        assert_eq!(
            check_object_types(&params, &expected, allow_null).is_ok(),
            accepted
        );
    }
}
