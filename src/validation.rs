//! Local validation of configuration values against a [`Schema`].
//!
//! Validation runs before any remote call so that malformed configuration is
//! reported as diagnostics without touching the API.
//!
//! ```
//! use greynoise_provider::schema::{Attribute, Schema};
//! use greynoise_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("sensor_id", Attribute::required_string())
//!     .with_attribute("ssh_port", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"sensor_id": "abc"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"ssh_port": "22"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

/// Validate a configuration object against a schema.
///
/// Required attributes must be present and non-null, present attributes must
/// match their declared type, and computed-only attributes are ignored. An
/// empty result means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            check_required(schema, &Map::new(), &mut diagnostics);
            return diagnostics;
        },
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", type_name(other))),
            );
            return diagnostics;
        },
    };

    check_required(schema, obj, &mut diagnostics);
    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        match obj.get(name) {
            None | Some(Value::Null) => {},
            Some(v) => check_type(&attr.attr_type, v, name, &mut diagnostics),
        }
    }

    diagnostics
}

/// Validate, returning the diagnostics as an error if there are any.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether a value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn check_required(schema: &Schema, obj: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    let missing = schema
        .attributes
        .iter()
        .filter(|(_, attr): &(&String, &Attribute)| attr.flags.required)
        .filter(|(name, _)| matches!(obj.get(name.as_str()), None | Some(Value::Null)));

    for (name, _) in missing {
        diagnostics.push(
            Diagnostic::error(format!("Missing required attribute '{}'", name))
                .with_detail("This attribute is required and must be provided")
                .with_attribute(name.as_str()),
        );
    }
}

fn check_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String if !value.is_string() => {
            diagnostics.push(type_error(path, "string", value));
        },
        AttributeType::Int64 if !is_int64(value) => {
            diagnostics.push(type_error(path, "int64", value));
        },
        AttributeType::Bool if !value.is_boolean() => {
            diagnostics.push(type_error(path, "bool", value));
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_type(element_type, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(entries) => {
                for (key, entry) in entries {
                    check_type(value_type, entry, &format!("{}.{}", path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(obj) => check_object(fields, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
        _ => {},
    }
}

fn check_object(
    fields: &BTreeMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, field_type) in fields {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            check_type(field_type, value, &format!("{}.{}", path, name), diagnostics);
        }
    }
}

/// Integers in i64 range only; whole-number floats such as `10.0` do not count.
fn is_int64(value: &Value) -> bool {
    value.as_i64().is_some()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(got)))
        .with_attribute(path)
}
