//! JSON Schema subset validation for tool inputs.
//!
//! Supports the subset tool schemas actually use: `object` with
//! `properties` and `required`, primitive type constraints, `enum`,
//! string `minLength`/`maxLength`, and arrays of primitives. Anything
//! the schema does not constrain is allowed.

use serde_json::Value;

/// Validate `input` against `schema`. Returns user-facing problem
/// descriptions; an empty list means the input is valid.
pub fn validate(schema: &Value, input: &Value) -> Vec<String> {
    let mut problems = Vec::new();
    validate_value(schema, input, "input", &mut problems);
    problems
}

fn validate_value(schema: &Value, value: &Value, path: &str, problems: &mut Vec<String>) {
    let Some(schema_obj) = schema.as_object() else {
        return; // non-object schema constrains nothing
    };

    if let Some(expected) = schema_obj.get("type").and_then(|t| t.as_str()) {
        if !type_matches(expected, value) {
            problems.push(format!(
                "{path}: expected {expected}, got {}",
                type_name(value)
            ));
            return; // further checks assume the right shape
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            problems.push(format!("{path}: must be one of [{}]", options.join(", ")));
        }
    }

    match value {
        Value::String(s) => {
            if let Some(min) = schema_obj.get("minLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) < min {
                    problems.push(format!("{path}: shorter than minLength {min}"));
                }
            }
            if let Some(max) = schema_obj.get("maxLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) > max {
                    problems.push(format!("{path}: longer than maxLength {max}"));
                }
            }
        }
        Value::Object(fields) => {
            if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
                for name in required.iter().filter_map(|n| n.as_str()) {
                    if !fields.contains_key(name) {
                        problems.push(format!("{path}: missing required property '{name}'"));
                    }
                }
            }
            if let Some(props) = schema_obj.get("properties").and_then(|p| p.as_object()) {
                for (name, prop_schema) in props {
                    if let Some(field_value) = fields.get(name) {
                        validate_value(prop_schema, field_value, &format!("{path}.{name}"), problems);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema_obj.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item_schema, item, &format!("{path}[{i}]"), problems);
                }
            }
        }
        _ => {}
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true, // unknown type names constrain nothing
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
