//! Argument validation against a tool's JSON schema.
//!
//! Covers the subset of JSON Schema that tool schemas actually use:
//! `required`, `type`, `enum`, `pattern`, `minimum`/`maximum` and
//! `minLength`/`maxLength`. Unknown properties are tolerated.

use regex::Regex;
use serde_json::Value;

/// Checks `args` against `schema`, collecting every problem found.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), Vec<String>> {
    let Some(args) = args.as_object() else {
        return Err(vec![format!(
            "Arguments must be a JSON object, got {}",
            type_name(args)
        )]);
    };

    let mut errors = Vec::new();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                errors.push(format!("Missing required parameter: {}", field));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (field, value) in args {
        let Some(field_schema) = properties.and_then(|p| p.get(field)) else {
            tracing::debug!(parameter = %field, "unknown tool parameter");
            continue;
        };
        check_field(field, field_schema, value, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_field(field: &str, schema: &Value, value: &Value, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !ok {
            errors.push(format!(
                "Parameter '{}' should be type '{}', got '{}'",
                field,
                display_type(expected),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            let listed: Vec<String> = options.iter().map(Value::to_string).collect();
            errors.push(format!(
                "Parameter '{}' must be one of [{}], got {}",
                field,
                listed.join(", "),
                value
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(format!("Parameter '{}' must be >= {}, got {}", field, min, value));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(format!("Parameter '{}' must be <= {}, got {}", field, max, value));
            }
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if len < min {
                errors.push(format!(
                    "Parameter '{}' must be at least {} characters",
                    field, min
                ));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                errors.push(format!(
                    "Parameter '{}' must be at most {} characters",
                    field, max
                ));
            }
        }
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => errors.push(format!(
                    "Parameter '{}' does not match required pattern: {}",
                    field, pattern
                )),
                Ok(_) => {}
                Err(e) => tracing::debug!(%pattern, error = %e, "ignoring invalid schema pattern"),
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_type(expected: &Value) -> String {
    match expected {
        Value::String(t) => t.clone(),
        other => other.to_string(),
    }
}
