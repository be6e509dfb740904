//! Name-based search over aggregation documents.
//!
//! Search-engine responses nest named sub-aggregations at arbitrary depth,
//! so metrics and bucket arrays are located by field name anywhere in the
//! tree rather than by a fixed path. Object field order is preserved
//! (`serde_json/preserve_order`), which makes "first match" well defined.

use serde_json::Value;

/// Collect every value stored under `name`, depth-first in document order.
///
/// A matched value is not searched further, so a metric nested inside a
/// metric of the same name is reported once, through its outer node.
pub fn find_values<'a>(node: &'a Value, name: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    collect_values(node, name, &mut found);
    found
}

fn collect_values<'a>(node: &'a Value, name: &str, found: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            for (field, child) in map {
                if field == name {
                    found.push(child);
                } else {
                    collect_values(child, name, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_values(item, name, found);
            }
        }
        _ => {}
    }
}

/// First value stored under `name`, searching depth-first in document order.
pub fn find_value<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => {
            for (field, child) in map {
                if field == name {
                    return Some(child);
                }
                if let Some(found) = find_value(child, name) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_value(item, name)),
        _ => None,
    }
}

/// Render a scalar as text the way bucket keys are printed.
///
/// Strings are returned verbatim, numbers in their canonical form. Other
/// node kinds have no textual form and yield `None`.
pub fn as_text(node: &Value) -> Option<String> {
    match node {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lenient numeric reading of a scalar.
///
/// Numeric strings are parsed, booleans count as 1/0, anything else is 0.
pub fn as_number(node: &Value) -> f64 {
    match node {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// Strict numeric reading, used where a missing number is an error.
pub fn to_number(node: &Value) -> Option<f64> {
    match node {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
