//! Structural JSON body matching.

use crate::request::NormalizedRequest;
use serde_json::Value;

/// Compiled body matcher: the request body must parse as JSON and equal the
/// expected value, or contain it when `partial` is set.
#[derive(Debug, Clone)]
pub struct CompiledBodyMatcher {
    expected: Value,
    partial: bool,
}

impl CompiledBodyMatcher {
    pub fn compile(expected: &Value, partial: bool) -> Self {
        Self {
            expected: expected.clone(),
            partial,
        }
    }

    pub fn matches(&self, request: &NormalizedRequest) -> bool {
        let Some(body) = request.body() else {
            return false;
        };
        match serde_json::from_slice::<Value>(body) {
            Ok(actual) if self.partial => json_contains(&actual, &self.expected),
            Ok(actual) => actual == self.expected,
            Err(_) => false,
        }
    }
}

/// Partial JSON comparison: objects may carry extra keys, arrays must contain
/// the expected elements in order.
fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(b)) => b.iter().all(|(key, expected_val)| {
            a.get(key)
                .is_some_and(|actual_val| json_contains(actual_val, expected_val))
        }),
        (Value::Array(a), Value::Array(b)) => {
            let mut remaining = a.iter();
            b.iter()
                .all(|expected_item| remaining.any(|item| json_contains(item, expected_item)))
        }
        _ => actual == expected,
    }
}
