//! Subset matchers for headers and query parameters.
//!
//! Every expected key must be present with an equal value; extra keys on the
//! request are allowed. Header names compare case-insensitively, query
//! parameters compare after percent-decoding and in any order.

use crate::request::NormalizedRequest;
use std::collections::HashMap;

/// Compiled header subset matcher (names lowercased at compile time).
#[derive(Debug, Clone)]
pub struct CompiledHeaderMatcher {
    expected: HashMap<String, String>,
}

impl CompiledHeaderMatcher {
    pub fn compile(expected: &HashMap<String, String>) -> Self {
        Self {
            expected: expected
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        }
    }

    pub fn matches(&self, request: &NormalizedRequest) -> bool {
        self.expected.iter().all(|(name, expected_value)| {
            let values: Vec<&str> = request
                .headers()
                .get_all(name.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if values.is_empty() {
                return false;
            }
            // Repeated headers compare as their comma-joined form.
            values.join(", ") == *expected_value
        })
    }
}

/// Compiled query subset matcher.
#[derive(Debug, Clone)]
pub struct CompiledQueryMatcher {
    expected: HashMap<String, String>,
}

impl CompiledQueryMatcher {
    pub fn compile(expected: &HashMap<String, String>) -> Self {
        Self {
            expected: expected.clone(),
        }
    }

    pub fn matches(&self, request: &NormalizedRequest) -> bool {
        let actual = request.query();
        self.expected
            .iter()
            .all(|(name, expected_value)| actual.get(name) == Some(expected_value))
    }
}
