//! Request payload inspection for known attack signatures.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

/// A named signature tested against request data.
#[derive(Debug)]
pub struct SuspiciousPattern {
    pub name: &'static str,
    regex: Regex,
}

impl SuspiciousPattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("detector pattern must compile"),
        }
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

/// Detectors in priority order.
static DETECTORS: Lazy<Vec<SuspiciousPattern>> = Lazy::new(|| {
    vec![
        SuspiciousPattern::new("directory_traversal", r"\.\."),
        SuspiciousPattern::new("script_injection", r"(?i)<script"),
        SuspiciousPattern::new("sql_union_select", r"(?i)union.*select"),
        SuspiciousPattern::new("code_execution", r"(?i)exec\("),
    ]
});

/// Scans the request blob and raw URL; reports the first detector that fires.
#[derive(Debug, Clone, Copy)]
pub struct SecurityInspector {
    detectors: &'static [SuspiciousPattern],
}

impl SecurityInspector {
    pub fn new() -> Self {
        Self {
            detectors: DETECTORS.as_slice(),
        }
    }

    pub fn detectors(&self) -> &'static [SuspiciousPattern] {
        self.detectors
    }

    pub fn inspect(&self, blob: &str, url: &str) -> Option<&'static SuspiciousPattern> {
        self.detectors
            .iter()
            .find(|detector| detector.is_match(blob) || detector.is_match(url))
    }

    /// Body, query and path parameters serialized as one JSON document.
    pub fn request_blob(
        body: Option<&Value>,
        query: &Map<String, Value>,
        params: &BTreeMap<String, String>,
    ) -> String {
        json!({
            "body": body.cloned().unwrap_or_else(|| Value::Object(Map::new())),
            "query": query,
            "params": params,
        })
        .to_string()
    }
}

impl Default for SecurityInspector {
    fn default() -> Self {
        Self::new()
    }
}
