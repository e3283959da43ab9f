//! crates/mock_exam_core/src/storage_path.rs
//!
//! Storage reference columns started out holding a single object path and were
//! later widened to hold a JSON-encoded list. `OneOrMany` is the one place that
//! knows about both shapes.

use serde::{Deserialize, Serialize};

/// An ordered list of object-store paths read from a legacy-compatible column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OneOrMany(Vec<String>);

impl OneOrMany {
    pub fn new(paths: Vec<String>) -> Self {
        Self(paths)
    }

    /// Parses the stored column value.
    ///
    /// A JSON array keeps only its string entries; anything that is not a JSON
    /// array is taken as one legacy path. Empty or missing input yields no paths.
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Self::default(),
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(items)) => Self(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(path) => Some(path),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Self(vec![raw.to_string()]),
        }
    }

    /// The canonical column value: a JSON list, or `None` when empty.
    pub fn to_column(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            serde_json::to_string(&self.0).ok()
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}
