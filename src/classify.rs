//! Tool domain classification.
//!
//! The domain table itself lives outside this crate; the registry only
//! depends on the [`ToolClassifier`] seam. [`StaticClassifier`] is a small
//! table-backed implementation for wiring and tests.

use std::collections::HashSet;

/// Where a tool is able to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolDomain {
    /// Only on the Worker's machine (filesystem, shell, browser).
    Local,
    /// Only in the orchestrating process.
    Cloud,
    /// Either place, depending on connectivity.
    Hybrid,
}

/// Maps a tool name to its domain.
pub trait ToolClassifier: Send + Sync {
    fn classify(&self, tool: &str) -> ToolDomain;
}

/// Table-backed classifier. Tools absent from both tables are cloud tools.
#[derive(Debug, Default)]
pub struct StaticClassifier {
    local: HashSet<String>,
    hybrid: HashSet<String>,
}

impl StaticClassifier {
    pub fn new(
        local: impl IntoIterator<Item = String>,
        hybrid: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            local: local.into_iter().collect(),
            hybrid: hybrid.into_iter().collect(),
        }
    }
}

impl ToolClassifier for StaticClassifier {
    fn classify(&self, tool: &str) -> ToolDomain {
        if self.local.contains(tool) {
            ToolDomain::Local
        } else if self.hybrid.contains(tool) {
            ToolDomain::Hybrid
        } else {
            ToolDomain::Cloud
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_table_with_cloud_default() {
        let classifier = StaticClassifier::new(
            ["exec".to_string(), "screenshot".to_string()],
            ["fetch".to_string()],
        );
        assert_eq!(classifier.classify("exec"), ToolDomain::Local);
        assert_eq!(classifier.classify("screenshot"), ToolDomain::Local);
        assert_eq!(classifier.classify("fetch"), ToolDomain::Hybrid);
        assert_eq!(classifier.classify("search"), ToolDomain::Cloud);
    }
}
