//! Optimization recommendations produced by the rules

use crate::explain::NodeId;
use crate::localized::LocalizedText;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for recommendations
///
/// Ordering puts the most severe level first, so sorting ascending lists
/// critical findings before warnings before info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Critical issue that should be addressed immediately
    Critical,
    /// Warning that may impact performance
    Warning,
    /// Informational suggestion for optimization
    Info,
}

impl Severity {
    /// Returns true if this is a critical issue
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }

    /// Returns true if this is at least a warning
    pub fn is_warning_or_above(&self) -> bool {
        matches!(self, Self::Critical | Self::Warning)
    }

    /// Returns the severity level as a display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the rule that produced a recommendation
///
/// Variants are declared in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    SeqScanLargeTable,
    RowMisestimate,
    SortSpilledToDisk,
    NestedLoopRescans,
    HashSpilledToDisk,
    InefficientFilter,
    BottleneckOperator,
    MultipleSeqScans,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeqScanLargeTable => "seq_scan_large_table",
            Self::RowMisestimate => "row_misestimate",
            Self::SortSpilledToDisk => "sort_spilled_to_disk",
            Self::NestedLoopRescans => "nested_loop_rescans",
            Self::HashSpilledToDisk => "hash_spilled_to_disk",
            Self::InefficientFilter => "inefficient_filter",
            Self::BottleneckOperator => "bottleneck_operator",
            Self::MultipleSeqScans => "multiple_seq_scans",
        }
    }

    /// Returns a human-readable description of this rule
    pub fn description(&self) -> &'static str {
        match self {
            Self::SeqScanLargeTable => "Sequential scan on large table",
            Self::RowMisestimate => "Row estimate far from actual rows",
            Self::SortSpilledToDisk => "Sort spilled to disk",
            Self::NestedLoopRescans => "Nested loop rescans its inner side many times",
            Self::HashSpilledToDisk => "Hash table split into batches on disk",
            Self::InefficientFilter => "Filter removing most rows",
            Self::BottleneckOperator => "Operator dominating execution time",
            Self::MultipleSeqScans => "Multiple sequential scans detected",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single optimization recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Stable identifier: `<rule>` or `<rule>:<node id>`
    pub id: String,
    pub rule: RuleId,
    pub severity: Severity,
    pub title: LocalizedText,
    /// What was observed
    pub issue: LocalizedText,
    /// Why it matters
    pub explanation: LocalizedText,
    /// What to do about it
    pub suggestion: LocalizedText,
    /// Plan node that triggered the finding; `None` for plan-level findings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Ready-to-run SQL implementing the suggestion, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl Recommendation {
    /// Creates a recommendation; the id is derived from rule and node
    pub fn new(
        rule: RuleId,
        severity: Severity,
        node_id: Option<NodeId>,
        title: LocalizedText,
        issue: LocalizedText,
        explanation: LocalizedText,
        suggestion: LocalizedText,
    ) -> Self {
        let id = match node_id {
            Some(node) => format!("{}:{}", rule, node),
            None => rule.to_string(),
        };
        Self {
            id,
            rule,
            severity,
            title,
            issue,
            explanation,
            suggestion,
            node_id,
            sql: None,
        }
    }

    /// Attaches ready-to-run SQL
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Key used to order recommendations: severity, then node (plan-level
    /// last), then rule order
    pub(crate) fn sort_key(&self) -> (Severity, bool, NodeId, RuleId) {
        (
            self.severity,
            self.node_id.is_none(),
            self.node_id.unwrap_or(0),
            self.rule,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> LocalizedText {
        LocalizedText::new(s, s)
    }

    #[test]
    fn test_severity_order() {
        let mut levels = vec![Severity::Info, Severity::Critical, Severity::Warning];
        levels.sort();
        assert_eq!(
            levels,
            vec![Severity::Critical, Severity::Warning, Severity::Info]
        );
        assert!(Severity::Critical.is_critical());
        assert!(Severity::Warning.is_warning_or_above());
        assert!(!Severity::Info.is_warning_or_above());
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_string(&Severity::Critical).expect("serialize");
        assert_eq!(json, "\"critical\"");
        let parsed: Severity = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, Severity::Critical);
    }

    #[test]
    fn test_rule_id_strings_match_serde() {
        for rule in [
            RuleId::SeqScanLargeTable,
            RuleId::RowMisestimate,
            RuleId::SortSpilledToDisk,
            RuleId::NestedLoopRescans,
            RuleId::HashSpilledToDisk,
            RuleId::InefficientFilter,
            RuleId::BottleneckOperator,
            RuleId::MultipleSeqScans,
        ] {
            let json = serde_json::to_value(rule).expect("serialize");
            assert_eq!(json, serde_json::Value::String(rule.as_str().to_string()));
        }
    }

    #[test]
    fn test_ids() {
        let node = Recommendation::new(
            RuleId::RowMisestimate,
            Severity::Warning,
            Some(3),
            text("t"),
            text("i"),
            text("e"),
            text("s"),
        );
        assert_eq!(node.id, "row_misestimate:3");

        let plan_level = Recommendation::new(
            RuleId::MultipleSeqScans,
            Severity::Info,
            None,
            text("t"),
            text("i"),
            text("e"),
            text("s"),
        )
        .with_sql("ANALYZE;");
        assert_eq!(plan_level.id, "multiple_seq_scans");
        assert_eq!(plan_level.sql.as_deref(), Some("ANALYZE;"));

        assert!(node.sort_key() < plan_level.sort_key());
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let rec = Recommendation::new(
            RuleId::SeqScanLargeTable,
            Severity::Critical,
            Some(0),
            text("t"),
            text("i"),
            text("e"),
            text("s"),
        );
        let json = serde_json::to_value(&rec).expect("serialize");
        assert_eq!(json["nodeId"], 0);
        assert_eq!(json["rule"], "seq_scan_large_table");
        assert_eq!(json["severity"], "critical");
        assert!(json.get("sql").is_none());
    }
}
