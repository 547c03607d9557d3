//! Plan Diagnostics Module
//!
//! This module turns a parsed [`QueryPlan`] into a diagnosis:
//! - per-node metrics (exclusive time, share of execution time, estimate ratio)
//! - a plan-level [`PlanSummary`]
//! - ranked, bilingual [`Recommendation`]s produced by the [`rules`]
//!
//! The plan is only borrowed, so the same plan can be diagnosed repeatedly
//! with different configs.

pub mod config;
pub mod metrics;
pub mod recommendation;
pub mod rules;
pub mod sql;
pub mod summary;

pub use config::{AnalyzerConfig, ConfigError};
pub use metrics::{AnnotatedNode, NodeMetrics, NodeWarning, annotate};
pub use recommendation::{Recommendation, RuleId, Severity};
pub use rules::{Rule, RuleContext, default_rules, evaluate_rules};
pub use summary::{OperationStat, PlanSummary, summarize};

use crate::error::{AnalyzerError, Result};
use crate::explain::QueryPlan;

/// Everything the engine derives from one plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDiagnosis {
    pub annotated: AnnotatedNode,
    pub summary: PlanSummary,
    pub recommendations: Vec<Recommendation>,
}

impl PlanDiagnosis {
    pub fn has_critical_issues(&self) -> bool {
        self.recommendations
            .iter()
            .any(|r| r.severity.is_critical())
    }

    pub fn has_warnings(&self) -> bool {
        self.recommendations
            .iter()
            .any(|r| r.severity.is_warning_or_above())
    }

    /// Recommendations attached to one node
    pub fn recommendations_for(&self, node_id: usize) -> impl Iterator<Item = &Recommendation> {
        self.recommendations
            .iter()
            .filter(move |r| r.node_id == Some(node_id))
    }
}

/// Runs metrics, summary and the default rules over a plan
#[tracing::instrument(skip_all, fields(nodes = plan.node_count()))]
pub fn diagnose(plan: &QueryPlan, config: &AnalyzerConfig) -> Result<PlanDiagnosis> {
    check_node_ids(plan)?;

    let annotated = annotate(plan, config)?;
    let summary = summarize(plan, &annotated, config);
    let recommendations = {
        let ctx = RuleContext::new(&annotated, &summary, config);
        evaluate_rules(&default_rules(), &ctx)?
    };

    tracing::debug!(
        recommendations = recommendations.len(),
        bottlenecks = summary.bottleneck_count,
        "plan diagnosed"
    );

    Ok(PlanDiagnosis {
        annotated,
        summary,
        recommendations,
    })
}

/// Node ids must be strictly increasing in pre-order
fn check_node_ids(plan: &QueryPlan) -> Result<()> {
    let mut previous = None;
    for node in plan.iter_nodes() {
        if previous.is_some_and(|prev| node.id <= prev) {
            return Err(AnalyzerError::Internal(format!(
                "node id {} does not follow {} in pre-order",
                node.id,
                previous.unwrap_or_default()
            )));
        }
        previous = Some(node.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::{NodeType, PlanFormat, PlanNode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diagnose_scenario() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_relation("users")
            .with_cost(0.0, 35.5)
            .with_rows(1000)
            .with_actual(0.010, 2.345, 1000, 1);
        let plan = QueryPlan::new(root, PlanFormat::Text).with_execution_time(2.5);

        let diagnosis = diagnose(&plan, &AnalyzerConfig::default()).expect("diagnose");

        assert!(diagnosis.has_critical_issues());
        assert_eq!(diagnosis.recommendations[0].rule, RuleId::SeqScanLargeTable);
        assert_eq!(diagnosis.recommendations_for(0).count(), 2);
        assert_eq!(diagnosis.summary.bottleneck_count, 1);
    }

    #[test]
    fn test_unnumbered_tree_is_internal_error() {
        let root = PlanNode::new(NodeType::Append)
            .with_child(PlanNode::new(NodeType::SeqScan))
            .with_child(PlanNode::new(NodeType::SeqScan));
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let err = diagnose(&plan, &AnalyzerConfig::default()).expect_err("ids all zero");
        assert!(matches!(err, AnalyzerError::Internal(_)));
    }

    #[test]
    fn test_plan_is_only_borrowed() {
        let root = PlanNode::new(NodeType::SeqScan).with_rows(10);
        let plan = QueryPlan::new(root, PlanFormat::Text);
        let before = plan.clone();

        let strict = AnalyzerConfig::default().with_large_table_rows(5);
        let first = diagnose(&plan, &strict).expect("diagnose");
        let second = diagnose(&plan, &AnalyzerConfig::default()).expect("diagnose");

        assert_eq!(plan, before);
        assert_eq!(first.recommendations.len(), 1);
        assert!(second.recommendations.is_empty());
    }
}
