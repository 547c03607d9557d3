//! Plan-level summary

use crate::diagnostics::config::AnalyzerConfig;
use crate::diagnostics::metrics::{AnnotatedNode, NodeWarning};
use crate::explain::{NodeType, PlanNode, QueryPlan};
use serde::Serialize;

/// Time spent per operator type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStat {
    pub node_type: NodeType,
    /// Number of nodes of this type
    pub count: usize,
    /// Summed exclusive time (ms)
    pub exclusive_time: f64,
    /// Share of execution time, when it is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// Aggregate figures for a whole plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_time: Option<f64>,
    /// True when the plan carries EXPLAIN ANALYZE measurements
    pub analyzed: bool,
    pub node_count: usize,
    /// Planner cost of the root node
    pub total_cost: f64,
    /// Rows produced by the leaves, summed across union branches
    pub total_rows: u64,
    /// Rows examined by leaf scans
    pub rows_scanned: u64,
    /// 1.0 means every estimate matched the actual row count
    pub estimation_accuracy: f64,
    pub top_operations: Vec<OperationStat>,
    pub has_seq_scans: bool,
    pub has_estimation_errors: bool,
    pub bottleneck_count: usize,
}

impl PlanSummary {
    /// The operator type with the most exclusive time
    pub fn slowest_operation(&self) -> Option<&OperationStat> {
        self.top_operations.first()
    }
}

/// Builds the summary from a plan and its annotated tree
pub fn summarize(
    plan: &QueryPlan,
    annotated: &AnnotatedNode,
    config: &AnalyzerConfig,
) -> PlanSummary {
    let rows_scanned = annotated
        .iter()
        .filter(|n| n.is_leaf() && n.node.is_scan())
        .map(|n| n.metrics.rows_examined)
        .fold(0u64, u64::saturating_add);

    PlanSummary {
        execution_time: plan.execution_time,
        planning_time: plan.planning_time,
        analyzed: plan.is_analyzed(),
        node_count: plan.node_count(),
        total_cost: plan.root.total_cost,
        total_rows: leaf_rows(&plan.root),
        rows_scanned,
        estimation_accuracy: estimation_accuracy(annotated),
        top_operations: top_operations(annotated, plan.execution_time, config.top_operations_limit),
        has_seq_scans: plan.has_sequential_scans(),
        has_estimation_errors: annotated
            .iter()
            .any(|n| n.metrics.has_warning(NodeWarning::RowMisestimate)),
        bottleneck_count: annotated.iter().filter(|n| n.metrics.is_bottleneck).count(),
    }
}

/// Leaf output rows (actual when analyzed, planned otherwise). Branches of
/// an Append or set operation add up; any other operator keeps the largest
/// of its inputs.
fn leaf_rows(node: &PlanNode) -> u64 {
    if node.children.is_empty() {
        return match node.actual {
            Some(actual) => actual.total_rows(),
            None => node.plan_rows,
        };
    }

    let branches = node.children.iter().map(leaf_rows);
    match node.node_type {
        NodeType::Append | NodeType::MergeAppend | NodeType::RecursiveUnion | NodeType::SetOp => {
            branches.fold(0u64, u64::saturating_add)
        }
        _ => branches.max().unwrap_or(0),
    }
}

/// Mean of `(min(actual, planned) + 1) / (max(actual, planned) + 1)` over
/// executed nodes
fn estimation_accuracy(annotated: &AnnotatedNode) -> f64 {
    let scores: Vec<f64> = annotated
        .iter()
        .filter_map(|n| {
            let actual = n.node.actual.filter(|a| a.was_executed())?;
            let (a, p) = (actual.rows as f64, n.node.plan_rows as f64);
            Some((a.min(p) + 1.0) / (a.max(p) + 1.0))
        })
        .collect();

    if scores.is_empty() {
        1.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn top_operations(
    annotated: &AnnotatedNode,
    execution_time: Option<f64>,
    limit: usize,
) -> Vec<OperationStat> {
    let mut stats: Vec<OperationStat> = Vec::new();

    for node in annotated.iter() {
        let time = node.metrics.exclusive_time.unwrap_or(0.0);
        match stats.iter_mut().find(|s| s.node_type == node.node.node_type) {
            Some(stat) => {
                stat.count += 1;
                stat.exclusive_time += time;
            }
            None => stats.push(OperationStat {
                node_type: node.node.node_type.clone(),
                count: 1,
                exclusive_time: time,
                percentage: None,
            }),
        }
    }

    let execution_time = execution_time.filter(|ms| *ms > 0.0);
    for stat in &mut stats {
        stat.percentage =
            execution_time.map(|total| (stat.exclusive_time / total * 100.0).min(100.0));
    }

    // Stable sort keeps first pre-order appearance for full ties
    stats.sort_by(|a, b| {
        b.exclusive_time
            .total_cmp(&a.exclusive_time)
            .then_with(|| b.count.cmp(&a.count))
    });
    stats.truncate(limit);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::metrics::annotate;
    use crate::explain::PlanFormat;
    use pretty_assertions::assert_eq;

    fn summary_of(plan: &QueryPlan) -> PlanSummary {
        let config = AnalyzerConfig::default();
        let annotated = annotate(plan, &config).expect("annotate");
        summarize(plan, &annotated, &config)
    }

    fn join_plan() -> QueryPlan {
        let root = PlanNode::new(NodeType::HashJoin)
            .with_cost(10.0, 250.0)
            .with_rows(50)
            .with_actual(1.0, 12.0, 40, 1)
            .with_child(
                PlanNode::new(NodeType::SeqScan)
                    .with_relation("orders")
                    .with_rows(5_000)
                    .with_actual(0.0, 6.0, 5_000, 1),
            )
            .with_child(
                PlanNode::new(NodeType::Hash)
                    .with_rows(10)
                    .with_actual(2.0, 2.0, 10, 1)
                    .with_child(
                        PlanNode::new(NodeType::SeqScan)
                            .with_relation("customers")
                            .with_rows(10)
                            .with_actual(0.0, 1.5, 10, 1),
                    ),
            )
            .numbered();
        QueryPlan::new(root, PlanFormat::Json)
            .with_planning_time(0.2)
            .with_execution_time(12.0)
    }

    #[test]
    fn test_counts_and_rows() {
        let summary = summary_of(&join_plan());

        assert!(summary.analyzed);
        assert_eq!(summary.node_count, 4);
        assert_eq!(summary.total_cost, 250.0);
        // Larger of the two leaves: orders 5000, customers 10
        assert_eq!(summary.total_rows, 5_000);
        assert_eq!(summary.rows_scanned, 5_010);
        assert!(summary.has_seq_scans);
        assert!(!summary.has_estimation_errors);
        assert_eq!(summary.planning_time, Some(0.2));
    }

    #[test]
    fn test_top_operations_grouped_and_sorted() {
        let summary = summary_of(&join_plan());
        let ops: Vec<_> = summary
            .top_operations
            .iter()
            .map(|o| (o.node_type.clone(), o.count))
            .collect();

        // Seq Scan 7.5 ms, Hash Join 4.0 ms, Hash 0.5 ms
        assert_eq!(
            ops,
            vec![
                (NodeType::SeqScan, 2),
                (NodeType::HashJoin, 1),
                (NodeType::Hash, 1),
            ]
        );
        let seq = summary.slowest_operation().expect("top op");
        assert!((seq.exclusive_time - 7.5).abs() < 1e-9);
        assert!((seq.percentage.unwrap_or_default() - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_top_operations_limit_and_ties() {
        let root = PlanNode::new(NodeType::Append)
            .with_child(PlanNode::new(NodeType::SeqScan))
            .with_child(PlanNode::new(NodeType::IndexScan))
            .with_child(PlanNode::new(NodeType::IndexScan))
            .with_child(PlanNode::new(NodeType::Materialize))
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Text);
        let config = AnalyzerConfig {
            top_operations_limit: 2,
            ..Default::default()
        };
        let annotated = annotate(&plan, &config).expect("annotate");
        let summary = summarize(&plan, &annotated, &config);

        let types: Vec<_> = summary
            .top_operations
            .iter()
            .map(|o| o.node_type.clone())
            .collect();
        assert_eq!(types, vec![NodeType::IndexScan, NodeType::Append]);
        assert!(summary.top_operations.iter().all(|o| o.percentage.is_none()));
    }

    #[test]
    fn test_total_rows_sums_union_branches() {
        // Append over two partitions, the second joined to a lookup table
        let root = PlanNode::new(NodeType::Limit)
            .with_actual(0.0, 9.0, 100, 1)
            .with_child(
                PlanNode::new(NodeType::Append)
                    .with_actual(0.0, 8.0, 1_300, 1)
                    .with_child(seq("events_2023", 300, 1))
                    .with_child(
                        PlanNode::new(NodeType::NestedLoop)
                            .with_actual(0.0, 6.0, 1_000, 1)
                            .with_child(seq("events_2024", 1_000, 1))
                            .with_child(
                                PlanNode::new(NodeType::IndexScan)
                                    .with_relation("kinds")
                                    .with_rows(1)
                                    .with_actual(0.0, 0.002, 1, 1_000),
                            ),
                    )
                    .with_child(seq("events_2025", 40, 2)),
            )
            .numbered();
        let summary = summary_of(&QueryPlan::new(root, PlanFormat::Json));

        // 300 + max(1000, 1 x 1000) + 40 x 2
        assert_eq!(summary.total_rows, 1_380);
    }

    fn seq(relation: &str, rows: u64, loops: u64) -> PlanNode {
        PlanNode::new(NodeType::SeqScan)
            .with_relation(relation)
            .with_rows(rows)
            .with_actual(0.0, 1.0, rows, loops)
    }

    #[test]
    fn test_estimation_accuracy() {
        assert!(summary_of(&join_plan()).estimation_accuracy < 1.0);

        let exact = PlanNode::new(NodeType::SeqScan)
            .with_rows(99)
            .with_actual(0.0, 1.0, 99, 1);
        let summary = summary_of(&QueryPlan::new(exact, PlanFormat::Json));
        assert_eq!(summary.estimation_accuracy, 1.0);

        let off = PlanNode::new(NodeType::SeqScan)
            .with_rows(9)
            .with_actual(0.0, 1.0, 99, 1);
        let summary = summary_of(&QueryPlan::new(off, PlanFormat::Json));
        assert!((summary.estimation_accuracy - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_plain_explain_summary() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_relation("users")
            .with_cost(0.0, 35.5)
            .with_rows(2_550);
        let summary = summary_of(&QueryPlan::new(root, PlanFormat::Text));

        assert!(!summary.analyzed);
        assert_eq!(summary.total_rows, 2_550);
        assert_eq!(summary.rows_scanned, 2_550);
        assert_eq!(summary.estimation_accuracy, 1.0);
        assert_eq!(summary.execution_time, None);
        assert_eq!(summary.bottleneck_count, 0);
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let json = serde_json::to_value(summary_of(&join_plan())).expect("serialize");
        assert_eq!(json["nodeCount"], 4);
        assert_eq!(json["topOperations"][0]["nodeType"], "Seq Scan");
        assert_eq!(json["hasSeqScans"], true);
    }
}
