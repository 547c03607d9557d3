//! Derived per-node metrics
//!
//! Times reported by EXPLAIN ANALYZE are per-loop averages that include the
//! node's children. Metrics here are loop-scaled: a node's inclusive time is
//! `actual total time x loops`, and its exclusive time is what remains after
//! subtracting the inclusive time of every child.
//!
//! Below a `Gather` / `Gather Merge` the loops of each participant run
//! concurrently, so loops are divided by the number of participants first.
//! Only the rescans a single participant performs add wall-clock time.

use crate::diagnostics::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};
use crate::explain::{NodeType, PlanNode, PreOrder, QueryPlan, TreeNode};
use serde::Serialize;

/// Condition flagged on a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeWarning {
    LargeSeqScan,
    RowMisestimate,
    Bottleneck,
    SortSpilledToDisk,
    HashSpilledToDisk,
    ManyLoops,
    FilterDiscardsMostRows,
    NeverExecuted,
}

impl NodeWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LargeSeqScan => "large_seq_scan",
            Self::RowMisestimate => "row_misestimate",
            Self::Bottleneck => "bottleneck",
            Self::SortSpilledToDisk => "sort_spilled_to_disk",
            Self::HashSpilledToDisk => "hash_spilled_to_disk",
            Self::ManyLoops => "many_loops",
            Self::FilterDiscardsMostRows => "filter_discards_most_rows",
            Self::NeverExecuted => "never_executed",
        }
    }
}

/// Values derived for one node
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    /// Total time across all loops including children (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusive_time: Option<f64>,
    /// Time spent in this node alone (ms), never negative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_time: Option<f64>,
    /// Exclusive time as a share of execution time, capped at 100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_percentage: Option<f64>,
    /// Actual rows / planned rows, both per loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_estimate_ratio: Option<f64>,
    /// Rows the node read before filtering, across all loops
    pub rows_examined: u64,
    pub is_bottleneck: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<NodeWarning>,
}

impl NodeMetrics {
    pub fn has_warning(&self, warning: NodeWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

/// A plan node together with its derived metrics
///
/// `node.children` is always empty; the annotated children live in
/// `children` so the serialized form is a single nested tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedNode {
    #[serde(flatten)]
    pub node: PlanNode,
    #[serde(flatten)]
    pub metrics: NodeMetrics,
    pub children: Vec<AnnotatedNode>,
}

impl TreeNode for AnnotatedNode {
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

impl AnnotatedNode {
    /// Returns an iterator over this subtree (pre-order)
    pub fn iter(&self) -> PreOrder<'_, AnnotatedNode> {
        PreOrder::new(self)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

struct MetricsContext<'a> {
    config: &'a AnalyzerConfig,
    execution_time: Option<f64>,
}

/// Computes metrics for every node of the plan in one post-order pass
pub fn annotate(plan: &QueryPlan, config: &AnalyzerConfig) -> Result<AnnotatedNode> {
    let ctx = MetricsContext {
        config,
        execution_time: plan.execution_time.filter(|ms| *ms > 0.0),
    };
    let root = annotate_node(&plan.root, &ctx, 1);

    if let Some(bad) = root.iter().find(|n| !metrics_are_finite(&n.metrics)) {
        return Err(AnalyzerError::Internal(format!(
            "non-finite metric computed for node {}",
            bad.node.id
        )));
    }
    Ok(root)
}

/// `participants` is the number of processes running this node concurrently
fn annotate_node(node: &PlanNode, ctx: &MetricsContext<'_>, participants: u64) -> AnnotatedNode {
    let child_participants = match node.node_type {
        NodeType::Gather | NodeType::GatherMerge => gather_participants(node),
        _ => participants,
    };
    let children: Vec<AnnotatedNode> = node
        .children
        .iter()
        .map(|child| annotate_node(child, ctx, child_participants))
        .collect();

    let inclusive_time = match node.actual {
        Some(actual) if !actual.was_executed() => Some(0.0),
        Some(actual) if participants <= 1 => actual.inclusive_time(),
        Some(actual) => {
            let sequential_loops = (actual.loops as f64 / participants.max(1) as f64).max(1.0);
            actual.total_time.map(|t| t * sequential_loops)
        }
        None => None,
    };
    let children_time: f64 = children
        .iter()
        .filter_map(|c| c.metrics.inclusive_time)
        .sum();
    let exclusive_time = inclusive_time.map(|t| (t - children_time).max(0.0));
    let time_percentage = match (exclusive_time, ctx.execution_time) {
        (Some(exclusive), Some(total)) => Some((exclusive / total * 100.0).min(100.0)),
        _ => None,
    };

    let rows_estimate_ratio = node
        .actual
        .filter(|a| a.was_executed())
        .map(|a| a.rows as f64 / node.plan_rows.max(1) as f64);

    let mut metrics = NodeMetrics {
        inclusive_time,
        exclusive_time,
        time_percentage,
        rows_estimate_ratio,
        rows_examined: rows_examined(node),
        is_bottleneck: false,
        warnings: Vec::new(),
    };

    metrics.is_bottleneck = time_percentage.is_some_and(|pct| pct > ctx.config.bottleneck_pct)
        && !is_passthrough(inclusive_time, &children, ctx.config.passthrough_share);
    metrics.warnings = collect_warnings(node, &metrics, ctx.config);

    let mut bare = node.clone();
    bare.children = Vec::new();
    AnnotatedNode {
        node: bare,
        metrics,
        children,
    }
}

/// Leader plus launched workers, as seen in the loops of the gathered child
fn gather_participants(gather: &PlanNode) -> u64 {
    let from_child = gather
        .children
        .first()
        .and_then(|child| child.actual)
        .map(|actual| actual.loops)
        .filter(|loops| *loops > 0);
    let from_workers = gather
        .extra
        .get("Workers Launched")
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
        .map(|workers| workers.saturating_add(1));
    from_child.or(from_workers).unwrap_or(1).max(1)
}

/// Rows read by the node before its filter, across all loops
///
/// Without ANALYZE the planner's row estimate is the best available figure.
fn rows_examined(node: &PlanNode) -> u64 {
    match node.actual {
        Some(actual) => {
            let removed = node.rows_removed_by_filter.unwrap_or(0)
                + node
                    .scan_details()
                    .and_then(|s| s.rows_removed_by_index_recheck)
                    .unwrap_or(0);
            actual
                .rows
                .saturating_add(removed)
                .saturating_mul(actual.loops)
        }
        None => node.plan_rows,
    }
}

/// A node with exactly one child that accounts for almost all of its time
fn is_passthrough(inclusive: Option<f64>, children: &[AnnotatedNode], share: f64) -> bool {
    let [only_child] = children else {
        return false;
    };
    match (inclusive, only_child.metrics.inclusive_time) {
        (Some(total), Some(child)) if total > 0.0 => child >= share * total,
        _ => false,
    }
}

fn collect_warnings(
    node: &PlanNode,
    metrics: &NodeMetrics,
    config: &AnalyzerConfig,
) -> Vec<NodeWarning> {
    let mut warnings = Vec::new();

    if node.node_type == NodeType::SeqScan
        && metrics.rows_examined >= config.large_table_rows
        && metrics
            .time_percentage
            .is_none_or(|pct| pct >= config.seq_scan_min_pct)
    {
        warnings.push(NodeWarning::LargeSeqScan);
    }

    if let (Some(ratio), Some(actual)) = (metrics.rows_estimate_ratio, node.actual)
        && (ratio > config.misestimate_over || ratio < config.misestimate_under)
        && actual.rows.max(node.plan_rows) >= config.misestimate_min_rows
    {
        warnings.push(NodeWarning::RowMisestimate);
    }

    if metrics.is_bottleneck {
        warnings.push(NodeWarning::Bottleneck);
    }

    if node.sort_details().is_some_and(|s| s.spilled_to_disk()) {
        warnings.push(NodeWarning::SortSpilledToDisk);
    }

    if node.hash_details().is_some_and(|h| h.spilled_to_disk()) {
        warnings.push(NodeWarning::HashSpilledToDisk);
    }

    if let Some(actual) = node.actual {
        if actual.loops >= config.nested_loop_loops {
            warnings.push(NodeWarning::ManyLoops);
        }

        if let Some(removed) = node.rows_removed_by_filter {
            let removed_total = removed.saturating_mul(actual.loops);
            let examined_total = actual
                .rows
                .saturating_add(removed)
                .saturating_mul(actual.loops);
            if examined_total > 0
                && removed_total >= config.filter_min_removed
                && removed_total as f64 / examined_total as f64 >= config.filter_discard_ratio
            {
                warnings.push(NodeWarning::FilterDiscardsMostRows);
            }
        }

        if !actual.was_executed() {
            warnings.push(NodeWarning::NeverExecuted);
        }
    }

    warnings
}

fn metrics_are_finite(metrics: &NodeMetrics) -> bool {
    [
        metrics.inclusive_time,
        metrics.exclusive_time,
        metrics.time_percentage,
        metrics.rows_estimate_ratio,
    ]
    .into_iter()
    .flatten()
    .all(f64::is_finite)
}

#[cfg(test)]
mod tests;
