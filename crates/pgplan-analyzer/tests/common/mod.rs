//! Shared helpers for the integration tests

use pgplan_analyzer::explain::{NodeId, NodeType, QueryPlan};
use std::path::PathBuf;

/// Reads a file from `tests/fixtures`
pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
}

/// Every fixture, with the plans that come out of it
pub const ALL_FIXTURES: &[&str] = &[
    "users_seq_scan.txt",
    "orders_report.txt",
    "hash_join.json",
    "nested_loop.json",
    "parallel_count.txt",
];

/// Node types and depths in pre-order, which pins down the tree shape
pub fn shape(plan: &QueryPlan) -> Vec<(NodeType, usize)> {
    fn walk(node: &pgplan_analyzer::PlanNode, depth: usize, out: &mut Vec<(NodeType, usize)>) {
        out.push((node.node_type.clone(), depth));
        for child in &node.children {
            walk(child, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(&plan.root, 0, &mut out);
    out
}

pub fn ids(plan: &QueryPlan) -> Vec<NodeId> {
    plan.iter_nodes().map(|n| n.id).collect()
}
