//! PostgreSQL EXPLAIN Parser Module
//!
//! This module turns EXPLAIN output into a [`QueryPlan`]:
//! - JSON format (`EXPLAIN (FORMAT JSON)`)
//! - Text format (default `EXPLAIN` / `EXPLAIN ANALYZE`)
//!
//! # Example
//!
//! ```
//! use pgplan_analyzer::explain::{parse_explain, FormatHint, NodeType, PlanFormat};
//!
//! let pg_json = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users"}}]"#;
//! let plan = parse_explain(pg_json, FormatHint::Auto).unwrap();
//! assert_eq!(plan.root.node_type, NodeType::SeqScan);
//! assert_eq!(plan.format, PlanFormat::Json);
//!
//! let pg_text = "Seq Scan on users  (cost=0.00..15.00 rows=500 width=4)";
//! let plan = parse_explain(pg_text, FormatHint::Auto).unwrap();
//! assert_eq!(plan.root.relation_name.as_deref(), Some("users"));
//! ```

pub mod detect;
pub mod json;
pub mod plan;
pub mod render;
pub mod text;

pub use detect::{FormatHint, detect_format};
pub use json::parse_json_explain;
pub use plan::{
    ActualStats, AggregateDetails, BufferStats, HashDetails, JoinDetails, JoinType, NodeDetails,
    NodeId, NodeType, PlanFormat, PlanNode, PreOrder, QueryPlan, ScanDetails, SortDetails,
    SortSpaceType, TreeNode,
};
pub use render::render_explain_json;
pub use text::parse_text_explain;

use crate::error::Result;

/// Parses EXPLAIN output using the grammar chosen by [`detect_format`]
pub fn parse_explain(input: &str, hint: FormatHint) -> Result<QueryPlan> {
    match detect_format(input, hint) {
        PlanFormat::Json => parse_json_explain(input),
        PlanFormat::Text => parse_text_explain(input),
    }
}

/// Parses PostgreSQL EXPLAIN output, detecting JSON or text automatically
pub fn parse_postgres_explain(input: &str) -> Result<QueryPlan> {
    parse_explain(input, FormatHint::Auto)
}
