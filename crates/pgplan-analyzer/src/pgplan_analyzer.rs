//! pgplan Analyzer - PostgreSQL EXPLAIN parsing and plan diagnostics
//!
//! This crate provides functionality for:
//! - Parsing EXPLAIN / EXPLAIN ANALYZE output in text or JSON format
//! - Deriving per-node timing and cardinality metrics
//! - Producing ranked, bilingual optimization recommendations
//!
//! # Example
//!
//! ```
//! use pgplan_analyzer::{FormatHint, PlanAnalyzer, Severity};
//!
//! let plan = "Seq Scan on users  (cost=0.00..35.50 rows=1000 width=4) (actual time=0.010..2.345 rows=1000 loops=1)\n\
//!             Execution Time: 2.500 ms";
//! let report = PlanAnalyzer::new().analyze_str(plan, FormatHint::Auto).unwrap();
//! assert_eq!(report.recommendations[0].severity, Severity::Critical);
//! ```

pub mod analysis;
pub mod diagnostics;
pub mod error;
pub mod explain;
pub mod localized;
pub mod narrative;

pub use analysis::{AnalysisReport, AnalysisRequest, ErrorResponse, PlanAnalyzer};
pub use diagnostics::{
    AnalyzerConfig, AnnotatedNode, ConfigError, NodeMetrics, NodeWarning, PlanDiagnosis,
    PlanSummary, Recommendation, RuleId, Severity, diagnose,
};
pub use error::{AnalyzerError, ErrorClass, Result};
pub use explain::{
    FormatHint, NodeType, PlanFormat, PlanNode, QueryPlan, parse_explain, render_explain_json,
};
pub use localized::{Language, LocalizedText};
pub use narrative::{ExplanationRequest, PlanNarrator, narrate};
