//! Query Plan Model - Data structures for representing PostgreSQL execution plans
//!
//! Both EXPLAIN grammars (JSON and text) converge on the types defined here.
//! A parsed [`QueryPlan`] is never mutated by analysis; derived metrics live on
//! a separate annotated copy (see `diagnostics::AnnotatedNode`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Synthetic node identifier, assigned in pre-order during parsing (root = 0)
pub type NodeId = usize;

/// Grammar a plan was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanFormat {
    Json,
    Text,
}

impl PlanFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// Represents a complete parsed execution plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    /// Root node of the plan tree
    pub root: PlanNode,
    /// Planning time in milliseconds (if reported)
    pub planning_time: Option<f64>,
    /// Execution time in milliseconds (EXPLAIN ANALYZE only)
    pub execution_time: Option<f64>,
    /// Grammar the plan came from
    pub format: PlanFormat,
}

impl QueryPlan {
    /// Creates a new query plan with the given root node
    pub fn new(root: PlanNode, format: PlanFormat) -> Self {
        Self {
            root,
            planning_time: None,
            execution_time: None,
            format,
        }
    }

    /// Sets the planning time
    pub fn with_planning_time(mut self, ms: f64) -> Self {
        self.planning_time = Some(ms);
        self
    }

    /// Sets the execution time
    pub fn with_execution_time(mut self, ms: f64) -> Self {
        self.execution_time = Some(ms);
        self
    }

    /// Returns an iterator over all nodes in the plan (pre-order)
    pub fn iter_nodes(&self) -> PreOrder<'_, PlanNode> {
        PreOrder::new(&self.root)
    }

    /// Finds all nodes matching a specific node type
    pub fn find_nodes_by_type(&self, node_type: &NodeType) -> Vec<&PlanNode> {
        self.iter_nodes()
            .filter(|n| &n.node_type == node_type)
            .collect()
    }

    /// Finds a node by its synthetic id
    pub fn find_node(&self, id: NodeId) -> Option<&PlanNode> {
        self.iter_nodes().find(|n| n.id == id)
    }

    /// Returns true if the plan contains any sequential scans
    pub fn has_sequential_scans(&self) -> bool {
        self.iter_nodes().any(|n| n.node_type == NodeType::SeqScan)
    }

    /// Returns true if any node carries EXPLAIN ANALYZE measurements
    pub fn is_analyzed(&self) -> bool {
        self.iter_nodes().any(|n| n.actual.is_some())
    }

    /// Total number of nodes in the plan
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Estimated total cost of the whole plan
    pub fn total_cost(&self) -> f64 {
        self.root.total_cost
    }
}

/// A single operator in the execution tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    /// Synthetic pre-order id
    pub id: NodeId,
    /// Type of operation this node performs
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Role relative to the parent (`Outer`, `Inner`, `SubPlan`, `InitPlan`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_relationship: Option<String>,
    /// Label of a sub-plan (`SubPlan 1`, `CTE recent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subplan_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel_aware: bool,
    pub startup_cost: f64,
    pub total_cost: f64,
    /// Estimated rows per loop
    pub plan_rows: u64,
    /// Estimated average row width in bytes
    pub plan_width: u64,
    /// Measurements from EXPLAIN ANALYZE
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<ActualStats>,
    /// Block counters from EXPLAIN (BUFFERS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffers: Option<BufferStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_removed_by_filter: Option<u64>,
    /// Output columns (EXPLAIN VERBOSE)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    /// Operator-specific payload
    #[serde(default, skip_serializing_if = "NodeDetails::is_none")]
    pub details: NodeDetails,
    /// Properties not captured by specific fields, kept verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
    /// Child nodes in the order they were encountered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Creates a new plan node with the given type
    ///
    /// The operator-specific payload is chosen from the node type.
    pub fn new(node_type: NodeType) -> Self {
        let details = NodeDetails::for_node_type(&node_type);
        Self {
            id: 0,
            node_type,
            relation_name: None,
            alias: None,
            schema: None,
            parent_relationship: None,
            subplan_name: None,
            parallel_aware: false,
            startup_cost: 0.0,
            total_cost: 0.0,
            plan_rows: 0,
            plan_width: 0,
            actual: None,
            buffers: None,
            filter: None,
            rows_removed_by_filter: None,
            output: Vec::new(),
            details,
            extra: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Sets the relation/table name
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation_name = Some(relation.into());
        self
    }

    /// Sets the cost information
    pub fn with_cost(mut self, startup: f64, total: f64) -> Self {
        self.startup_cost = startup;
        self.total_cost = total;
        self
    }

    /// Sets the estimated rows
    pub fn with_rows(mut self, rows: u64) -> Self {
        self.plan_rows = rows;
        self
    }

    /// Sets the row width
    pub fn with_width(mut self, width: u32) -> Self {
        self.plan_width = u64::from(width);
        self
    }

    /// Sets the EXPLAIN ANALYZE measurements
    pub fn with_actual(mut self, startup: f64, total: f64, rows: u64, loops: u64) -> Self {
        self.actual = Some(ActualStats {
            startup_time: Some(startup),
            total_time: Some(total),
            rows,
            loops,
        });
        self
    }

    /// Sets the filter condition
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the operator-specific payload
    pub fn with_details(mut self, details: NodeDetails) -> Self {
        self.details = details;
        self
    }

    /// Adds a child node
    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// Assigns pre-order ids to this subtree, starting at zero
    ///
    /// Parsers assign ids while walking; this is for trees assembled by hand.
    pub fn numbered(mut self) -> Self {
        let mut next = 0;
        self.assign_ids(&mut next);
        self
    }

    fn assign_ids(&mut self, next: &mut NodeId) {
        self.id = *next;
        *next += 1;
        for child in &mut self.children {
            child.assign_ids(next);
        }
    }

    /// Returns the total number of nodes in this subtree (including self)
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Returns the maximum depth of this subtree
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Returns true if this is a leaf node (no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this node represents a scan operation
    pub fn is_scan(&self) -> bool {
        self.node_type.is_scan()
    }

    /// Returns true if this node represents a join operation
    pub fn is_join(&self) -> bool {
        self.node_type.is_join()
    }

    /// Returns the effective cost (total - startup)
    pub fn effective_cost(&self) -> f64 {
        self.total_cost - self.startup_cost
    }

    /// Qualified relation name (`schema.table`) when a relation is known
    pub fn qualified_relation(&self) -> Option<String> {
        let relation = self.relation_name.as_ref()?;
        Some(match &self.schema {
            Some(schema) => format!("{}.{}", schema, relation),
            None => relation.clone(),
        })
    }

    pub fn scan_details(&self) -> Option<&ScanDetails> {
        match &self.details {
            NodeDetails::Scan(scan) => Some(scan),
            _ => None,
        }
    }

    pub fn join_details(&self) -> Option<&JoinDetails> {
        match &self.details {
            NodeDetails::Join(join) => Some(join),
            _ => None,
        }
    }

    pub fn sort_details(&self) -> Option<&SortDetails> {
        match &self.details {
            NodeDetails::Sort(sort) => Some(sort),
            _ => None,
        }
    }

    pub fn aggregate_details(&self) -> Option<&AggregateDetails> {
        match &self.details {
            NodeDetails::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }

    pub fn hash_details(&self) -> Option<&HashDetails> {
        match &self.details {
            NodeDetails::Hash(hash) => Some(hash),
            _ => None,
        }
    }
}

/// Actual measurements from EXPLAIN ANALYZE
///
/// Times and rows are per-loop averages, exactly as PostgreSQL reports them.
/// Times are `None` when the plan was captured with `TIMING OFF` or the node
/// never executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ActualStats {
    #[serde(
        rename = "actualStartupTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub startup_time: Option<f64>,
    #[serde(
        rename = "actualTotalTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_time: Option<f64>,
    #[serde(rename = "actualRows")]
    pub rows: u64,
    #[serde(rename = "actualLoops")]
    pub loops: u64,
}

impl ActualStats {
    /// A node reported as `(never executed)`
    pub fn never_executed() -> Self {
        Self::default()
    }

    pub fn was_executed(&self) -> bool {
        self.loops > 0
    }

    /// Total time across all loops, in milliseconds
    pub fn inclusive_time(&self) -> Option<f64> {
        self.total_time.map(|t| t * self.loops as f64)
    }

    /// Total rows produced across all loops
    pub fn total_rows(&self) -> u64 {
        self.rows.saturating_mul(self.loops)
    }
}

/// Block I/O counters from EXPLAIN (BUFFERS)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferStats {
    pub shared_hit: u64,
    pub shared_read: u64,
    pub shared_dirtied: u64,
    pub shared_written: u64,
    pub local_hit: u64,
    pub local_read: u64,
    pub local_dirtied: u64,
    pub local_written: u64,
    pub temp_read: u64,
    pub temp_written: u64,
}

impl BufferStats {
    /// Fraction of shared block requests served from cache
    pub fn shared_hit_ratio(&self) -> Option<f64> {
        let total = self.shared_hit + self.shared_read;
        (total > 0).then(|| self.shared_hit as f64 / total as f64)
    }

    /// True when the node wrote temporary blocks (spilled to disk)
    pub fn used_temp_files(&self) -> bool {
        self.temp_written > 0 || self.temp_read > 0
    }
}

/// Operator-specific payload
///
/// Which variant a node carries is decided by its [`NodeType`], so only the
/// fields meaningful for that operator exist on it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDetails {
    #[default]
    None,
    Scan(ScanDetails),
    Join(JoinDetails),
    Sort(SortDetails),
    Aggregate(AggregateDetails),
    Hash(HashDetails),
}

impl NodeDetails {
    /// Returns the empty payload appropriate for a node type
    pub fn for_node_type(node_type: &NodeType) -> Self {
        use NodeType::*;
        match node_type {
            SeqScan | IndexScan | IndexOnlyScan | BitmapIndexScan | BitmapHeapScan | TidScan
            | TidRangeScan | SampleScan | ForeignScan | CustomScan => {
                Self::Scan(ScanDetails::default())
            }
            NestedLoop | HashJoin | MergeJoin => Self::Join(JoinDetails::default()),
            Sort | IncrementalSort => Self::Sort(SortDetails::default()),
            Aggregate | GroupAggregate | HashAggregate | MixedAggregate | Group | WindowAgg => {
                Self::Aggregate(AggregateDetails::default())
            }
            Hash => Self::Hash(HashDetails::default()),
            _ => Self::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Scan-specific properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_cond: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recheck_cond: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_removed_by_index_recheck: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_fetches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_direction: Option<String>,
}

/// Join-specific properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinDetails {
    pub join_type: JoinType,
    /// Hash Cond / Merge Cond
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_removed_by_join_filter: Option<u64>,
}

/// Sort-specific properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortDetails {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presorted_keys: Vec<String>,
    /// `quicksort`, `top-N heapsort`, `external merge`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_used_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_type: Option<SortSpaceType>,
}

impl SortDetails {
    /// True when the sort did not fit in work_mem and went to disk
    pub fn spilled_to_disk(&self) -> bool {
        self.space_type == Some(SortSpaceType::Disk)
            || self
                .sort_method
                .as_deref()
                .is_some_and(|m| m.starts_with("external"))
    }
}

/// Where a sort kept its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortSpaceType {
    Memory,
    Disk,
}

impl SortSpaceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "disk" => Some(Self::Disk),
            _ => None,
        }
    }

    pub fn as_postgres_str(&self) -> &'static str {
        match self {
            Self::Memory => "Memory",
            Self::Disk => "Disk",
        }
    }
}

/// Aggregate-specific properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateDetails {
    /// `Plain`, `Sorted`, `Hashed`, `Mixed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// `Simple`, `Partial`, `Finalize`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_keys: Vec<String>,
}

/// Hash-specific properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HashDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_buckets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_batches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_kb: Option<u64>,
}

impl HashDetails {
    /// True when the hash table was split into batches written to disk
    pub fn spilled_to_disk(&self) -> bool {
        self.batches.is_some_and(|b| b > 1)
    }
}

/// Type of join operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    RightSemi,
    RightAnti,
}

impl JoinType {
    /// Parses a join type as PostgreSQL prints it (`Inner`, `Left`, `Right Anti`, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Some(Self::Inner),
            "left" | "left outer" => Some(Self::Left),
            "right" | "right outer" => Some(Self::Right),
            "full" | "full outer" => Some(Self::Full),
            "semi" => Some(Self::Semi),
            "anti" => Some(Self::Anti),
            "right semi" => Some(Self::RightSemi),
            "right anti" => Some(Self::RightAnti),
            _ => None,
        }
    }

    pub fn as_postgres_str(&self) -> &'static str {
        match self {
            Self::Inner => "Inner",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Full => "Full",
            Self::Semi => "Semi",
            Self::Anti => "Anti",
            Self::RightSemi => "Right Semi",
            Self::RightAnti => "Right Anti",
        }
    }
}

/// Type of operation performed by a plan node
///
/// Operators the analyzer reasons about get their own variant; anything else
/// is preserved as [`NodeType::Other`] with its original name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    // Scan operations
    SeqScan,
    IndexScan,
    IndexOnlyScan,
    BitmapIndexScan,
    BitmapHeapScan,
    TidScan,
    TidRangeScan,
    SampleScan,
    SubqueryScan,
    FunctionScan,
    TableFunctionScan,
    ValuesScan,
    CteScan,
    NamedTuplestoreScan,
    WorkTableScan,
    ForeignScan,
    CustomScan,

    // Join operations
    NestedLoop,
    HashJoin,
    MergeJoin,

    // Aggregation operations
    Aggregate,
    GroupAggregate,
    HashAggregate,
    MixedAggregate,
    Group,
    WindowAgg,

    // Sort operations
    Sort,
    IncrementalSort,

    // Set operations
    SetOp,
    Append,
    MergeAppend,
    RecursiveUnion,

    Limit,
    Materialize,
    Memoize,
    Hash,
    Unique,
    BitmapAnd,
    BitmapOr,
    ModifyTable,
    Result,

    // Parallel query
    Gather,
    GatherMerge,

    LockRows,
    ProjectSet,

    /// Operator the analyzer does not model
    Other(String),
}

impl NodeType {
    /// Parses a node type from PostgreSQL EXPLAIN output
    pub fn from_postgres_str(s: &str) -> Self {
        match s {
            "Seq Scan" => Self::SeqScan,
            "Index Scan" => Self::IndexScan,
            "Index Only Scan" => Self::IndexOnlyScan,
            "Bitmap Index Scan" => Self::BitmapIndexScan,
            "Bitmap Heap Scan" => Self::BitmapHeapScan,
            "Tid Scan" | "TID Scan" => Self::TidScan,
            "Tid Range Scan" | "TID Range Scan" => Self::TidRangeScan,
            "Sample Scan" => Self::SampleScan,
            "Subquery Scan" => Self::SubqueryScan,
            "Function Scan" => Self::FunctionScan,
            "Table Function Scan" => Self::TableFunctionScan,
            "Values Scan" => Self::ValuesScan,
            "CTE Scan" => Self::CteScan,
            "Named Tuplestore Scan" => Self::NamedTuplestoreScan,
            "WorkTable Scan" => Self::WorkTableScan,
            "Foreign Scan" => Self::ForeignScan,
            "Custom Scan" => Self::CustomScan,
            "Nested Loop" => Self::NestedLoop,
            "Hash Join" => Self::HashJoin,
            "Merge Join" => Self::MergeJoin,
            "Aggregate" => Self::Aggregate,
            "GroupAggregate" | "Group Aggregate" => Self::GroupAggregate,
            "HashAggregate" | "Hash Aggregate" => Self::HashAggregate,
            "MixedAggregate" | "Mixed Aggregate" => Self::MixedAggregate,
            "Group" => Self::Group,
            "WindowAgg" | "Window Aggregate" => Self::WindowAgg,
            "Sort" => Self::Sort,
            "Incremental Sort" => Self::IncrementalSort,
            "SetOp" | "HashSetOp" => Self::SetOp,
            "Append" => Self::Append,
            "Merge Append" | "MergeAppend" => Self::MergeAppend,
            "Recursive Union" => Self::RecursiveUnion,
            "Limit" => Self::Limit,
            "Materialize" => Self::Materialize,
            "Memoize" => Self::Memoize,
            "Hash" => Self::Hash,
            "Unique" => Self::Unique,
            "BitmapAnd" | "Bitmap And" => Self::BitmapAnd,
            "BitmapOr" | "Bitmap Or" => Self::BitmapOr,
            "ModifyTable" | "Modify Table" => Self::ModifyTable,
            "Result" => Self::Result,
            "Gather" => Self::Gather,
            "Gather Merge" => Self::GatherMerge,
            "LockRows" | "Lock Rows" => Self::LockRows,
            "ProjectSet" | "Project Set" => Self::ProjectSet,
            other => Self::Other(other.to_string()),
        }
    }

    /// The name PostgreSQL uses for this operator
    pub fn as_postgres_str(&self) -> &str {
        match self {
            Self::SeqScan => "Seq Scan",
            Self::IndexScan => "Index Scan",
            Self::IndexOnlyScan => "Index Only Scan",
            Self::BitmapIndexScan => "Bitmap Index Scan",
            Self::BitmapHeapScan => "Bitmap Heap Scan",
            Self::TidScan => "Tid Scan",
            Self::TidRangeScan => "Tid Range Scan",
            Self::SampleScan => "Sample Scan",
            Self::SubqueryScan => "Subquery Scan",
            Self::FunctionScan => "Function Scan",
            Self::TableFunctionScan => "Table Function Scan",
            Self::ValuesScan => "Values Scan",
            Self::CteScan => "CTE Scan",
            Self::NamedTuplestoreScan => "Named Tuplestore Scan",
            Self::WorkTableScan => "WorkTable Scan",
            Self::ForeignScan => "Foreign Scan",
            Self::CustomScan => "Custom Scan",
            Self::NestedLoop => "Nested Loop",
            Self::HashJoin => "Hash Join",
            Self::MergeJoin => "Merge Join",
            Self::Aggregate => "Aggregate",
            Self::GroupAggregate => "GroupAggregate",
            Self::HashAggregate => "HashAggregate",
            Self::MixedAggregate => "MixedAggregate",
            Self::Group => "Group",
            Self::WindowAgg => "WindowAgg",
            Self::Sort => "Sort",
            Self::IncrementalSort => "Incremental Sort",
            Self::SetOp => "SetOp",
            Self::Append => "Append",
            Self::MergeAppend => "Merge Append",
            Self::RecursiveUnion => "Recursive Union",
            Self::Limit => "Limit",
            Self::Materialize => "Materialize",
            Self::Memoize => "Memoize",
            Self::Hash => "Hash",
            Self::Unique => "Unique",
            Self::BitmapAnd => "BitmapAnd",
            Self::BitmapOr => "BitmapOr",
            Self::ModifyTable => "ModifyTable",
            Self::Result => "Result",
            Self::Gather => "Gather",
            Self::GatherMerge => "Gather Merge",
            Self::LockRows => "LockRows",
            Self::ProjectSet => "ProjectSet",
            Self::Other(name) => name,
        }
    }

    /// Returns a human-readable description of this node type
    pub fn description(&self) -> &'static str {
        match self {
            Self::SeqScan => "Sequential scan (full table scan)",
            Self::IndexScan => "Index scan (uses index to find rows, then reads table)",
            Self::IndexOnlyScan => "Index-only scan (reads data directly from index)",
            Self::BitmapIndexScan => "Bitmap index scan (builds bitmap of matching rows)",
            Self::BitmapHeapScan => "Bitmap heap scan (reads table using bitmap)",
            Self::TidScan | Self::TidRangeScan => "TID scan (direct row access by tuple ID)",
            Self::SampleScan => "Sample scan (TABLESAMPLE)",
            Self::SubqueryScan => "Subquery scan (scans subquery results)",
            Self::FunctionScan | Self::TableFunctionScan => {
                "Function scan (scans function return values)"
            }
            Self::ValuesScan => "Values scan (scans VALUES clause)",
            Self::CteScan => "CTE scan (scans common table expression)",
            Self::NamedTuplestoreScan => "Named tuplestore scan (transition tables)",
            Self::WorkTableScan => "Work table scan (recursive CTE work table)",
            Self::ForeignScan => "Foreign scan (scans foreign table)",
            Self::CustomScan => "Custom scan (extension-provided scan)",
            Self::NestedLoop => "Nested loop join",
            Self::HashJoin => "Hash join",
            Self::MergeJoin => "Merge join (sorted inputs)",
            Self::Aggregate => "Aggregate",
            Self::GroupAggregate => "Group aggregate (sorted groups)",
            Self::HashAggregate => "Hash aggregate (hash-based grouping)",
            Self::MixedAggregate => "Mixed aggregate (grouping sets)",
            Self::Group => "Group (sorted grouping without aggregates)",
            Self::WindowAgg => "Window function aggregate",
            Self::Sort => "Sort",
            Self::IncrementalSort => "Incremental sort (partially presorted)",
            Self::SetOp => "Set operation (INTERSECT/EXCEPT)",
            Self::Append => "Append (combines multiple inputs)",
            Self::MergeAppend => "Merge append (combines sorted inputs)",
            Self::RecursiveUnion => "Recursive union (recursive CTE)",
            Self::Limit => "Limit (restricts output rows)",
            Self::Materialize => "Materialize (stores results in memory)",
            Self::Memoize => "Memoize (caches repeated lookups)",
            Self::Hash => "Hash (builds hash table for join)",
            Self::Unique => "Unique (removes duplicates)",
            Self::BitmapAnd => "Bitmap AND (combines bitmaps)",
            Self::BitmapOr => "Bitmap OR (combines bitmaps)",
            Self::ModifyTable => "Modify table (INSERT/UPDATE/DELETE/MERGE)",
            Self::Result => "Result (computes expression)",
            Self::Gather => "Gather (collects parallel worker results)",
            Self::GatherMerge => "Gather merge (merges sorted parallel results)",
            Self::LockRows => "Lock rows (FOR UPDATE/SHARE)",
            Self::ProjectSet => "Project set (generates rows from set-returning functions)",
            Self::Other(_) => "Unrecognized operation",
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            Self::SeqScan
                | Self::IndexScan
                | Self::IndexOnlyScan
                | Self::BitmapIndexScan
                | Self::BitmapHeapScan
                | Self::TidScan
                | Self::TidRangeScan
                | Self::SampleScan
                | Self::SubqueryScan
                | Self::FunctionScan
                | Self::TableFunctionScan
                | Self::ValuesScan
                | Self::CteScan
                | Self::NamedTuplestoreScan
                | Self::WorkTableScan
                | Self::ForeignScan
                | Self::CustomScan
        )
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Self::NestedLoop | Self::HashJoin | Self::MergeJoin)
    }

    /// True for scans that read a table through an index
    pub fn uses_index(&self) -> bool {
        matches!(
            self,
            Self::IndexScan | Self::IndexOnlyScan | Self::BitmapIndexScan | Self::BitmapHeapScan
        )
    }

    /// Returns true if this operation typically indicates a performance concern
    pub fn is_potentially_slow(&self) -> bool {
        matches!(self, Self::SeqScan | Self::NestedLoop | Self::Sort)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_postgres_str())
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self::from_postgres_str(&s)
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Other(name) => name,
            known => known.as_postgres_str().to_string(),
        }
    }
}

/// A tree whose nodes can be walked in pre-order
pub trait TreeNode: Sized {
    fn child_nodes(&self) -> &[Self];
}

impl TreeNode for PlanNode {
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

/// Iterator for traversing plan nodes depth-first, parents before children
pub struct PreOrder<'a, T> {
    stack: Vec<&'a T>,
}

impl<'a, T: TreeNode> PreOrder<'a, T> {
    pub fn new(root: &'a T) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a, T: TreeNode> Iterator for PreOrder<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse order so we visit them in order
        for child in node.child_nodes().iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests;
