//! PostgreSQL text-format EXPLAIN parser
//!
//! Reads the indented tree printed by `EXPLAIN` / `EXPLAIN ANALYZE` (as it
//! appears in psql, pgAdmin or a log file) in a single forward pass. Open
//! nodes live on an explicit stack keyed by the column where their operator
//! name starts; a header at column `k` closes every open node at `k` or
//! deeper before it is pushed.
//!
//! ```text
//!  Hash Join  (cost=10.00..100.00 rows=500 width=72)
//!    Hash Cond: (o.user_id = u.id)
//!    ->  Seq Scan on orders o  (cost=0.00..50.00 rows=1000 width=36)
//!    ->  Hash  (cost=5.00..10.00 rows=100 width=36)
//!          ->  Seq Scan on users u  (cost=0.00..5.00 rows=100 width=36)
//! ```

use crate::error::{AnalyzerError, Result};
use crate::explain::plan::{
    ActualStats, BufferStats, JoinType, NodeDetails, NodeId, NodeType, PlanFormat, PlanNode,
    QueryPlan, SortSpaceType,
};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

static COST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\(cost=(?P<startup>\d+(?:\.\d+)?)\.\.(?P<total>\d+(?:\.\d+)?) rows=(?P<rows>\d+) width=(?P<width>\d+)\)",
    )
    .expect("valid regex")
});

static ACTUAL_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\(actual time=(?P<startup>\d+(?:\.\d+)?)\.\.(?P<total>\d+(?:\.\d+)?) rows=(?P<rows>\d+(?:\.\d+)?) loops=(?P<loops>\d+)\)",
    )
    .expect("valid regex")
});

static ACTUAL_ROWS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(actual rows=(?P<rows>\d+(?:\.\d+)?) loops=(?P<loops>\d+)\)")
        .expect("valid regex")
});

static SUMMARY_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<label>planning time|execution time|total runtime):\s*(?P<value>\S*?)(?:\s*ms)?$",
    )
    .expect("valid regex")
});

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:SubPlan \d+|InitPlan \d+(?: \(returns [^)]*\))?|CTE \S+)$")
        .expect("valid regex")
});

static ROWS_FOOTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d+ rows?\)$").expect("valid regex"));

static JOIN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<op>Nested Loop|Hash|Merge)(?: (?P<kind>Left|Right|Full|Semi|Anti|Right Semi|Right Anti))? Join$",
    )
    .expect("valid regex")
});

static SORT_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<method>.+?)\s+(?P<space>Memory|Disk):\s*(?P<kb>\d+)kB$")
        .expect("valid regex")
});

static HASH_USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Buckets: (?P<buckets>\d+)(?: \(originally (?P<orig_buckets>\d+)\))?\s+Batches: (?P<batches>\d+)(?: \(originally (?P<orig_batches>\d+)\))?\s+Memory Usage: (?P<memory>\d+)kB$",
    )
    .expect("valid regex")
});

/// Parses PostgreSQL text-format EXPLAIN output
#[tracing::instrument(skip(input), fields(lines = input.lines().count()))]
pub fn parse_text_explain(input: &str) -> Result<QueryPlan> {
    let mut builder = TextPlanBuilder::new();
    for (index, line) in input.lines().enumerate() {
        builder.feed(index + 1, line)?;
    }
    builder.finish()
}

/// Where the scanner is within the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Reading plan nodes and their detail lines
    Plan,
    /// Inside `Planning:` / `JIT:`; lines deeper than `indent` are skipped
    SummaryBlock { indent: usize },
}

/// A node whose children may still follow
struct OpenNode {
    key: usize,
    node: PlanNode,
}

/// A `SubPlan N` / `InitPlan N` / `CTE name` line waiting for its header
struct PendingLabel {
    name: String,
    relationship: &'static str,
}

struct HeaderRecord {
    line: usize,
    has_actual: bool,
}

struct TextPlanBuilder {
    state: ScanState,
    stack: Vec<OpenNode>,
    pending_label: Option<PendingLabel>,
    next_id: NodeId,
    headers: Vec<HeaderRecord>,
    planning_time: Option<f64>,
    execution_time: Option<f64>,
}

impl TextPlanBuilder {
    fn new() -> Self {
        Self {
            state: ScanState::Plan,
            stack: Vec::new(),
            pending_label: None,
            next_id: 0,
            headers: Vec::new(),
            planning_time: None,
            execution_time: None,
        }
    }

    fn feed(&mut self, line_no: usize, raw: &str) -> Result<()> {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let ScanState::SummaryBlock { indent: block } = self.state {
            if trimmed.is_empty() || indent > block {
                return Ok(());
            }
            self.state = ScanState::Plan;
        }

        if is_noise(trimmed) {
            return Ok(());
        }
        if self.read_summary_line(trimmed, line_no)? {
            return Ok(());
        }
        if trimmed == "Planning:" || trimmed == "JIT:" {
            self.state = ScanState::SummaryBlock { indent };
            return Ok(());
        }
        if is_header(trimmed) {
            return self.push_header(line, line_no);
        }
        if LABEL_RE.is_match(trimmed) {
            self.open_label(trimmed, indent);
            return Ok(());
        }

        self.attach_detail(trimmed, indent, line_no);
        Ok(())
    }

    /// Handles `Planning Time`, `Execution Time`, `Total runtime` and trigger lines
    fn read_summary_line(&mut self, trimmed: &str, line_no: usize) -> Result<bool> {
        if let Some(caps) = SUMMARY_TIME_RE.captures(trimmed) {
            let label = caps
                .name("label")
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();
            let raw = caps.name("value").map_or("", |m| m.as_str());
            let ms: f64 = raw
                .parse()
                .ok()
                .filter(|ms: &f64| ms.is_finite())
                .ok_or_else(|| {
                    AnalyzerError::malformed(format!(
                        "line {}: cannot read a time from '{}'",
                        line_no, trimmed
                    ))
                })?;
            if label.starts_with("planning") {
                self.planning_time = Some(ms);
            } else {
                self.execution_time = Some(ms);
            }
            return Ok(true);
        }

        if trimmed.starts_with("Trigger ") && trimmed.contains(": time=") {
            tracing::debug!(line = line_no, "skipping trigger timing line");
            return Ok(true);
        }

        Ok(false)
    }

    fn push_header(&mut self, line: &str, line_no: usize) -> Result<()> {
        let trimmed = line.trim_start();
        let lead = line.len() - trimmed.len();
        let (content, key) = match trimmed.strip_prefix("->") {
            Some(after) => {
                let operator = after.trim_start();
                (operator, lead + 2 + (after.len() - operator.len()))
            }
            None => (trimmed, lead),
        };

        let header = parse_header(content, line_no)?;
        let mut node = header.node;
        node.id = self.next_id;
        self.next_id += 1;
        if let Some(label) = self.pending_label.take() {
            node.subplan_name = Some(label.name);
            node.parent_relationship = Some(label.relationship.to_string());
        }
        self.headers.push(HeaderRecord {
            line: line_no,
            has_actual: header.has_actual,
        });

        // Close previous siblings and anything nested under them
        while let Some(top) = self.stack.last()
            && top.key >= key
        {
            if self.stack.len() == 1 {
                return Err(AnalyzerError::malformed(format!(
                    "line {}: more than one top-level plan node",
                    line_no
                )));
            }
            self.close_top();
        }

        self.stack.push(OpenNode { key, node });
        Ok(())
    }

    fn open_label(&mut self, label: &str, indent: usize) {
        while self.stack.len() > 1 && self.stack.last().is_some_and(|top| top.key > indent) {
            self.close_top();
        }

        let relationship = if label.starts_with("SubPlan") {
            "SubPlan"
        } else {
            "InitPlan"
        };
        self.pending_label = Some(PendingLabel {
            name: label.to_string(),
            relationship,
        });
    }

    /// Attaches a detail line to the deepest open node it is indented under
    fn attach_detail(&mut self, trimmed: &str, indent: usize, line_no: usize) {
        let Some(owner) = self.stack.iter_mut().rev().find(|open| open.key < indent) else {
            tracing::debug!(line = line_no, "ignoring line outside any plan node");
            return;
        };

        match trimmed.split_once(": ") {
            Some((key, value)) => apply_detail(&mut owner.node, key.trim(), value.trim(), trimmed),
            None => match trimmed.strip_suffix(':') {
                Some(key) => insert_extra(&mut owner.node.extra, key, Value::Null),
                None => insert_extra(
                    &mut owner.node.extra,
                    "Notes",
                    Value::String(trimmed.to_string()),
                ),
            },
        }
    }

    fn close_top(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(closed) = self.stack.pop()
            && let Some(parent) = self.stack.last_mut()
        {
            attach_child(&mut parent.node, closed.node);
        }
    }

    fn finish(mut self) -> Result<QueryPlan> {
        while self.stack.len() > 1 {
            self.close_top();
        }
        let Some(root) = self.stack.pop() else {
            return Err(AnalyzerError::malformed("no plan nodes found"));
        };

        let analyzed = self.headers.iter().any(|h| h.has_actual);
        if analyzed && let Some(missing) = self.headers.iter().find(|h| !h.has_actual) {
            return Err(AnalyzerError::unparsable_header(
                missing.line,
                "node has no actual statistics in an EXPLAIN ANALYZE plan",
            ));
        }

        if self.pending_label.is_some() {
            tracing::debug!("sub-plan label without a following node");
        }

        let mut plan = QueryPlan::new(root.node, PlanFormat::Text);
        plan.planning_time = self.planning_time;
        plan.execution_time = match self.execution_time {
            Some(ms) if !analyzed => {
                tracing::warn!(
                    execution_ms = ms,
                    "ignoring Execution Time in a plan without actual statistics"
                );
                None
            }
            other => other,
        };

        tracing::debug!(nodes = self.next_id, analyzed, "parsed text plan");
        Ok(plan)
    }
}

fn is_noise(trimmed: &str) -> bool {
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("QUERY PLAN")
        || trimmed.chars().all(|c| c == '-' || c == '+')
        || ROWS_FOOTER_RE.is_match(trimmed)
}

/// Only an arrow or a cost group opens a node; `(actual ...)` alone can be a column name
fn is_header(trimmed: &str) -> bool {
    trimmed.starts_with("->") || trimmed.contains("(cost=")
}

struct ParsedHeader {
    node: PlanNode,
    has_actual: bool,
}

/// Parses `<operator> [using <index>] [on <relation> [<alias>]] (cost=...) [(actual ...)]`
fn parse_header(content: &str, line_no: usize) -> Result<ParsedHeader> {
    let Some(cost_start) = content.find("(cost=") else {
        return Err(AnalyzerError::unparsable_header(
            line_no,
            "missing (cost=...) group",
        ));
    };

    let description = content[..cost_start].trim_end();
    if description.is_empty() {
        return Err(AnalyzerError::unparsable_header(
            line_no,
            "missing operator name",
        ));
    }

    let groups = &content[cost_start..];
    let cost = COST_RE.captures(groups).ok_or_else(|| {
        AnalyzerError::unparsable_header(
            line_no,
            "cost group is not of the form (cost=S..T rows=R width=W)",
        )
    })?;

    let mut node = build_node(description);
    let (Some(startup), Some(total), Some(rows), Some(width)) = (
        number::<f64>(&cost, "startup"),
        number::<f64>(&cost, "total"),
        number::<u64>(&cost, "rows"),
        number::<u64>(&cost, "width"),
    ) else {
        return Err(AnalyzerError::unparsable_header(
            line_no,
            "cost group contains an unreadable number",
        ));
    };
    if total < startup {
        return Err(AnalyzerError::unparsable_header(
            line_no,
            "total cost is below startup cost",
        ));
    }
    node.startup_cost = startup;
    node.total_cost = total;
    node.plan_rows = rows;
    node.plan_width = width;

    let after_cost = cost.get(0).map_or("", |m| &groups[m.end()..]);
    let actual = if let Some(caps) = ACTUAL_TIME_RE.captures(after_cost) {
        Some(ActualStats {
            startup_time: number(&caps, "startup"),
            total_time: number(&caps, "total"),
            rows: count(&caps, "rows").unwrap_or(0),
            loops: number(&caps, "loops").unwrap_or(1),
        })
    } else if let Some(caps) = ACTUAL_ROWS_RE.captures(after_cost) {
        Some(ActualStats {
            startup_time: None,
            total_time: None,
            rows: count(&caps, "rows").unwrap_or(0),
            loops: number(&caps, "loops").unwrap_or(1),
        })
    } else if after_cost.contains("(never executed)") {
        Some(ActualStats::never_executed())
    } else if after_cost.contains("(actual") {
        return Err(AnalyzerError::unparsable_header(
            line_no,
            "actual group is not of the form (actual time=S..T rows=R loops=L)",
        ));
    } else {
        None
    };

    let has_actual = actual.is_some();
    node.actual = actual;
    Ok(ParsedHeader { node, has_actual })
}

/// Builds a node from the operator description before the cost group
fn build_node(description: &str) -> PlanNode {
    let mut rest = description;
    let mut parallel_aware = false;
    let mut partial_mode = None;

    if let Some(stripped) = rest.strip_prefix("Parallel ") {
        parallel_aware = true;
        rest = stripped;
    }
    for mode in ["Partial ", "Finalize "] {
        if let Some(stripped) = rest.strip_prefix(mode) {
            partial_mode = Some(mode.trim_end().to_string());
            rest = stripped;
        }
    }

    let (name, target) = split_target(rest);
    let (name, backward) = match name.strip_suffix(" Backward") {
        Some(name) => (name, true),
        None => (name, false),
    };

    let mut extra = BTreeMap::new();
    let (node_type, join_type) = classify_operator(name, &mut extra);

    let mut node = PlanNode::new(node_type);
    node.parallel_aware = parallel_aware;
    node.extra = extra;

    match &mut node.details {
        NodeDetails::Join(join) => join.join_type = join_type.unwrap_or_default(),
        NodeDetails::Aggregate(agg) => {
            agg.strategy = match node.node_type {
                NodeType::Aggregate => Some("Plain".to_string()),
                NodeType::GroupAggregate => Some("Sorted".to_string()),
                NodeType::HashAggregate => Some("Hashed".to_string()),
                NodeType::MixedAggregate => Some("Mixed".to_string()),
                _ => None,
            };
            agg.partial_mode = partial_mode;
        }
        NodeDetails::Scan(scan)
            if matches!(node.node_type, NodeType::IndexScan | NodeType::IndexOnlyScan) =>
        {
            let direction = if backward { "Backward" } else { "Forward" };
            scan.scan_direction = Some(direction.to_string());
        }
        _ => {}
    }

    if let Some(target) = target {
        apply_target(&mut node, target);
    }
    node
}

/// Splits `Index Scan using idx on t` into the operator name and the rest
fn split_target(description: &str) -> (&str, Option<&str>) {
    let split_at = [description.find(" using "), description.find(" on ")]
        .into_iter()
        .flatten()
        .min();
    match split_at {
        Some(index) => (
            &description[..index],
            Some(description[index..].trim_start()),
        ),
        None => (description, None),
    }
}

/// Maps an operator name to its node type, plus the join type for joins
fn classify_operator(
    name: &str,
    extra: &mut BTreeMap<String, Value>,
) -> (NodeType, Option<JoinType>) {
    if name == "Nested Loop" {
        return (NodeType::NestedLoop, Some(JoinType::Inner));
    }
    if let Some(caps) = JOIN_NAME_RE.captures(name) {
        let node_type = match caps.name("op").map(|m| m.as_str()) {
            Some("Hash") => NodeType::HashJoin,
            Some("Merge") => NodeType::MergeJoin,
            _ => NodeType::NestedLoop,
        };
        let join_type = caps
            .name("kind")
            .and_then(|m| JoinType::parse(m.as_str()))
            .unwrap_or(JoinType::Inner);
        return (node_type, Some(join_type));
    }

    match name {
        "Insert" | "Update" | "Delete" | "Merge" => {
            extra.insert("Operation".to_string(), Value::String(name.to_string()));
            (NodeType::ModifyTable, None)
        }
        _ if name.starts_with("Custom Scan") => {
            if let Some(provider) = name
                .strip_prefix("Custom Scan (")
                .and_then(|p| p.strip_suffix(')'))
            {
                extra.insert(
                    "Custom Plan Provider".to_string(),
                    Value::String(provider.to_string()),
                );
            }
            (NodeType::CustomScan, None)
        }
        _ if name.starts_with("SetOp ") || name.starts_with("HashSetOp ") => {
            let (strategy, command) = match name.split_once(' ') {
                Some(("HashSetOp", command)) => ("Hashed", command),
                Some((_, command)) => ("Sorted", command),
                None => ("Sorted", ""),
            };
            extra.insert("Strategy".to_string(), Value::String(strategy.to_string()));
            extra.insert("Command".to_string(), Value::String(command.to_string()));
            (NodeType::SetOp, None)
        }
        _ => (NodeType::from_postgres_str(name), None),
    }
}

/// Applies `using <index>` / `on <relation> [<alias>]`
fn apply_target(node: &mut PlanNode, target: &str) {
    let mut target = Some(target);

    if let Some(after) = target.and_then(|t| t.strip_prefix("using ")) {
        let (index, remainder) = match after.find(" on ") {
            Some(i) => (&after[..i], Some(after[i..].trim_start())),
            None => (after, None),
        };
        if let NodeDetails::Scan(scan) = &mut node.details {
            scan.index_name = Some(unquote(index).to_string());
        }
        target = remainder;
    }

    let Some(on) = target.and_then(|t| t.strip_prefix("on ")) else {
        return;
    };
    let mut parts = on.split_whitespace();
    let Some(object) = parts.next().map(unquote) else {
        return;
    };
    let alias = parts.next().map(|a| unquote(a).to_string());

    match node.node_type {
        NodeType::BitmapIndexScan => {
            if let NodeDetails::Scan(scan) = &mut node.details {
                scan.index_name = Some(object.to_string());
            }
        }
        NodeType::CteScan | NodeType::WorkTableScan => {
            node.extra
                .insert("CTE Name".to_string(), Value::String(object.to_string()));
            node.alias = alias;
        }
        NodeType::FunctionScan | NodeType::TableFunctionScan => {
            node.extra.insert(
                "Function Name".to_string(),
                Value::String(object.to_string()),
            );
            node.alias = alias;
        }
        NodeType::SubqueryScan | NodeType::ValuesScan => {
            node.alias = Some(object.to_string());
        }
        _ => {
            match object.split_once('.') {
                Some((schema, relation)) => {
                    node.schema = Some(unquote(schema).to_string());
                    node.relation_name = Some(unquote(relation).to_string());
                }
                None => node.relation_name = Some(object.to_string()),
            }
            node.alias = alias;
        }
    }
}

/// Interprets one `Key: value` line for the node that owns it
fn apply_detail(node: &mut PlanNode, key: &str, value: &str, line: &str) {
    match key {
        "Filter" => {
            node.filter = Some(value.to_string());
            return;
        }
        "Rows Removed by Filter" => {
            if let Some(removed) = parse_count(value) {
                node.rows_removed_by_filter = Some(removed);
                return;
            }
        }
        "Output" => {
            node.output = split_top_level(value);
            return;
        }
        "Buffers" => {
            if let Some(buffers) = parse_buffers(value) {
                node.buffers = Some(buffers);
                return;
            }
        }
        _ => {}
    }

    if apply_variant_detail(&mut node.details, key, value, line) {
        return;
    }
    insert_extra(&mut node.extra, key, Value::String(value.to_string()));
}

/// Detail lines that belong to the node's operator-specific payload
fn apply_variant_detail(details: &mut NodeDetails, key: &str, value: &str, line: &str) -> bool {
    match details {
        NodeDetails::Scan(scan) => match key {
            "Index Cond" => scan.index_cond = Some(value.to_string()),
            "Recheck Cond" => scan.recheck_cond = Some(value.to_string()),
            "Rows Removed by Index Recheck" => match parse_count(value) {
                Some(n) => scan.rows_removed_by_index_recheck = Some(n),
                None => return false,
            },
            "Heap Fetches" => match parse_count(value) {
                Some(n) => scan.heap_fetches = Some(n),
                None => return false,
            },
            _ => return false,
        },
        NodeDetails::Join(join) => match key {
            "Hash Cond" | "Merge Cond" => join.condition = Some(value.to_string()),
            "Join Filter" => join.join_filter = Some(value.to_string()),
            "Rows Removed by Join Filter" => match parse_count(value) {
                Some(n) => join.rows_removed_by_join_filter = Some(n),
                None => return false,
            },
            _ => return false,
        },
        NodeDetails::Sort(sort) => match key {
            "Sort Key" => sort.sort_keys = split_top_level(value),
            "Presorted Key" => sort.presorted_keys = split_top_level(value),
            "Sort Method" => match SORT_METHOD_RE.captures(value) {
                Some(caps) => {
                    sort.sort_method = caps.name("method").map(|m| m.as_str().to_string());
                    sort.space_type = caps
                        .name("space")
                        .and_then(|m| SortSpaceType::parse(m.as_str()));
                    sort.space_used_kb = number(&caps, "kb");
                }
                None => sort.sort_method = Some(value.to_string()),
            },
            _ => return false,
        },
        NodeDetails::Aggregate(agg) => match key {
            "Group Key" => agg.group_keys = split_top_level(value),
            _ => return false,
        },
        NodeDetails::Hash(hash) => match (key, HASH_USAGE_RE.captures(line)) {
            ("Buckets", Some(caps)) => {
                hash.buckets = number(&caps, "buckets");
                hash.original_buckets = number(&caps, "orig_buckets").or(hash.buckets);
                hash.batches = number(&caps, "batches");
                hash.original_batches = number(&caps, "orig_batches").or(hash.batches);
                hash.peak_memory_kb = number(&caps, "memory");
            }
            _ => return false,
        },
        NodeDetails::None => return false,
    }
    true
}

/// Parses `shared hit=10 read=5, temp read=1 written=2`
fn parse_buffers(value: &str) -> Option<BufferStats> {
    let mut buffers = BufferStats::default();
    for group in value.split(',') {
        let mut words = group.split_whitespace();
        let scope = words.next()?;
        for pair in words {
            let (name, raw) = pair.split_once('=')?;
            let count: u64 = raw.parse().ok()?;
            let slot = match (scope, name) {
                ("shared", "hit") => &mut buffers.shared_hit,
                ("shared", "read") => &mut buffers.shared_read,
                ("shared", "dirtied") => &mut buffers.shared_dirtied,
                ("shared", "written") => &mut buffers.shared_written,
                ("local", "hit") => &mut buffers.local_hit,
                ("local", "read") => &mut buffers.local_read,
                ("local", "dirtied") => &mut buffers.local_dirtied,
                ("local", "written") => &mut buffers.local_written,
                ("temp", "read") => &mut buffers.temp_read,
                ("temp", "written") => &mut buffers.temp_written,
                _ => return None,
            };
            *slot = count;
        }
    }
    Some(buffers)
}

/// Attaches a closed node to its parent, filling in its role when unlabeled
fn attach_child(parent: &mut PlanNode, mut child: PlanNode) {
    if child.parent_relationship.is_none() {
        let relationship = match parent.node_type {
            NodeType::Append | NodeType::MergeAppend => "Member",
            _ if parent.children.is_empty() => "Outer",
            _ => "Inner",
        };
        child.parent_relationship = Some(relationship.to_string());
    }
    parent.children.push(child);
}

/// Adds a value to `extra`, collecting repeated keys into an array
fn insert_extra(extra: &mut BTreeMap<String, Value>, key: &str, value: Value) {
    match extra.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            extra.insert(key.to_string(), value);
        }
    }
}

/// Splits a comma-separated list, ignoring commas inside parentheses or quotes
fn split_top_level(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in list.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items.retain(|item| !item.is_empty());
    items
}

fn unquote(identifier: &str) -> &str {
    identifier
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(identifier)
}

fn number<T: FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)?.as_str().parse().ok()
}

/// Row counts may be fractional per-loop averages; they are rounded
fn count(caps: &Captures<'_>, name: &str) -> Option<u64> {
    number::<f64>(caps, name).map(|n| n.round() as u64)
}

fn parse_count(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}
