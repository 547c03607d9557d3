//! PostgreSQL `EXPLAIN (FORMAT JSON)` parser
//!
//! # Examples
//!
//! ```
//! use pgplan_analyzer::explain::json::parse_json_explain;
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Startup Cost": 0.0,
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100,
//!       "Plan Width": 36
//!     }
//!   }
//! ]"#;
//!
//! let plan = parse_json_explain(json_output).unwrap();
//! assert!(plan.has_sequential_scans());
//! ```

use crate::error::{AnalyzerError, Result};
use crate::explain::plan::{
    ActualStats, BufferStats, JoinType, NodeDetails, NodeId, NodeType, PlanFormat, PlanNode,
    QueryPlan, SortSpaceType,
};
use serde_json::{Map, Value};

/// Parses PostgreSQL EXPLAIN (FORMAT JSON) output
///
/// Accepts the usual one-element array as well as a bare `{"Plan": ...}`
/// object. Only the first statement of a multi-statement array is used.
#[tracing::instrument(skip(input), fields(bytes = input.len()))]
pub fn parse_json_explain(input: &str) -> Result<QueryPlan> {
    let value: Value = serde_json::from_str(input.trim())?;

    let envelope = match &value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| AnalyzerError::malformed("EXPLAIN output is an empty array"))?,
        Value::Object(_) => &value,
        _ => {
            return Err(AnalyzerError::malformed(
                "expected a JSON array or object at the top level",
            ));
        }
    };
    let envelope = envelope
        .as_object()
        .ok_or_else(|| AnalyzerError::malformed("EXPLAIN entry is not a JSON object"))?;

    let plan_value = envelope
        .get("Plan")
        .ok_or_else(|| AnalyzerError::malformed("missing \"Plan\" object"))?;

    let mut next_id: NodeId = 0;
    let root = parse_plan_node(plan_value, &mut next_id)?;

    let mut summary = Fields::new(envelope.clone());
    let mut plan = QueryPlan::new(root, PlanFormat::Json);
    plan.planning_time = summary.take_f64("Planning Time")?;
    plan.execution_time = match summary.take_f64("Execution Time")? {
        Some(ms) => Some(ms),
        // Servers before 9.4 report the same figure as "Total Runtime"
        None => summary.take_f64("Total Runtime")?,
    };

    tracing::debug!(nodes = next_id, "parsed JSON plan");
    Ok(plan)
}

/// Parses a single plan node (and its children) from JSON
fn parse_plan_node(value: &Value, next_id: &mut NodeId) -> Result<PlanNode> {
    let object = value
        .as_object()
        .ok_or_else(|| AnalyzerError::malformed("plan node is not a JSON object"))?;
    let mut fields = Fields::new(object.clone());

    let node_type_str = fields
        .take_str("Node Type")
        .ok_or_else(|| AnalyzerError::malformed("plan node without a \"Node Type\" string"))?;

    // Postgres reports every aggregate as "Aggregate" and puts the flavour in
    // "Strategy"; the text grammar names the flavour directly.
    let node_type = match node_type_str.as_str() {
        "Aggregate" => match object.get("Strategy").and_then(Value::as_str) {
            Some("Hashed") => NodeType::HashAggregate,
            Some("Sorted") => NodeType::GroupAggregate,
            Some("Mixed") => NodeType::MixedAggregate,
            _ => NodeType::Aggregate,
        },
        other => NodeType::from_postgres_str(other),
    };

    let mut node = PlanNode::new(node_type);
    node.id = *next_id;
    *next_id += 1;

    node.relation_name = fields.take_str("Relation Name");
    node.schema = fields.take_str("Schema");
    node.alias = fields.take_str("Alias");
    node.parent_relationship = fields.take_str("Parent Relationship");
    node.subplan_name = fields.take_str("Subplan Name");
    node.parallel_aware = fields.take_bool("Parallel Aware").unwrap_or(false);

    // Cost information
    node.startup_cost = fields.take_f64("Startup Cost")?.unwrap_or(0.0);
    node.total_cost = fields.take_f64("Total Cost")?.unwrap_or(node.startup_cost);
    if node.total_cost < node.startup_cost {
        return Err(AnalyzerError::malformed(format!(
            "{} has Total Cost {} below Startup Cost {}",
            node.node_type, node.total_cost, node.startup_cost
        )));
    }

    // Row estimates
    node.plan_rows = fields.take_u64("Plan Rows")?.unwrap_or(0);
    node.plan_width = fields.take_u64("Plan Width")?.unwrap_or(0);

    // Actual values from EXPLAIN ANALYZE
    let startup_time = fields.take_f64("Actual Startup Time")?;
    let total_time = fields.take_f64("Actual Total Time")?;
    let actual_rows = fields.take_u64("Actual Rows")?;
    let actual_loops = fields.take_u64("Actual Loops")?;
    if actual_rows.is_some() || actual_loops.is_some() || total_time.is_some() {
        let loops = actual_loops.unwrap_or(1);
        node.actual = Some(if loops == 0 {
            ActualStats::never_executed()
        } else {
            ActualStats {
                startup_time,
                total_time,
                rows: actual_rows.unwrap_or(0),
                loops,
            }
        });
    }

    node.buffers = take_buffers(&mut fields)?;

    // Filter information
    node.filter = fields.take_str("Filter");
    node.rows_removed_by_filter = fields.take_u64("Rows Removed by Filter")?;
    node.output = fields.take_str_list("Output");

    take_details(&mut node.details, &mut fields)?;

    // Parse child plans
    if let Some(plans) = fields.take("Plans") {
        let plans = plans
            .as_array()
            .ok_or_else(|| AnalyzerError::malformed("\"Plans\" is not an array"))?;
        for child_value in plans {
            let child = parse_plan_node(child_value, next_id)?;
            node.children.push(child);
        }
    }

    // Store any extra properties we haven't explicitly handled
    node.extra = fields.into_remaining();

    Ok(node)
}

/// Fills the operator-specific payload chosen by the node type
fn take_details(details: &mut NodeDetails, fields: &mut Fields) -> Result<()> {
    match details {
        NodeDetails::Scan(scan) => {
            scan.index_name = fields.take_str("Index Name");
            scan.index_cond = fields.take_str("Index Cond");
            scan.recheck_cond = fields.take_str("Recheck Cond");
            scan.rows_removed_by_index_recheck = fields.take_u64("Rows Removed by Index Recheck")?;
            scan.heap_fetches = fields.take_u64("Heap Fetches")?;
            scan.scan_direction = fields.take_str("Scan Direction");
        }
        NodeDetails::Join(join) => {
            if let Some(join_type) = fields.peek_str("Join Type").and_then(JoinType::parse) {
                join.join_type = join_type;
                fields.take("Join Type");
            }
            join.condition = fields
                .take_str("Hash Cond")
                .or_else(|| fields.take_str("Merge Cond"));
            join.join_filter = fields.take_str("Join Filter");
            join.rows_removed_by_join_filter = fields.take_u64("Rows Removed by Join Filter")?;
        }
        NodeDetails::Sort(sort) => {
            sort.sort_keys = fields.take_str_list("Sort Key");
            sort.presorted_keys = fields.take_str_list("Presorted Key");
            sort.sort_method = fields.take_str("Sort Method");
            sort.space_used_kb = fields.take_u64("Sort Space Used")?;
            if let Some(space_type) = fields.peek_str("Sort Space Type").and_then(SortSpaceType::parse)
            {
                sort.space_type = Some(space_type);
                fields.take("Sort Space Type");
            }
        }
        NodeDetails::Aggregate(agg) => {
            agg.strategy = fields.take_str("Strategy");
            agg.partial_mode = fields.take_str("Partial Mode");
            agg.group_keys = fields.take_str_list("Group Key");
        }
        NodeDetails::Hash(hash) => {
            hash.buckets = fields.take_u64("Hash Buckets")?;
            hash.original_buckets = fields.take_u64("Original Hash Buckets")?;
            hash.batches = fields.take_u64("Hash Batches")?;
            hash.original_batches = fields.take_u64("Original Hash Batches")?;
            hash.peak_memory_kb = fields.take_u64("Peak Memory Usage")?;
        }
        NodeDetails::None => {}
    }
    Ok(())
}

fn take_buffers(fields: &mut Fields) -> Result<Option<BufferStats>> {
    let mut buffers = BufferStats::default();
    let mut seen = false;
    let counters: [(&str, &mut u64); 10] = [
        ("Shared Hit Blocks", &mut buffers.shared_hit),
        ("Shared Read Blocks", &mut buffers.shared_read),
        ("Shared Dirtied Blocks", &mut buffers.shared_dirtied),
        ("Shared Written Blocks", &mut buffers.shared_written),
        ("Local Hit Blocks", &mut buffers.local_hit),
        ("Local Read Blocks", &mut buffers.local_read),
        ("Local Dirtied Blocks", &mut buffers.local_dirtied),
        ("Local Written Blocks", &mut buffers.local_written),
        ("Temp Read Blocks", &mut buffers.temp_read),
        ("Temp Written Blocks", &mut buffers.temp_written),
    ];
    for (key, slot) in counters {
        if let Some(count) = fields.take_u64(key)? {
            *slot = count;
            seen = true;
        }
    }
    Ok(seen.then_some(buffers))
}

/// The keys of one JSON object that have not been consumed yet
///
/// Whatever is left after all known keys are taken becomes `PlanNode::extra`.
struct Fields {
    map: Map<String, Value>,
}

impl Fields {
    fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    fn peek_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Takes a string value; values of another type are left for `extra`
    fn take_str(&mut self, key: &str) -> Option<String> {
        let value = self.peek_str(key)?.to_string();
        self.map.remove(key);
        Some(value)
    }

    fn take_bool(&mut self, key: &str) -> Option<bool> {
        let value = self.map.get(key).and_then(Value::as_bool)?;
        self.map.remove(key);
        Some(value)
    }

    fn take_str_list(&mut self, key: &str) -> Vec<String> {
        let Some(items) = self.map.get(key).and_then(Value::as_array) else {
            return Vec::new();
        };
        let list = items
            .iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect();
        self.map.remove(key);
        list
    }

    /// Takes a non-negative number; numeric strings are accepted
    fn take_f64(&mut self, key: &str) -> Result<Option<f64>> {
        let number = match self.map.remove(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match number {
            Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
            Some(n) if n.is_finite() => Err(AnalyzerError::malformed(format!(
                "\"{}\" must not be negative (got {})",
                key, n
            ))),
            _ => Err(AnalyzerError::malformed(format!(
                "\"{}\" is not a number",
                key
            ))),
        }
    }

    /// Takes a count; fractional per-loop averages are rounded
    fn take_u64(&mut self, key: &str) -> Result<Option<u64>> {
        Ok(self.take_f64(key)?.map(|n| n.round() as u64))
    }

    fn into_remaining(self) -> std::collections::BTreeMap<String, Value> {
        self.map.into_iter().collect()
    }
}
