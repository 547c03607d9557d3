//! Renders a parsed plan back into PostgreSQL `FORMAT JSON` shape
//!
//! Text plans converted this way can be fed to any tool that understands
//! `EXPLAIN (FORMAT JSON)`, and parsing the rendered document yields the same
//! tree.

use crate::explain::plan::{NodeDetails, NodeType, PlanNode, QueryPlan};
use serde_json::{Map, Value, json};

/// Renders the whole plan as the one-element array PostgreSQL prints
pub fn render_explain_json(plan: &QueryPlan) -> Value {
    let mut entry = Map::new();
    entry.insert("Plan".to_string(), render_node(&plan.root));
    if let Some(ms) = plan.planning_time {
        entry.insert("Planning Time".to_string(), json!(ms));
    }
    if let Some(ms) = plan.execution_time {
        entry.insert("Execution Time".to_string(), json!(ms));
    }
    Value::Array(vec![Value::Object(entry)])
}

fn render_node(node: &PlanNode) -> Value {
    // Unmodeled keys first so modeled fields always win
    let mut obj: Map<String, Value> = node
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let node_type = match node.node_type {
        NodeType::GroupAggregate | NodeType::HashAggregate | NodeType::MixedAggregate => {
            "Aggregate"
        }
        ref other => other.as_postgres_str(),
    };
    obj.insert("Node Type".into(), json!(node_type));

    put_str(&mut obj, "Parent Relationship", &node.parent_relationship);
    put_str(&mut obj, "Subplan Name", &node.subplan_name);
    obj.insert("Parallel Aware".into(), json!(node.parallel_aware));
    put_str(&mut obj, "Relation Name", &node.relation_name);
    put_str(&mut obj, "Schema", &node.schema);
    put_str(&mut obj, "Alias", &node.alias);

    obj.insert("Startup Cost".into(), json!(node.startup_cost));
    obj.insert("Total Cost".into(), json!(node.total_cost));
    obj.insert("Plan Rows".into(), json!(node.plan_rows));
    obj.insert("Plan Width".into(), json!(node.plan_width));

    if let Some(actual) = &node.actual {
        if let Some(ms) = actual.startup_time {
            obj.insert("Actual Startup Time".into(), json!(ms));
        }
        if let Some(ms) = actual.total_time {
            obj.insert("Actual Total Time".into(), json!(ms));
        }
        obj.insert("Actual Rows".into(), json!(actual.rows));
        obj.insert("Actual Loops".into(), json!(actual.loops));
    }

    if !node.output.is_empty() {
        obj.insert("Output".into(), json!(node.output));
    }
    put_str(&mut obj, "Filter", &node.filter);
    put_u64(&mut obj, "Rows Removed by Filter", node.rows_removed_by_filter);

    render_details(&mut obj, node);

    if let Some(buffers) = &node.buffers {
        let counters = [
            ("Shared Hit Blocks", buffers.shared_hit),
            ("Shared Read Blocks", buffers.shared_read),
            ("Shared Dirtied Blocks", buffers.shared_dirtied),
            ("Shared Written Blocks", buffers.shared_written),
            ("Local Hit Blocks", buffers.local_hit),
            ("Local Read Blocks", buffers.local_read),
            ("Local Dirtied Blocks", buffers.local_dirtied),
            ("Local Written Blocks", buffers.local_written),
            ("Temp Read Blocks", buffers.temp_read),
            ("Temp Written Blocks", buffers.temp_written),
        ];
        for (key, count) in counters {
            obj.insert(key.into(), json!(count));
        }
    }

    if !node.children.is_empty() {
        let plans = node.children.iter().map(render_node).collect();
        obj.insert("Plans".into(), Value::Array(plans));
    }

    Value::Object(obj)
}

fn render_details(obj: &mut Map<String, Value>, node: &PlanNode) {
    match &node.details {
        NodeDetails::Scan(scan) => {
            put_str(obj, "Scan Direction", &scan.scan_direction);
            put_str(obj, "Index Name", &scan.index_name);
            put_str(obj, "Index Cond", &scan.index_cond);
            put_str(obj, "Recheck Cond", &scan.recheck_cond);
            put_u64(
                obj,
                "Rows Removed by Index Recheck",
                scan.rows_removed_by_index_recheck,
            );
            put_u64(obj, "Heap Fetches", scan.heap_fetches);
        }
        NodeDetails::Join(join) => {
            obj.insert("Join Type".into(), json!(join.join_type.as_postgres_str()));
            let cond_key = match node.node_type {
                NodeType::MergeJoin => "Merge Cond",
                _ => "Hash Cond",
            };
            put_str(obj, cond_key, &join.condition);
            put_str(obj, "Join Filter", &join.join_filter);
            put_u64(
                obj,
                "Rows Removed by Join Filter",
                join.rows_removed_by_join_filter,
            );
        }
        NodeDetails::Sort(sort) => {
            if !sort.sort_keys.is_empty() {
                obj.insert("Sort Key".into(), json!(sort.sort_keys));
            }
            if !sort.presorted_keys.is_empty() {
                obj.insert("Presorted Key".into(), json!(sort.presorted_keys));
            }
            put_str(obj, "Sort Method", &sort.sort_method);
            put_u64(obj, "Sort Space Used", sort.space_used_kb);
            if let Some(space) = sort.space_type {
                obj.insert("Sort Space Type".into(), json!(space.as_postgres_str()));
            }
        }
        NodeDetails::Aggregate(agg) => {
            let strategy = agg.strategy.clone().or_else(|| {
                let derived = match node.node_type {
                    NodeType::Aggregate => "Plain",
                    NodeType::GroupAggregate => "Sorted",
                    NodeType::HashAggregate => "Hashed",
                    NodeType::MixedAggregate => "Mixed",
                    _ => return None,
                };
                Some(derived.to_string())
            });
            put_str(obj, "Strategy", &strategy);
            put_str(obj, "Partial Mode", &agg.partial_mode);
            if !agg.group_keys.is_empty() {
                obj.insert("Group Key".into(), json!(agg.group_keys));
            }
        }
        NodeDetails::Hash(hash) => {
            put_u64(obj, "Hash Buckets", hash.buckets);
            put_u64(obj, "Original Hash Buckets", hash.original_buckets);
            put_u64(obj, "Hash Batches", hash.batches);
            put_u64(obj, "Original Hash Batches", hash.original_batches);
            put_u64(obj, "Peak Memory Usage", hash.peak_memory_kb);
        }
        NodeDetails::None => {}
    }
}

fn put_str(obj: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), json!(value));
    }
}

fn put_u64(obj: &mut Map<String, Value>, key: &str, value: Option<u64>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), json!(value));
    }
}
