//! Tests for the Query Plan Model

use super::*;
use pretty_assertions::assert_eq;

fn join_tree() -> PlanNode {
    //       HashJoin
    //      /        \
    //   SeqScan     Hash
    //                |
    //            IndexScan
    let outer = PlanNode::new(NodeType::SeqScan).with_relation("users");
    let inner = PlanNode::new(NodeType::Hash)
        .with_child(PlanNode::new(NodeType::IndexScan).with_relation("orders"));
    PlanNode::new(NodeType::HashJoin)
        .with_child(outer)
        .with_child(inner)
        .numbered()
}

#[test]
fn test_query_plan_creation() {
    let root = PlanNode::new(NodeType::SeqScan)
        .with_relation("users")
        .with_cost(0.0, 100.0)
        .with_rows(1000);

    let plan = QueryPlan::new(root, PlanFormat::Json);

    assert_eq!(plan.total_cost(), 100.0);
    assert_eq!(plan.root.plan_rows, 1000);
    assert!(plan.planning_time.is_none());
    assert!(plan.execution_time.is_none());
    assert!(!plan.is_analyzed());
}

#[test]
fn test_query_plan_with_timing() {
    let root = PlanNode::new(NodeType::SeqScan).with_actual(0.01, 2.1, 1000, 1);
    let plan = QueryPlan::new(root, PlanFormat::Text)
        .with_planning_time(1.5)
        .with_execution_time(25.3);

    assert_eq!(plan.planning_time, Some(1.5));
    assert_eq!(plan.execution_time, Some(25.3));
    assert!(plan.is_analyzed());
}

#[test]
fn test_plan_node_builder() {
    let node = PlanNode::new(NodeType::IndexScan)
        .with_relation("orders")
        .with_cost(0.42, 8.44)
        .with_rows(1)
        .with_width(36)
        .with_filter("status = 'active'");

    assert_eq!(node.node_type, NodeType::IndexScan);
    assert_eq!(node.relation_name, Some("orders".to_string()));
    assert_eq!(node.startup_cost, 0.42);
    assert_eq!(node.total_cost, 8.44);
    assert_eq!(node.plan_rows, 1);
    assert_eq!(node.plan_width, 36);
    assert_eq!(node.filter, Some("status = 'active'".to_string()));
    assert!(node.scan_details().is_some());
}

#[test]
fn test_plan_node_tree_traversal() {
    let plan = QueryPlan::new(join_tree(), PlanFormat::Json);

    let nodes: Vec<_> = plan.iter_nodes().collect();
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[0].node_type, NodeType::HashJoin);
    assert_eq!(nodes[1].node_type, NodeType::SeqScan);
    assert_eq!(nodes[2].node_type, NodeType::Hash);
    assert_eq!(nodes[3].node_type, NodeType::IndexScan);

    let ids: Vec<_> = nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

#[test]
fn test_plan_node_count_and_depth() {
    let single = PlanNode::new(NodeType::Result);
    assert_eq!(single.node_count(), 1);
    assert_eq!(single.depth(), 1);
    assert!(single.is_leaf());

    let tree = join_tree();
    assert_eq!(tree.node_count(), 4);
    assert_eq!(tree.depth(), 3);
    assert!(!tree.is_leaf());
}

#[test]
fn test_find_nodes() {
    let plan = QueryPlan::new(join_tree(), PlanFormat::Json);

    let scans = plan.find_nodes_by_type(&NodeType::SeqScan);
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].relation_name.as_deref(), Some("users"));

    let found = plan.find_node(3).map(|n| n.node_type.clone());
    assert_eq!(found, Some(NodeType::IndexScan));
    assert!(plan.find_node(4).is_none());
    assert!(plan.has_sequential_scans());
}

#[test]
fn test_node_type_round_trips_postgres_names() {
    for name in [
        "Seq Scan",
        "Index Only Scan",
        "Bitmap Heap Scan",
        "Nested Loop",
        "Hash Join",
        "HashAggregate",
        "Incremental Sort",
        "Gather Merge",
        "Memoize",
        "ModifyTable",
    ] {
        assert_eq!(NodeType::from_postgres_str(name).as_postgres_str(), name);
    }
}

#[test]
fn test_node_type_other_is_preserved() {
    let node_type = NodeType::from_postgres_str("Some Future Node");
    assert_eq!(node_type, NodeType::Other("Some Future Node".to_string()));
    assert_eq!(node_type.to_string(), "Some Future Node");
    assert_eq!(node_type.description(), "Unrecognized operation");
}

#[test]
fn test_node_type_classification() {
    assert!(NodeType::SeqScan.is_scan());
    assert!(NodeType::CteScan.is_scan());
    assert!(!NodeType::Hash.is_scan());
    assert!(NodeType::MergeJoin.is_join());
    assert!(NodeType::BitmapHeapScan.uses_index());
    assert!(!NodeType::SeqScan.uses_index());
    assert!(NodeType::SeqScan.is_potentially_slow());
}

#[test]
fn test_node_type_serializes_as_display_name() {
    let json = serde_json::to_value(NodeType::IndexOnlyScan).expect("serialize");
    assert_eq!(json, serde_json::json!("Index Only Scan"));

    let back: NodeType = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, NodeType::IndexOnlyScan);
}

#[test]
fn test_details_follow_node_type() {
    assert!(matches!(
        NodeDetails::for_node_type(&NodeType::NestedLoop),
        NodeDetails::Join(_)
    ));
    assert!(matches!(
        NodeDetails::for_node_type(&NodeType::IncrementalSort),
        NodeDetails::Sort(_)
    ));
    assert!(matches!(
        NodeDetails::for_node_type(&NodeType::WindowAgg),
        NodeDetails::Aggregate(_)
    ));
    assert!(matches!(
        NodeDetails::for_node_type(&NodeType::Hash),
        NodeDetails::Hash(_)
    ));
    assert!(NodeDetails::for_node_type(&NodeType::Limit).is_none());
}

#[test]
fn test_join_type_parse() {
    assert_eq!(JoinType::parse("Inner"), Some(JoinType::Inner));
    assert_eq!(JoinType::parse("left"), Some(JoinType::Left));
    assert_eq!(JoinType::parse("Right Anti"), Some(JoinType::RightAnti));
    assert_eq!(JoinType::parse("sideways"), None);
    assert_eq!(JoinType::RightSemi.as_postgres_str(), "Right Semi");
}

#[test]
fn test_actual_stats_loop_scaling() {
    let stats = ActualStats {
        startup_time: Some(0.01),
        total_time: Some(0.5),
        rows: 3,
        loops: 4,
    };
    assert_eq!(stats.inclusive_time(), Some(2.0));
    assert_eq!(stats.total_rows(), 12);
    assert!(stats.was_executed());

    let never = ActualStats::never_executed();
    assert!(!never.was_executed());
    assert_eq!(never.inclusive_time(), None);
}

#[test]
fn test_sort_and_hash_spill_detection() {
    let in_memory = SortDetails {
        sort_method: Some("quicksort".to_string()),
        space_type: Some(SortSpaceType::Memory),
        ..Default::default()
    };
    assert!(!in_memory.spilled_to_disk());

    let external = SortDetails {
        sort_method: Some("external merge".to_string()),
        ..Default::default()
    };
    assert!(external.spilled_to_disk());

    let batched = HashDetails {
        batches: Some(4),
        ..Default::default()
    };
    assert!(batched.spilled_to_disk());
    assert!(!HashDetails::default().spilled_to_disk());
}

#[test]
fn test_buffer_hit_ratio() {
    let buffers = BufferStats {
        shared_hit: 90,
        shared_read: 10,
        ..Default::default()
    };
    assert_eq!(buffers.shared_hit_ratio(), Some(0.9));
    assert_eq!(BufferStats::default().shared_hit_ratio(), None);
}

#[test]
fn test_qualified_relation() {
    let mut node = PlanNode::new(NodeType::SeqScan).with_relation("orders");
    assert_eq!(node.qualified_relation(), Some("orders".to_string()));

    node.schema = Some("sales".to_string());
    assert_eq!(node.qualified_relation(), Some("sales.orders".to_string()));
}

#[test]
fn test_plan_node_serialization_is_camel_case() {
    let node = PlanNode::new(NodeType::SeqScan)
        .with_relation("users")
        .with_cost(0.0, 10.0)
        .with_rows(5)
        .with_actual(0.1, 0.2, 5, 1);

    let json = serde_json::to_value(&node).expect("serialize");
    assert_eq!(json["nodeType"], "Seq Scan");
    assert_eq!(json["relationName"], "users");
    assert_eq!(json["actualTotalTime"], 0.2);
    assert_eq!(json["actualLoops"], 1);
    assert_eq!(json["details"]["kind"], "scan");
    assert!(json.get("children").is_none());
}
