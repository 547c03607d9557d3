//! Tests for derived node metrics

use super::*;
use crate::explain::{ActualStats, HashDetails, NodeDetails, PlanFormat, SortDetails, SortSpaceType};
use pretty_assertions::assert_eq;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn annotate_default(plan: &QueryPlan) -> AnnotatedNode {
    annotate(plan, &AnalyzerConfig::default()).expect("annotate")
}

mod timing_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_node_percentage() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_relation("users")
            .with_cost(0.0, 35.5)
            .with_rows(1000)
            .with_actual(0.010, 2.345, 1000, 1);
        let plan = QueryPlan::new(root, PlanFormat::Text).with_execution_time(2.5);

        let annotated = annotate_default(&plan);

        assert!(approx(annotated.metrics.exclusive_time.unwrap_or_default(), 2.345));
        assert!(approx(annotated.metrics.time_percentage.unwrap_or_default(), 93.8));
        assert_eq!(annotated.metrics.rows_estimate_ratio, Some(1.0));
        assert!(annotated.metrics.is_bottleneck);
        assert!(annotated.metrics.has_warning(NodeWarning::LargeSeqScan));
    }

    #[test]
    fn test_exclusive_time_subtracts_loop_scaled_children() {
        // Nested Loop 10 ms; outer 2 ms once; inner 0.5 ms x 10 loops
        let outer = PlanNode::new(NodeType::SeqScan).with_actual(0.0, 2.0, 10, 1);
        let inner = PlanNode::new(NodeType::IndexScan).with_actual(0.0, 0.5, 1, 10);
        let root = PlanNode::new(NodeType::NestedLoop)
            .with_actual(0.0, 10.0, 10, 1)
            .with_child(outer)
            .with_child(inner)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(10.0);

        let annotated = annotate_default(&plan);

        assert_eq!(annotated.children[1].metrics.inclusive_time, Some(5.0));
        assert!(approx(annotated.metrics.exclusive_time.unwrap_or_default(), 3.0));

        let exclusive_sum: f64 = annotated
            .iter()
            .filter_map(|n| n.metrics.exclusive_time)
            .sum();
        assert!(approx(exclusive_sum, 10.0));
    }

    #[test]
    fn test_exclusive_time_never_negative() {
        // Rounded text output can report a child slower than its parent
        let child = PlanNode::new(NodeType::SeqScan).with_actual(0.0, 10.5, 100, 1);
        let root = PlanNode::new(NodeType::Limit)
            .with_actual(0.0, 10.0, 100, 1)
            .with_child(child)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(10.0);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics.exclusive_time, Some(0.0));
        assert_eq!(annotated.children[0].metrics.time_percentage, Some(100.0));
    }

    #[test]
    fn test_parallel_workers_are_not_summed() {
        // Leader plus two workers each spend 8 ms scanning
        let child = PlanNode::new(NodeType::SeqScan).with_actual(0.0, 8.0, 100, 3);
        let root = PlanNode::new(NodeType::Gather)
            .with_actual(0.0, 10.0, 300, 1)
            .with_child(child)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(10.0);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.children[0].metrics.inclusive_time, Some(8.0));
        assert!(approx(annotated.metrics.exclusive_time.unwrap_or_default(), 2.0));
        assert!(approx(annotated.children[0].metrics.time_percentage.unwrap_or_default(), 80.0));
    }

    #[test]
    fn test_rescans_inside_a_worker_still_scale() {
        // Each of 2 participants runs the inner index scan 50 times
        let outer = PlanNode::new(NodeType::SeqScan).with_actual(0.0, 1.0, 50, 2);
        let inner = PlanNode::new(NodeType::IndexScan).with_actual(0.0, 0.1, 1, 100);
        let join = PlanNode::new(NodeType::NestedLoop)
            .with_actual(0.0, 7.0, 50, 2)
            .with_child(outer)
            .with_child(inner);
        let root = PlanNode::new(NodeType::Gather)
            .with_actual(0.0, 8.0, 100, 1)
            .with_child(join)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(8.0);

        let annotated = annotate_default(&plan);
        let join = &annotated.children[0];
        assert_eq!(join.metrics.inclusive_time, Some(7.0));
        assert!(approx(join.children[1].metrics.inclusive_time.unwrap_or_default(), 5.0));
        assert!(approx(join.metrics.exclusive_time.unwrap_or_default(), 1.0));

        let exclusive_sum: f64 = annotated
            .iter()
            .filter_map(|n| n.metrics.exclusive_time)
            .sum();
        assert!(approx(exclusive_sum, 8.0));
    }

    #[test]
    fn test_no_execution_time_means_no_percentage() {
        let root = PlanNode::new(NodeType::Result).with_actual(0.0, 1.0, 1, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics.exclusive_time, Some(1.0));
        assert_eq!(annotated.metrics.time_percentage, None);
        assert!(!annotated.metrics.is_bottleneck);
    }

    #[test]
    fn test_plain_explain_has_no_timing() {
        let root = PlanNode::new(NodeType::SeqScan).with_rows(10);
        let plan = QueryPlan::new(root, PlanFormat::Text);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics, NodeMetrics {
            rows_examined: 10,
            ..Default::default()
        });
    }

    #[test]
    fn test_passthrough_node_is_not_bottleneck() {
        let mut config = AnalyzerConfig::default();
        config.bottleneck_pct = 1.0;

        let child = PlanNode::new(NodeType::SeqScan).with_actual(0.0, 9.8, 100, 1);
        let root = PlanNode::new(NodeType::Limit)
            .with_actual(0.0, 10.0, 100, 1)
            .with_child(child)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(10.0);

        let annotated = annotate(&plan, &config).expect("annotate");
        assert!(!annotated.metrics.is_bottleneck);
        assert!(annotated.children[0].metrics.is_bottleneck);
    }
}

mod warning_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_row_misestimate() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_rows(10)
            .with_actual(0.0, 1.0, 100_000, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics.rows_estimate_ratio, Some(10_000.0));
        assert!(annotated.metrics.has_warning(NodeWarning::RowMisestimate));
    }

    #[test]
    fn test_small_misestimate_is_ignored() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_rows(1)
            .with_actual(0.0, 1.0, 50, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let annotated = annotate_default(&plan);
        assert!(!annotated.metrics.has_warning(NodeWarning::RowMisestimate));
    }

    #[test]
    fn test_zero_planned_rows_does_not_divide_by_zero() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_rows(0)
            .with_actual(0.0, 1.0, 500, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics.rows_estimate_ratio, Some(500.0));
    }

    #[test]
    fn test_small_seq_scan_is_not_flagged() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_rows(999)
            .with_actual(0.0, 1.0, 999, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(1.0);

        let annotated = annotate_default(&plan);
        assert!(!annotated.metrics.has_warning(NodeWarning::LargeSeqScan));
    }

    #[test]
    fn test_filtered_rows_count_as_examined() {
        let mut root = PlanNode::new(NodeType::SeqScan)
            .with_rows(10)
            .with_actual(0.0, 30.0, 10, 1)
            .with_filter("(status = 'x')");
        root.rows_removed_by_filter = Some(99_990);
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(30.0);

        let annotated = annotate_default(&plan);
        assert_eq!(annotated.metrics.rows_examined, 100_000);
        assert!(annotated.metrics.has_warning(NodeWarning::LargeSeqScan));
        assert!(
            annotated
                .metrics
                .has_warning(NodeWarning::FilterDiscardsMostRows)
        );
    }

    #[test]
    fn test_spills_loops_and_never_executed() {
        let sort = PlanNode::new(NodeType::Sort)
            .with_actual(0.0, 5.0, 10, 1)
            .with_details(NodeDetails::Sort(SortDetails {
                sort_method: Some("external merge".to_string()),
                space_type: Some(SortSpaceType::Disk),
                space_used_kb: Some(2048),
                ..Default::default()
            }));
        let hash = PlanNode::new(NodeType::Hash)
            .with_actual(0.0, 1.0, 10, 1)
            .with_details(NodeDetails::Hash(HashDetails {
                batches: Some(8),
                ..Default::default()
            }));
        let looped = PlanNode::new(NodeType::IndexScan).with_actual(0.0, 0.001, 1, 5_000);
        let mut skipped = PlanNode::new(NodeType::IndexScan);
        skipped.actual = Some(ActualStats::never_executed());

        let root = PlanNode::new(NodeType::Append)
            .with_actual(0.0, 20.0, 30, 1)
            .with_child(sort)
            .with_child(hash)
            .with_child(looped)
            .with_child(skipped)
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(20.0);

        let annotated = annotate_default(&plan);
        let warnings: Vec<_> = annotated
            .children
            .iter()
            .map(|c| c.metrics.warnings.clone())
            .collect();

        assert!(warnings[0].contains(&NodeWarning::SortSpilledToDisk));
        assert!(warnings[1].contains(&NodeWarning::HashSpilledToDisk));
        assert!(warnings[2].contains(&NodeWarning::ManyLoops));
        assert_eq!(warnings[3], vec![NodeWarning::NeverExecuted]);
        assert_eq!(annotated.children[3].metrics.exclusive_time, Some(0.0));
    }
}

mod shape_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_annotation_preserves_shape_and_ids() {
        let root = PlanNode::new(NodeType::HashJoin)
            .with_child(PlanNode::new(NodeType::SeqScan).with_relation("a"))
            .with_child(
                PlanNode::new(NodeType::Hash)
                    .with_child(PlanNode::new(NodeType::SeqScan).with_relation("b")),
            )
            .numbered();
        let plan = QueryPlan::new(root, PlanFormat::Json);

        let annotated = annotate_default(&plan);
        let ids: Vec<_> = annotated.iter().map(|n| n.node.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(annotated.iter().all(|n| n.node.children.is_empty()));
        assert_eq!(annotated.children[1].children.len(), 1);
    }

    #[test]
    fn test_serialized_node_is_flat() {
        let root = PlanNode::new(NodeType::SeqScan)
            .with_relation("users")
            .with_actual(0.0, 2.0, 5, 1);
        let plan = QueryPlan::new(root, PlanFormat::Json).with_execution_time(2.0);

        let json = serde_json::to_value(annotate_default(&plan)).expect("serialize");
        assert_eq!(json["nodeType"], "Seq Scan");
        assert_eq!(json["exclusiveTime"], 2.0);
        assert_eq!(json["timePercentage"], 100.0);
        assert_eq!(json["isBottleneck"], true);
        assert_eq!(json["children"], serde_json::json!([]));
    }
}
