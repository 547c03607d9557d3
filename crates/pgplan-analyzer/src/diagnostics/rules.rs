//! Recommendation rules
//!
//! Each rule inspects the annotated tree (and the summary) and emits zero or
//! more [`Recommendation`]s. Rules run in the order of [`default_rules`] and
//! never see each other's output.

use crate::diagnostics::config::AnalyzerConfig;
use crate::diagnostics::metrics::{AnnotatedNode, NodeWarning};
use crate::diagnostics::recommendation::{Recommendation, RuleId, Severity};
use crate::diagnostics::sql;
use crate::diagnostics::summary::PlanSummary;
use crate::error::{AnalyzerError, Result};
use crate::explain::{NodeType, PlanNode, PreOrder, SortSpaceType};
use crate::localized::LocalizedText;
use std::collections::BTreeSet;

/// Number of Seq Scans in one plan that triggers the plan-level finding
const MULTIPLE_SEQ_SCANS_MIN: usize = 3;

/// Time share at which a finding is escalated one severity level
const DOMINANT_PCT: f64 = 50.0;

/// Everything a rule may read
pub struct RuleContext<'a> {
    pub root: &'a AnnotatedNode,
    pub summary: &'a PlanSummary,
    pub config: &'a AnalyzerConfig,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        root: &'a AnnotatedNode,
        summary: &'a PlanSummary,
        config: &'a AnalyzerConfig,
    ) -> Self {
        Self {
            root,
            summary,
            config,
        }
    }

    /// All annotated nodes in pre-order
    pub fn nodes(&self) -> PreOrder<'a, AnnotatedNode> {
        self.root.iter()
    }
}

/// A single diagnostic check
pub trait Rule: Send + Sync {
    fn id(&self) -> RuleId;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation>;
}

/// The built-in rules, in evaluation order
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(SeqScanLargeTable),
        Box::new(RowMisestimate),
        Box::new(SortSpilledToDisk),
        Box::new(NestedLoopRescans),
        Box::new(HashSpilledToDisk),
        Box::new(InefficientFilter),
        Box::new(BottleneckOperator),
        Box::new(MultipleSeqScans),
    ]
}

/// Runs `rules` in order, drops duplicate `(node, rule)` findings and sorts
/// the result most-severe-first
#[tracing::instrument(skip_all, fields(rules = rules.len()))]
pub fn evaluate_rules(
    rules: &[Box<dyn Rule>],
    ctx: &RuleContext<'_>,
) -> Result<Vec<Recommendation>> {
    let mut seen = BTreeSet::new();
    let mut recommendations = Vec::new();

    for rule in rules {
        let id = rule.id();
        for recommendation in rule.evaluate(ctx) {
            if recommendation.rule != id {
                return Err(AnalyzerError::Internal(format!(
                    "rule {} produced a recommendation tagged {}",
                    id, recommendation.rule
                )));
            }
            if seen.insert((recommendation.node_id, recommendation.rule)) {
                recommendations.push(recommendation);
            } else {
                tracing::debug!(id = %recommendation.id, "dropping duplicate recommendation");
            }
        }
    }

    recommendations.sort_by_key(Recommendation::sort_key);
    tracing::debug!(count = recommendations.len(), "rules evaluated");
    Ok(recommendations)
}

/// The node itself when it names a relation, else the nearest scan below it
fn relation_of(node: &AnnotatedNode) -> Option<&PlanNode> {
    if node.node.relation_name.is_some() {
        return Some(&node.node);
    }
    node.iter()
        .skip(1)
        .find(|n| n.node.is_scan() && n.node.relation_name.is_some())
        .map(|n| &n.node)
}

fn share_suffix(pct: Option<f64>) -> (String, String) {
    match pct {
        Some(pct) => (
            format!(", {:.1}% of execution time", pct),
            format!("，占执行时间的 {:.1}%", pct),
        ),
        None => (String::new(), String::new()),
    }
}

fn index_sql_for(node: &AnnotatedNode) -> Option<String> {
    let target = relation_of(node)?;
    let filter = node.node.filter.as_deref()?;
    sql::create_index_sql(
        target.relation_name.as_deref()?,
        target.schema.as_deref(),
        &sql::extract_filter_columns(filter),
    )
}

fn analyze_sql_for(target: &PlanNode) -> Option<String> {
    Some(sql::analyze_sql(
        target.relation_name.as_deref()?,
        target.schema.as_deref(),
    ))
}

/// Seq Scan over a large table
pub struct SeqScanLargeTable;

impl Rule for SeqScanLargeTable {
    fn id(&self) -> RuleId {
        RuleId::SeqScanLargeTable
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.has_warning(NodeWarning::LargeSeqScan))
            .map(|n| {
                let rows = n.metrics.rows_examined;
                let pct = n.metrics.time_percentage;
                let severity = if rows >= ctx.config.critical_table_rows
                    || pct.is_some_and(|p| p >= DOMINANT_PCT)
                {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let table = n
                    .node
                    .qualified_relation()
                    .unwrap_or_else(|| "the table".to_string());
                let (share_en, share_zh) = share_suffix(pct);
                let index_sql = index_sql_for(n);

                let filter_columns = n.node.filter.as_deref().map(sql::extract_filter_columns);
                let suggestion = match filter_columns {
                    Some(cols) if !cols.is_empty() && index_sql.is_some() => LocalizedText::new(
                        format!(
                            "Create an index on {} ({}) so the filter can be answered by an index scan.",
                            table,
                            cols.join(", ")
                        ),
                        format!(
                            "在 {} 的 ({}) 上创建索引，使过滤条件可以通过索引扫描完成。",
                            table,
                            cols.join(", ")
                        ),
                    ),
                    _ => LocalizedText::new(
                        format!(
                            "Create an index on the columns used to filter or join {}, or restrict the query so it reads fewer rows.",
                            table
                        ),
                        format!(
                            "在用于过滤或连接 {} 的列上创建索引，或收紧查询条件以减少读取的行数。",
                            table
                        ),
                    ),
                };

                let rec = Recommendation::new(
                    self.id(),
                    severity,
                    Some(n.node.id),
                    LocalizedText::new(
                        "Sequential scan on a large table",
                        "大表上的顺序扫描",
                    ),
                    LocalizedText::new(
                        format!(
                            "Seq Scan on {} examined {} rows{}.",
                            table, rows, share_en
                        ),
                        format!(
                            "对 {} 的顺序扫描读取了 {} 行{}。",
                            table, rows, share_zh
                        ),
                    ),
                    LocalizedText::new(
                        "A sequential scan reads every row of the table, so its cost grows with the table size.",
                        "顺序扫描会读取表中的每一行，其开销随表的大小线性增长。",
                    ),
                    suggestion,
                );
                match index_sql {
                    Some(sql) => rec.with_sql(sql),
                    None => rec,
                }
            })
            .collect()
    }
}

/// Planner row estimate far from the actual row count
pub struct RowMisestimate;

impl Rule for RowMisestimate {
    fn id(&self) -> RuleId {
        RuleId::RowMisestimate
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.has_warning(NodeWarning::RowMisestimate))
            .filter_map(|n| {
                let ratio = n.metrics.rows_estimate_ratio?;
                let actual = n.node.actual?;
                let (direction_en, direction_zh, factor) = if ratio >= 1.0 {
                    ("underestimated", "低估", ratio)
                } else {
                    (
                        "overestimated",
                        "高估",
                        n.node.plan_rows.max(1) as f64 / actual.rows.max(1) as f64,
                    )
                };
                let relation = relation_of(n);

                let suggestion = match relation.and_then(PlanNode::qualified_relation) {
                    Some(qualified) => LocalizedText::new(
                        format!(
                            "Run ANALYZE on {} to refresh its statistics. If the estimate stays wrong, raise the statistics target of the filtered columns or create extended statistics for correlated columns.",
                            qualified
                        ),
                        format!(
                            "对 {} 执行 ANALYZE 以刷新统计信息。如果估算仍然不准，请提高相关列的统计目标，或为相关联的列创建扩展统计信息。",
                            qualified
                        ),
                    ),
                    None => LocalizedText::new(
                        "Run ANALYZE on the tables involved to refresh their statistics.",
                        "对相关表执行 ANALYZE 以刷新统计信息。",
                    ),
                };

                let rec = Recommendation::new(
                    self.id(),
                    Severity::Warning,
                    Some(n.node.id),
                    LocalizedText::new("Row estimate is far off", "行数估算严重偏差"),
                    LocalizedText::new(
                        format!(
                            "{} was estimated at {} rows but returned {} rows ({} by {:.1}x).",
                            n.node.node_type, n.node.plan_rows, actual.rows, direction_en, factor
                        ),
                        format!(
                            "{} 预估 {} 行，实际返回 {} 行（{} {:.1} 倍）。",
                            n.node.node_type, n.node.plan_rows, actual.rows, direction_zh, factor
                        ),
                    ),
                    LocalizedText::new(
                        "Stale or missing statistics make the planner pick join methods and scan types that suit a very different row count.",
                        "统计信息过期或缺失会导致优化器按错误的行数选择连接方式和扫描方式。",
                    ),
                    suggestion,
                );
                Some(match relation.and_then(analyze_sql_for) {
                    Some(sql) => rec.with_sql(sql),
                    None => rec,
                })
            })
            .collect()
    }
}

/// Sort that did not fit in work_mem
pub struct SortSpilledToDisk;

impl Rule for SortSpilledToDisk {
    fn id(&self) -> RuleId {
        RuleId::SortSpilledToDisk
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.has_warning(NodeWarning::SortSpilledToDisk))
            .filter_map(|n| {
                let sort = n.node.sort_details()?;
                let disk_kb = match sort.space_type {
                    Some(SortSpaceType::Disk) => sort.space_used_kb.unwrap_or(0),
                    _ => 0,
                };
                let method = sort.sort_method.as_deref().unwrap_or("external sort");
                let sort_columns = sql::sort_key_columns(&sort.sort_keys);
                let index_sql = relation_of(n).and_then(|target| {
                    sql::create_index_sql(
                        target.relation_name.as_deref()?,
                        target.schema.as_deref(),
                        &sort_columns,
                    )
                });
                let (index_en, index_zh) = match &index_sql {
                    Some(sql) => (
                        format!(
                            " Alternatively an index matching the sort order avoids the sort: {}",
                            sql
                        ),
                        format!(
                            " 或者创建与排序顺序一致的索引以避免排序：{}",
                            sql
                        ),
                    ),
                    None => (String::new(), String::new()),
                };

                Some(
                    Recommendation::new(
                        self.id(),
                        Severity::Warning,
                        Some(n.node.id),
                        LocalizedText::new("Sort spilled to disk", "排序溢出到磁盘"),
                        LocalizedText::new(
                            format!(
                                "{} used {} and wrote {} kB to disk.",
                                n.node.node_type, method, disk_kb
                            ),
                            format!(
                                "{} 使用了 {}，向磁盘写入 {} kB。",
                                n.node.node_type, method, disk_kb
                            ),
                        ),
                        LocalizedText::new(
                            "The rows to sort did not fit in work_mem, so PostgreSQL sorted them in temporary files.",
                            "待排序的数据超出了 work_mem，PostgreSQL 只能借助临时文件完成排序。",
                        ),
                        LocalizedText::new(
                            format!("Raise work_mem for this query.{}", index_en),
                            format!("为该查询调大 work_mem。{}", index_zh),
                        ),
                    )
                    .with_sql(sql::work_mem_sql(disk_kb)),
                )
            })
            .collect()
    }
}

/// Nested Loop that rescans its inner side many times
pub struct NestedLoopRescans;

impl NestedLoopRescans {
    /// Returns the number of inner-side loops when the join qualifies
    fn rescans(node: &AnnotatedNode, config: &AnalyzerConfig) -> Option<(u64, bool)> {
        if node.node.node_type != NodeType::NestedLoop {
            return None;
        }
        let [outer, inner, ..] = node.children.as_slice() else {
            return None;
        };
        match inner.node.actual {
            Some(actual) => {
                let inner_ms = inner.metrics.inclusive_time.unwrap_or(0.0);
                (actual.loops >= config.nested_loop_loops
                    && inner_ms >= config.nested_loop_min_inner_ms)
                    .then_some((actual.loops, true))
            }
            None => (outer.node.plan_rows >= config.nested_loop_loops
                && inner.node.total_cost >= config.nested_loop_min_inner_cost)
                .then_some((outer.node.plan_rows, false)),
        }
    }
}

impl Rule for NestedLoopRescans {
    fn id(&self) -> RuleId {
        RuleId::NestedLoopRescans
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter_map(|n| {
                let (loops, measured) = Self::rescans(n, ctx.config)?;
                let inner = n.children.get(1)?;
                let inner_scan = inner
                    .iter()
                    .find(|c| c.node.is_scan() && c.node.relation_name.is_some());
                let index_sql = inner_scan
                    .filter(|scan| scan.node.node_type == NodeType::SeqScan)
                    .and_then(index_sql_for);
                let target = inner_scan
                    .and_then(|scan| scan.node.qualified_relation())
                    .unwrap_or_else(|| inner.node.node_type.to_string());

                let (issue_en, issue_zh) = if measured {
                    (
                        format!(
                            "Nested Loop executed its inner side ({}) {} times, taking {:.2} ms in total.",
                            target,
                            loops,
                            inner.metrics.inclusive_time.unwrap_or(0.0)
                        ),
                        format!(
                            "Nested Loop 的内侧（{}）执行了 {} 次，累计耗时 {:.2} ms。",
                            target,
                            loops,
                            inner.metrics.inclusive_time.unwrap_or(0.0)
                        ),
                    )
                } else {
                    (
                        format!(
                            "Nested Loop is expected to execute its inner side ({}) about {} times.",
                            target, loops
                        ),
                        format!(
                            "Nested Loop 的内侧（{}）预计执行约 {} 次。",
                            target, loops
                        ),
                    )
                };

                let rec = Recommendation::new(
                    self.id(),
                    Severity::Warning,
                    Some(n.node.id),
                    LocalizedText::new(
                        "Nested Loop with many rescans",
                        "Nested Loop 内侧被反复扫描",
                    ),
                    LocalizedText::new(issue_en, issue_zh),
                    LocalizedText::new(
                        "A Nested Loop repeats its inner plan once per outer row. It is cheap for a few outer rows and very expensive for many.",
                        "Nested Loop 会为外侧的每一行执行一次内侧计划，外侧行数多时代价很高。",
                    ),
                    LocalizedText::new(
                        format!(
                            "Index the join column on {} so each rescan is an index lookup, or check the row estimates so the planner can pick a Hash Join.",
                            target
                        ),
                        format!(
                            "在 {} 的连接列上创建索引，使每次内侧扫描成为索引查找；或修正行数估算，让优化器选择 Hash Join。",
                            target
                        ),
                    ),
                );
                Some(match index_sql {
                    Some(sql) => rec.with_sql(sql),
                    None => rec,
                })
            })
            .collect()
    }
}

/// Hash table split into batches on disk
pub struct HashSpilledToDisk;

impl Rule for HashSpilledToDisk {
    fn id(&self) -> RuleId {
        RuleId::HashSpilledToDisk
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.has_warning(NodeWarning::HashSpilledToDisk))
            .filter_map(|n| {
                let hash = n.node.hash_details()?;
                let batches = hash.batches.unwrap_or(1);
                let peak_kb = hash.peak_memory_kb.unwrap_or(0);

                Some(
                    Recommendation::new(
                        self.id(),
                        Severity::Warning,
                        Some(n.node.id),
                        LocalizedText::new("Hash spilled to disk", "哈希表溢出到磁盘"),
                        LocalizedText::new(
                            format!(
                                "Hash used {} batches with a peak of {} kB per batch.",
                                batches, peak_kb
                            ),
                            format!(
                                "Hash 分成了 {} 个批次，每批峰值内存 {} kB。",
                                batches, peak_kb
                            ),
                        ),
                        LocalizedText::new(
                            "The hash table did not fit in work_mem, so both join inputs were partitioned into temporary files.",
                            "哈希表超出了 work_mem，连接两侧的数据都被分批写入临时文件。",
                        ),
                        LocalizedText::new(
                            "Raise work_mem so the hash table fits in a single batch, or reduce the rows on the hashed side.",
                            "调大 work_mem 使哈希表可以在单个批次内完成，或减少被哈希一侧的行数。",
                        ),
                    )
                    .with_sql(sql::work_mem_sql(peak_kb.saturating_mul(batches))),
                )
            })
            .collect()
    }
}

/// Filter that discards most of the rows it reads
pub struct InefficientFilter;

impl Rule for InefficientFilter {
    fn id(&self) -> RuleId {
        RuleId::InefficientFilter
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.has_warning(NodeWarning::FilterDiscardsMostRows))
            .filter_map(|n| {
                let actual = n.node.actual?;
                let removed = n.node.rows_removed_by_filter?.saturating_mul(actual.loops);
                let kept = actual.total_rows();
                let filter = n.node.filter.as_deref().unwrap_or("filter");
                let discarded_pct =
                    removed as f64 / removed.saturating_add(kept).max(1) as f64 * 100.0;

                let rec = Recommendation::new(
                    self.id(),
                    Severity::Info,
                    Some(n.node.id),
                    LocalizedText::new(
                        "Filter discards most rows",
                        "过滤条件丢弃了大部分行",
                    ),
                    LocalizedText::new(
                        format!(
                            "{} removed {} rows and kept {} ({:.1}% discarded) with {}.",
                            n.node.node_type, removed, kept, discarded_pct, filter
                        ),
                        format!(
                            "{} 通过 {} 过滤掉 {} 行，仅保留 {} 行（丢弃 {:.1}%）。",
                            n.node.node_type, filter, removed, kept, discarded_pct
                        ),
                    ),
                    LocalizedText::new(
                        "Rows are read and then thrown away. An index on the filtered columns lets PostgreSQL read only the matching rows.",
                        "这些行被读取后又被丢弃。在过滤列上建立索引可以让 PostgreSQL 只读取匹配的行。",
                    ),
                    LocalizedText::new(
                        "Index the filtered columns, or a partial index if the condition is always the same.",
                        "为过滤列创建索引；如果过滤条件固定，可以考虑部分索引。",
                    ),
                );
                Some(match index_sql_for(n) {
                    Some(sql) => rec.with_sql(sql),
                    None => rec,
                })
            })
            .collect()
    }
}

/// Operator holding a large share of the execution time
pub struct BottleneckOperator;

impl Rule for BottleneckOperator {
    fn id(&self) -> RuleId {
        RuleId::BottleneckOperator
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        ctx.nodes()
            .filter(|n| n.metrics.is_bottleneck)
            .filter_map(|n| {
                let pct = n.metrics.time_percentage?;
                let exclusive = n.metrics.exclusive_time.unwrap_or(0.0);
                let severity = if pct >= DOMINANT_PCT {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                let label = match n.node.qualified_relation() {
                    Some(rel) => format!("{} on {}", n.node.node_type, rel),
                    None => n.node.node_type.to_string(),
                };

                Some(Recommendation::new(
                    self.id(),
                    severity,
                    Some(n.node.id),
                    LocalizedText::new("Time-consuming operator", "耗时最多的操作"),
                    LocalizedText::new(
                        format!(
                            "{} spent {:.2} ms in itself, {:.1}% of execution time.",
                            label, exclusive, pct
                        ),
                        format!(
                            "{} 自身耗时 {:.2} ms，占执行时间的 {:.1}%。",
                            label, exclusive, pct
                        ),
                    ),
                    LocalizedText::new(
                        format!(
                            "Exclusive time leaves out child operators, so this is work done by the {} itself ({}).",
                            n.node.node_type,
                            n.node.node_type.description()
                        ),
                        format!(
                            "自身耗时不包含子节点的时间，这部分工作由 {} 本身完成。",
                            n.node.node_type
                        ),
                    ),
                    LocalizedText::new(
                        "Focus tuning on this operator first; the other findings for it explain what to change.",
                        "优先优化这个操作；针对它的其他建议说明了具体的调整方向。",
                    ),
                ))
            })
            .collect()
    }
}

/// Several Seq Scans in one plan
pub struct MultipleSeqScans;

impl Rule for MultipleSeqScans {
    fn id(&self) -> RuleId {
        RuleId::MultipleSeqScans
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Recommendation> {
        if !ctx.summary.has_seq_scans {
            return Vec::new();
        }
        let tables: Vec<String> = ctx
            .nodes()
            .filter(|n| n.node.node_type == NodeType::SeqScan)
            .map(|n| {
                n.node
                    .qualified_relation()
                    .unwrap_or_else(|| format!("#{}", n.node.id))
            })
            .collect();
        if tables.len() < MULTIPLE_SEQ_SCANS_MIN {
            return Vec::new();
        }

        vec![Recommendation::new(
            self.id(),
            Severity::Info,
            None,
            LocalizedText::new("Multiple sequential scans", "多个顺序扫描"),
            LocalizedText::new(
                format!(
                    "The plan contains {} sequential scans ({}).",
                    tables.len(),
                    tables.join(", ")
                ),
                format!(
                    "该计划包含 {} 个顺序扫描（{}）。",
                    tables.len(),
                    tables.join("、")
                ),
            ),
            LocalizedText::new(
                "Each sequential scan reads its whole table; several of them in one query multiply the I/O.",
                "每个顺序扫描都会读取整张表，一个查询中出现多个会成倍增加 I/O。",
            ),
            LocalizedText::new(
                "Check whether the join and filter columns of these tables are indexed.",
                "检查这些表的连接列和过滤列是否建立了索引。",
            ),
        )]
    }
}
