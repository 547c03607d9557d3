//! Human-readable report output

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use pgplan_analyzer::{AnalysisReport, AnnotatedNode, Language, PlanSummary, Recommendation};
use std::fmt::Write;

fn label(language: Language, en: &'static str, zh: &'static str) -> &'static str {
    match language {
        Language::En => en,
        Language::Zh => zh,
    }
}

fn ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3} ms", v))
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v))
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Renders a full report for the terminal
pub fn render_report(report: &AnalysisReport, language: Language) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", label(language, "Summary", "概要"));
    let _ = writeln!(out, "{}", summary_table(&report.summary, language));

    if report.summary.analyzed && !report.summary.top_operations.is_empty() {
        let _ = writeln!(out, "\n{}", label(language, "Top operations", "耗时最多的操作"));
        let _ = writeln!(out, "{}", operations_table(&report.summary, language));
    }

    let _ = writeln!(out, "\n{}", label(language, "Plan", "执行计划"));
    render_tree(&mut out, &report.plan, 0);

    let _ = writeln!(out, "\n{}", label(language, "Recommendations", "优化建议"));
    if report.recommendations.is_empty() {
        let _ = writeln!(
            out,
            "  {}",
            label(language, "No issues found.", "未发现问题。")
        );
    }
    for (index, rec) in report.recommendations.iter().enumerate() {
        render_recommendation(&mut out, index + 1, rec, language);
    }

    out
}

fn summary_table(summary: &PlanSummary, language: Language) -> Table {
    let yes_no = |b: bool| {
        if b {
            label(language, "yes", "是")
        } else {
            label(language, "no", "否")
        }
    };

    let mut table = new_table();
    table.add_row(vec![
        Cell::new(label(language, "Execution time", "执行时间")),
        Cell::new(ms(summary.execution_time)),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Planning time", "规划时间")),
        Cell::new(ms(summary.planning_time)),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Analyzed", "包含实际执行数据")),
        Cell::new(yes_no(summary.analyzed)),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Nodes", "节点数")),
        Cell::new(summary.node_count),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Total cost", "总代价")),
        Cell::new(format!("{:.2}", summary.total_cost)),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Leaf rows", "叶节点行数")),
        Cell::new(summary.total_rows),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Rows scanned", "扫描行数")),
        Cell::new(summary.rows_scanned),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Estimation accuracy", "估算准确度")),
        Cell::new(format!("{:.0}%", summary.estimation_accuracy * 100.0)),
    ]);
    table.add_row(vec![
        Cell::new(label(language, "Bottlenecks", "瓶颈节点")),
        Cell::new(summary.bottleneck_count),
    ]);
    table
}

fn operations_table(summary: &PlanSummary, language: Language) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        label(language, "Operation", "操作"),
        label(language, "Count", "次数"),
        label(language, "Exclusive time", "自身耗时"),
        label(language, "Share", "占比"),
    ]);
    for op in &summary.top_operations {
        table.add_row(vec![
            Cell::new(op.node_type.to_string()),
            Cell::new(op.count),
            Cell::new(format!("{:.3} ms", op.exclusive_time)),
            Cell::new(pct(op.percentage)),
        ]);
    }
    table
}

fn render_tree(out: &mut String, node: &AnnotatedNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let arrow = if depth == 0 { "" } else { "-> " };
    let marker = if node.metrics.is_bottleneck { " [!]" } else { "" };

    let mut line = format!("{}{}[{}] {}", indent, arrow, node.node.id, node.node.node_type);
    if let Some(relation) = node.node.qualified_relation() {
        let _ = write!(line, " on {}", relation);
        if let Some(alias) = &node.node.alias
            && alias != node.node.relation_name.as_deref().unwrap_or_default()
        {
            let _ = write!(line, " {}", alias);
        }
    }
    if node.metrics.exclusive_time.is_some() {
        let _ = write!(
            line,
            "  {} ({})",
            ms(node.metrics.exclusive_time),
            pct(node.metrics.time_percentage)
        );
    } else {
        let _ = write!(line, "  rows={}", node.node.plan_rows);
    }
    let _ = writeln!(out, "  {}{}", line, marker);

    for child in &node.children {
        render_tree(out, child, depth + 1);
    }
}

fn render_recommendation(out: &mut String, index: usize, rec: &Recommendation, language: Language) {
    let _ = writeln!(
        out,
        "  {}. [{}] {}",
        index,
        rec.severity.as_str().to_uppercase(),
        rec.title.get(language)
    );
    let _ = writeln!(out, "     {}", rec.issue.get(language));
    let _ = writeln!(out, "     {}", rec.explanation.get(language));
    let _ = writeln!(out, "     {}", rec.suggestion.get(language));
    if let Some(sql) = &rec.sql {
        let _ = writeln!(out, "     {}", sql);
    }
}
