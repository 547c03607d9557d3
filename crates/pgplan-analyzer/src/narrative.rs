//! Hand-off to an external prose generator
//!
//! The analyzer does not write prose itself. A [`PlanNarrator`] (typically
//! an LLM client living outside this crate) receives an
//! [`ExplanationRequest`] built from a finished report. Narration is
//! best-effort: failures are logged and never affect the report.

use crate::analysis::AnalysisReport;
use crate::diagnostics::{AnnotatedNode, PlanSummary, RuleId, Severity};
use crate::explain::NodeId;
use crate::localized::Language;
use serde::Serialize;
use thiserror::Error;

/// Errors a narrator may report
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("Narrator unavailable: {0}")]
    Unavailable(String),

    #[error("Narration failed: {0}")]
    Failed(String),
}

/// A recommendation rendered in the request language
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingForNarration {
    pub rule: RuleId,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub title: String,
    pub issue: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// Payload handed to a [`PlanNarrator`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationRequest {
    pub language: Language,
    pub summary: PlanSummary,
    pub recommendations: Vec<FindingForNarration>,
    pub plan: AnnotatedNode,
}

impl ExplanationRequest {
    pub fn from_report(report: &AnalysisReport, language: Language) -> Self {
        let recommendations = report
            .recommendations
            .iter()
            .map(|r| FindingForNarration {
                rule: r.rule,
                severity: r.severity,
                node_id: r.node_id,
                title: r.title.get(language).to_string(),
                issue: r.issue.get(language).to_string(),
                suggestion: r.suggestion.get(language).to_string(),
                sql: r.sql.clone(),
            })
            .collect();

        Self {
            language,
            summary: report.summary.clone(),
            recommendations,
            plan: report.plan.clone(),
        }
    }
}

/// Produces a prose explanation of an analysis
pub trait PlanNarrator: Send + Sync {
    fn narrate(&self, request: &ExplanationRequest) -> Result<String, NarratorError>;
}

/// Asks `narrator` to explain `report`, returning `None` when it fails
pub fn narrate(
    narrator: &dyn PlanNarrator,
    report: &AnalysisReport,
    language: Language,
) -> Option<String> {
    let request = ExplanationRequest::from_report(report, language);
    match narrator.narrate(&request) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!("narrator returned an empty explanation");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "narration failed, continuing without it");
            None
        }
    }
}
