//! Request/response surface of the analyzer
//!
//! [`PlanAnalyzer`] runs the whole pipeline on raw EXPLAIN text:
//! detect the format, parse, then diagnose. Transports hand it an
//! [`AnalysisRequest`] and send back either an [`AnalysisReport`] or an
//! [`ErrorResponse`].

use crate::diagnostics::{
    AnalyzerConfig, AnnotatedNode, PlanDiagnosis, PlanSummary, Recommendation, diagnose,
};
use crate::error::{AnalyzerError, ErrorClass, Result};
use crate::explain::{FormatHint, QueryPlan, parse_explain};
use crate::localized::LocalizedText;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A plan submitted for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// EXPLAIN output, text or JSON
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatHint>,
}

impl AnalysisRequest {
    pub fn new(plan: impl Into<String>) -> Self {
        Self {
            plan: plan.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: FormatHint) -> Self {
        self.format = Some(format);
        self
    }

    /// Validates an untyped JSON request body
    pub fn from_value(value: &Value) -> Result<Self> {
        let body = value.as_object().ok_or_else(|| {
            AnalyzerError::InvalidInput("request body must be a JSON object".to_string())
        })?;

        let plan = match body.get("plan") {
            Some(Value::String(plan)) => plan.clone(),
            Some(Value::Null) | None => {
                return Err(AnalyzerError::InvalidInput(
                    "missing \"plan\" field".to_string(),
                ));
            }
            Some(_) => {
                return Err(AnalyzerError::InvalidInput(
                    "\"plan\" must be a string".to_string(),
                ));
            }
        };

        let format = match body.get("format") {
            Some(Value::Null) | None => None,
            Some(Value::String(hint)) => Some(
                hint.parse::<FormatHint>()
                    .map_err(AnalyzerError::InvalidInput)?,
            ),
            Some(_) => {
                return Err(AnalyzerError::InvalidInput(
                    "\"format\" must be a string".to_string(),
                ));
            }
        };

        Ok(Self { plan, format })
    }
}

/// Successful analysis result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Plan tree with per-node metrics
    pub plan: AnnotatedNode,
    pub summary: PlanSummary,
    pub recommendations: Vec<Recommendation>,
    /// The submitted input, unchanged
    pub raw_plan: String,
}

impl AnalysisReport {
    pub fn from_diagnosis(diagnosis: PlanDiagnosis, raw_plan: impl Into<String>) -> Self {
        Self {
            plan: diagnosis.annotated,
            summary: diagnosis.summary,
            recommendations: diagnosis.recommendations,
            raw_plan: raw_plan.into(),
        }
    }

    /// Serializes the report as pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AnalyzerError::Internal(format!("failed to serialize report: {}", e)))
    }
}

/// Failed analysis result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    pub error: LocalizedText,
    pub class: ErrorClass,
}

impl ErrorResponse {
    /// Builds the response for an error, logging internal failures
    pub fn from_error(err: &AnalyzerError) -> Self {
        match err.class() {
            ErrorClass::Internal => tracing::error!(error = %err, "plan analysis failed"),
            ErrorClass::Input => tracing::debug!(error = %err, "rejected plan input"),
        }
        Self {
            success: false,
            error: err.localized_message(),
            class: err.class(),
        }
    }
}

impl From<&AnalyzerError> for ErrorResponse {
    fn from(err: &AnalyzerError) -> Self {
        Self::from_error(err)
    }
}

/// Runs the full pipeline with one immutable config
///
/// Holds no other state, so one analyzer can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct PlanAnalyzer {
    config: AnalyzerConfig,
}

impl PlanAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyzes raw EXPLAIN output
    #[tracing::instrument(skip(self, input), fields(bytes = input.len(), hint = %hint))]
    pub fn analyze_str(&self, input: &str, hint: FormatHint) -> Result<AnalysisReport> {
        if input.len() > self.config.max_input_bytes {
            return Err(AnalyzerError::InvalidInput(format!(
                "plan is {} bytes, the limit is {} bytes",
                input.len(),
                self.config.max_input_bytes
            )));
        }
        if input.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput("plan is empty".to_string()));
        }

        let plan = parse_explain(input, hint)?;
        tracing::debug!(format = plan.format.as_str(), nodes = plan.node_count(), "parsed plan");

        let diagnosis = diagnose(&plan, &self.config)?;
        tracing::info!(
            recommendations = diagnosis.recommendations.len(),
            critical = diagnosis.has_critical_issues(),
            "plan analyzed"
        );
        Ok(AnalysisReport::from_diagnosis(diagnosis, input))
    }

    /// Analyzes a request, auto-detecting the format unless it names one
    pub fn analyze_request(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        self.analyze_str(&request.plan, request.format.unwrap_or_default())
    }

    /// Diagnoses an already parsed plan
    pub fn analyze_plan(&self, plan: &QueryPlan) -> Result<PlanDiagnosis> {
        diagnose(plan, &self.config)
    }
}
