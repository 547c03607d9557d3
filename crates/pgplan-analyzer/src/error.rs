//! Error types for plan parsing and analysis

use crate::localized::LocalizedText;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing or analyzing an EXPLAIN plan
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    /// The request itself is unusable (missing or non-string plan, too large)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The plan text is neither valid EXPLAIN JSON nor EXPLAIN text
    #[error("Malformed EXPLAIN output: {0}")]
    MalformedInput(String),

    /// A text-format node header could not be parsed
    #[error("Unparsable plan header at line {line}: {reason}")]
    UnparsableHeader { line: usize, reason: String },

    /// Something went wrong inside the analyzer itself
    #[error("Internal analyzer error: {0}")]
    Internal(String),
}

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Who is at fault for an error
///
/// Transports map `Input` to a client error (HTTP 400) and `Internal` to a
/// server error (HTTP 500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Input,
    Internal,
}

impl AnalyzerError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn unparsable_header(line: usize, reason: impl Into<String>) -> Self {
        Self::UnparsableHeader {
            line,
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) | Self::MalformedInput(_) | Self::UnparsableHeader { .. } => {
                ErrorClass::Input
            }
            Self::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn is_input_error(&self) -> bool {
        self.class() == ErrorClass::Input
    }

    /// User-facing message in both languages
    ///
    /// Internal details are not exposed; the full error is logged instead.
    pub fn localized_message(&self) -> LocalizedText {
        match self {
            Self::InvalidInput(detail) => LocalizedText::new(
                format!("Invalid request: {}", detail),
                format!("请求无效：{}", detail),
            ),
            Self::MalformedInput(detail) => LocalizedText::new(
                format!(
                    "Could not parse the EXPLAIN output ({}). Paste the complete result of EXPLAIN, EXPLAIN ANALYZE or EXPLAIN (FORMAT JSON).",
                    detail
                ),
                format!(
                    "无法解析 EXPLAIN 输出（{}）。请粘贴 EXPLAIN、EXPLAIN ANALYZE 或 EXPLAIN (FORMAT JSON) 的完整结果。",
                    detail
                ),
            ),
            Self::UnparsableHeader { line, reason } => LocalizedText::new(
                format!("Could not parse the plan node on line {}: {}", line, reason),
                format!("无法解析第 {} 行的计划节点：{}", line, reason),
            ),
            Self::Internal(_) => LocalizedText::new(
                "The plan could not be analyzed because of an internal error.",
                "由于内部错误，无法分析该执行计划。",
            ),
        }
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedInput(format!("invalid JSON: {}", err))
    }
}
