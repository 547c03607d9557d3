//! EXPLAIN format detection

use crate::explain::plan::PlanFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller's statement about which grammar an input uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    #[default]
    Auto,
    Json,
    Text,
}

impl FromStr for FormatHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!(
                "unknown format '{}', expected 'auto', 'json' or 'text'",
                other
            )),
        }
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Json => f.write_str("json"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// Decides which grammar to parse `input` with
///
/// An explicit hint always wins. With `Auto`, input is JSON only when it
/// starts with `[` or `{` and is well-formed JSON; everything else is text.
pub fn detect_format(input: &str, hint: FormatHint) -> PlanFormat {
    match hint {
        FormatHint::Json => PlanFormat::Json,
        FormatHint::Text => PlanFormat::Text,
        FormatHint::Auto => {
            let trimmed = input.trim_start();
            let looks_like_json = trimmed.starts_with('[') || trimmed.starts_with('{');
            if looks_like_json && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
                PlanFormat::Json
            } else {
                PlanFormat::Text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detects_json_array() {
        let input = r#"  [{"Plan": {"Node Type": "Result"}}]"#;
        assert_eq!(detect_format(input, FormatHint::Auto), PlanFormat::Json);
    }

    #[test]
    fn test_detects_text() {
        let input = "Seq Scan on users  (cost=0.00..15.00 rows=1000 width=4)";
        assert_eq!(detect_format(input, FormatHint::Auto), PlanFormat::Text);
    }

    #[test]
    fn test_broken_json_falls_back_to_text() {
        assert_eq!(detect_format("[{\"Plan\": ", FormatHint::Auto), PlanFormat::Text);
    }

    #[test]
    fn test_explicit_hint_wins() {
        assert_eq!(detect_format("[]", FormatHint::Text), PlanFormat::Text);
        assert_eq!(detect_format("Seq Scan", FormatHint::Json), PlanFormat::Json);
    }

    #[test]
    fn test_hint_from_str() {
        assert_eq!("JSON".parse::<FormatHint>(), Ok(FormatHint::Json));
        assert_eq!("auto".parse::<FormatHint>(), Ok(FormatHint::Auto));
        assert!("yaml".parse::<FormatHint>().is_err());
    }
}
