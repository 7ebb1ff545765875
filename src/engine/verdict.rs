use super::state::VerdictStatus;
use crate::gateway::ResponseSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// Structured answer a reviewer is asked to return
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ReviewVerdict {
    /// "pass" only when every rubric item is satisfied
    pub verdict: VerdictStatus,

    /// Revision instructions for the writer, or a short approval note
    #[serde(default)]
    pub feedback: String,
}

pub fn verdict_schema() -> ResponseSchema {
    let schema = schema_for!(ReviewVerdict);
    ResponseSchema {
        name: "review_verdict".to_string(),
        schema: serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"})),
    }
}

/// How a review response was interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub status: VerdictStatus,
    pub feedback: String,
    pub structured: bool,
}

/// Classify a review response.
///
/// A `{verdict, feedback}` object decides when one can be found (bare, in a
/// code fence, or embedded in prose). Otherwise the response passes only if it
/// contains `pass_marker`.
pub fn classify(raw: &str, pass_marker: &str) -> Classified {
    if let Some(parsed) = try_parse_verdict(raw) {
        let feedback = if parsed.feedback.trim().is_empty() {
            raw.trim().to_string()
        } else {
            parsed.feedback
        };
        return Classified {
            status: parsed.verdict,
            feedback,
            structured: true,
        };
    }

    let status = if raw.contains(pass_marker) {
        VerdictStatus::Pass
    } else {
        VerdictStatus::Fail
    };
    Classified {
        status,
        feedback: raw.trim().to_string(),
        structured: false,
    }
}

fn try_parse_verdict(raw: &str) -> Option<ReviewVerdict> {
    let json = extract_json(raw)?;
    match serde_json::from_str::<ReviewVerdict>(&json) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("Review response is not a verdict object: {}", e);
            None
        }
    }
}

/// Extract a JSON object from a string that might contain markdown code blocks
fn extract_json(s: &str) -> Option<String> {
    // First try: the whole string is valid JSON
    if s.trim().starts_with('{') && serde_json::from_str::<serde_json::Value>(s.trim()).is_ok() {
        return Some(s.trim().to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<serde_json::Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Third try: find JSON object pattern
    let brace_start = s.find('{')?;
    let mut depth = 0;
    let mut end = brace_start;

    for (i, c) in s[brace_start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = brace_start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > brace_start {
        let potential_json = &s[brace_start..end];
        if serde_json::from_str::<serde_json::Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    None
}
