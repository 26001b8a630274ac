//! Defensive parsing of the provider's `choices[0].message.content` string
//! into an [`AnalysisResult`] (§4.7). The model is instructed to return a
//! JSON object, but "instructed to" is not "guaranteed to" — this is the
//! boundary where non-determinism is absorbed so nothing downstream ever
//! sees a malformed shape.

use std::collections::HashMap;

use lexai_core::domain::{AnalysisResult, Obligations, RiskLevel};
use serde_json::Value;

const PLACEHOLDER_SUMMARY: &str = "Analysis completed; no summary was returned by the model.";
const DEFAULT_RISK_SCORE: u8 = 50;

/// Parse and sanitise raw model output into a safe-by-construction
/// [`AnalysisResult`]. Never fails: an uninterpretable payload still yields
/// a result with safe defaults, because "uninterpretable JSON" and
/// "uninterpretable risk assessment" are different failure modes — only the
/// outer model/retry exhaustion (§4.7) is allowed to surface as
/// `PermanentUpstream`.
pub fn sanitize_analysis_json(raw: &str) -> AnalysisResult {
    let value = extract_json_value(raw).unwrap_or(Value::Null);
    let obj = value.as_object();

    let risk_score = obj
        .and_then(|o| o.get("riskScore"))
        .and_then(coerce_score)
        .unwrap_or(DEFAULT_RISK_SCORE);

    let risk_level = obj
        .and_then(|o| o.get("riskLevel"))
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .unwrap_or_else(|| RiskLevel::from_score(risk_score));

    let summary = obj
        .and_then(|o| o.get("summary"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| PLACEHOLDER_SUMMARY.to_string());

    let clauses = string_array(obj, "clauses");
    let parties = string_array(obj, "parties");

    let obligations_obj = obj
        .and_then(|o| o.get("obligations"))
        .and_then(Value::as_object);
    let obligations = Obligations {
        your_obligations: string_array(obligations_obj, "yourObligations"),
        other_party_obligations: string_array(obligations_obj, "otherPartyObligations"),
    };

    let key_dates = obj
        .and_then(|o| o.get("keyDates"))
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect()
        })
        .unwrap_or_else(HashMap::new);

    AnalysisResult {
        summary,
        risk_score,
        risk_level,
        clauses,
        obligations,
        parties,
        key_dates,
    }
}

fn string_array(obj: Option<&serde_json::Map<String, Value>>, key: &str) -> Vec<String> {
    obj.and_then(|o| o.get(key))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_score(v: &Value) -> Option<u8> {
    let n = v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))?;
    Some(n.clamp(0.0, 100.0).round() as u8)
}

/// Try, in order: direct parse, a fenced code block, the substring between
/// the first `{` and the last `}` (§4.7).
fn extract_json_value(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }
    if let Some(fenced) = extract_fenced_block(raw) {
        if let Ok(v) = serde_json::from_str::<Value>(&fenced) {
            return Some(v);
        }
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return Some(v);
            }
        }
    }
    None
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    // Skip an optional language tag (e.g. "json") up to the first newline.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_parses_cleanly() {
        let raw = r#"{"summary":"ok","riskScore":40,"riskLevel":"medium","clauses":["a"],"parties":["Acme"],"obligations":{"yourObligations":["pay"],"otherPartyObligations":[]},"keyDates":{"effective":"2026-01-01"}}"#;
        let result = sanitize_analysis_json(raw);
        assert_eq!(result.summary, "ok");
        assert_eq!(result.risk_score, 40);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.clauses, vec!["a".to_string()]);
        assert_eq!(result.obligations.your_obligations, vec!["pay".to_string()]);
    }

    #[test]
    fn fenced_code_block_is_extracted() {
        let raw = "Here is the analysis:\n```json\n{\"summary\":\"fenced\",\"riskScore\":10}\n```\nThanks.";
        let result = sanitize_analysis_json(raw);
        assert_eq!(result.summary, "fenced");
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn brace_substring_fallback() {
        let raw = "sure, {\"summary\":\"braces\",\"riskScore\":90} hope that helps";
        let result = sanitize_analysis_json(raw);
        assert_eq!(result.summary, "braces");
        assert_eq!(result.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn total_garbage_yields_safe_defaults() {
        let result = sanitize_analysis_json("not json at all");
        assert_eq!(result.risk_score, DEFAULT_RISK_SCORE);
        assert_eq!(result.risk_level, RiskLevel::from_score(DEFAULT_RISK_SCORE));
        assert_eq!(result.summary, PLACEHOLDER_SUMMARY);
        assert!(result.clauses.is_empty());
    }

    #[test]
    fn score_out_of_range_is_clamped() {
        let raw = r#"{"riskScore": 500}"#;
        assert_eq!(sanitize_analysis_json(raw).risk_score, 100);
        let raw = r#"{"riskScore": -5}"#;
        assert_eq!(sanitize_analysis_json(raw).risk_score, 0);
    }

    #[test]
    fn unrecognised_risk_level_is_derived_from_score() {
        let raw = r#"{"riskScore": 80, "riskLevel": "extreme"}"#;
        assert_eq!(sanitize_analysis_json(raw).risk_level, RiskLevel::Critical);
    }
}
