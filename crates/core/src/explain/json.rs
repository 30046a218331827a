use crate::explain::RewrittenExplanations;
use anyhow::Context;

/// Best-effort extraction of a JSON object from model text output: strip
/// Markdown fences if present, otherwise take the first '{' to the last '}'.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parse model text into the rewrite contract and validate it against the
/// expected item count.
pub fn parse_explanations(text: &str, expected_len: usize) -> anyhow::Result<Vec<String>> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<RewrittenExplanations>(&json_str).with_context(|| {
        format!("LLM output is not valid JSON for the explanations schema: {json_str}")
    })?;
    parsed.validate_into_texts(expected_len)
}
