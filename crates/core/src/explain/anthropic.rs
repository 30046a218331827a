use crate::config::Settings;
use crate::explain::error::ExplainDiagnosticsError;
use crate::explain::{json, ExplanationClient, Provider, RewriteInput, RewrittenExplanations};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_EXPLANATIONS: &str = "emit_explanations";

const MAX_HTTP_ATTEMPTS: u32 = 3;

/// Anthropic-backed explanation rewriter. Used for wording only: every
/// insight is fully determined before this client ever sees it, and the
/// output is validated 1:1 against the input before use.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let mut attempt: u32 = 0;
        let text = loop {
            attempt += 1;

            let res = self
                .http
                .post(url.clone())
                .headers(headers.clone())
                .json(&req)
                .send()
                .await;

            let res = match res {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= MAX_HTTP_ATTEMPTS {
                        return Err(err).context("Anthropic request failed");
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "Anthropic request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read Anthropic response body")?;

            if !status.is_success() {
                let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error();
                if retryable && attempt < MAX_HTTP_ATTEMPTS {
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, http_status = %status, "Anthropic HTTP error; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
                return Err(ExplainDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage: "http",
                    detail: format!("status={status}"),
                    raw_output: Some(text),
                    raw_response_json,
                }
                .into());
            }

            break text;
        };

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    /// Strict schema pinned to the exact number of insights in the request.
    fn tools(item_count: usize) -> Vec<Tool> {
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["items"],
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": item_count,
                    "maxItems": item_count,
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["index", "text"],
                        "properties": {
                            "index": {"type": "integer"},
                            "text": {"type": "string"}
                        }
                    }
                }
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_EXPLANATIONS,
            description: "Emit the rewritten insight explanations as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_EXPLANATIONS,
        }
    }

    fn system_prompt() -> String {
        [
            "You rewrite inventory risk insights into plain language for a small-business owner.",
            "You change WORDING ONLY. Never change facts, counts, product names, or conclusions.",
            "Never invent numbers that are not present in the input insight.",
            "Keep each rewritten explanation short: 2-4 sentences, no markdown headings.",
            "Return one rewritten text per insight, matched by zero-based `index`.",
            "Return ONLY valid JSON with the shape {\"items\": [{\"index\": 0, \"text\": \"...\"}]}.",
            "No markdown fences, no extra keys, no trailing commas.",
        ]
        .join("\n")
    }

    fn user_prompt(input: &RewriteInput) -> anyhow::Result<String> {
        Ok(format!(
            "Business name: {}\n\nRewrite the explanation for each of these insights.\n\nInsights JSON:\n{}",
            input.business_name,
            input.insights_json()?
        ))
    }

    fn repair_prompt(previous_output: &str, item_count: usize) -> String {
        format!(
            "Your previous message was NOT valid for the explanations schema.\n\n\
TASK: Output ONLY a single JSON object {{\"items\": [...]}}.\n\
- items MUST contain exactly {item_count} entries with indexes 0..{item_count} (each once).\n\
- Each entry MUST have a non-empty `text`.\n\
- Do NOT include markdown, prose, or code fences.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                // Tool output is handled by `response_tool_explanations`.
                ContentBlock::ToolUse { .. } => continue,
                ContentBlock::Thinking { .. }
                | ContentBlock::RedactedThinking { .. }
                | ContentBlock::Unknown => {}
            }
        }
        out
    }

    fn response_tool_explanations(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<RewrittenExplanations>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_EXPLANATIONS {
                    let parsed = serde_json::from_value::<RewrittenExplanations>(input.clone())
                        .context("failed to decode tool_use.input into RewrittenExplanations")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        item_count: usize,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<Vec<String>> {
        match json::parse_explanations(&initial_text, item_count) {
            Ok(texts) => Ok(texts),
            Err(first_err) => {
                let mut last_err = first_err;
                let mut last_text = initial_text;
                let mut last_raw_json = initial_raw_json;

                for attempt in 1..=2u32 {
                    let repair_req = CreateMessageRequest {
                        model: self.model.clone(),
                        max_tokens: self.max_tokens,
                        system: Some(Self::system_prompt()),
                        messages: vec![Message {
                            role: "user",
                            content: Self::repair_prompt(&last_text, item_count),
                        }],
                        tools: Some(Self::tools(item_count)),
                        tool_choice: Some(Self::tool_choice()),
                    };

                    let (repair_raw_json, repair_res) = self.create_message(repair_req).await?;
                    if let Some(parsed) = Self::response_tool_explanations(&repair_res)? {
                        return parsed.validate_into_texts(item_count);
                    }
                    let repair_text = Self::response_text(&repair_res);
                    match json::parse_explanations(&repair_text, item_count) {
                        Ok(texts) => return Ok(texts),
                        Err(err) => {
                            last_err = err;
                            last_text = repair_text;
                            last_raw_json = repair_raw_json;
                            tracing::warn!(
                                attempt,
                                error = %last_err,
                                "LLM output still invalid after repair attempt"
                            );
                        }
                    }
                }

                Err(ExplainDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage: "parse_after_repair",
                    detail: format!("final_error={last_err}"),
                    raw_output: Some(last_text),
                    raw_response_json: Some(last_raw_json),
                }
                .into())
            }
        }
    }
}

#[async_trait::async_trait]
impl ExplanationClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn rewrite_explanations(&self, input: RewriteInput) -> anyhow::Result<Vec<String>> {
        let item_count = input.insights.len();
        let user_prompt = Self::user_prompt(&input)?;

        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: user_prompt.clone(),
            }],
            tools: Some(Self::tools(item_count)),
            tool_choice: Some(Self::tool_choice()),
        };

        let (mut raw_json, mut res) = self.create_message(make_req(self.max_tokens)).await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self.create_message(make_req(bumped)).await?;
            raw_json = rj;
            res = r;
        }

        // Tool output path.
        if let Some(parsed) = Self::response_tool_explanations(&res)? {
            return parsed.validate_into_texts(item_count);
        }

        // Fallback to text (should be rare).
        let text = Self::response_text(&res);
        self.try_parse_with_repairs(item_count, text, raw_json).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        #[serde(default)]
        data: String,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_use_explanations_input() {
        let tool_input = json!({
            "items": [
                {"index": 0, "text": "Widget may run out this week."},
                {"index": 1, "text": "Sales history is thin, so timing is approximate."}
            ]
        });

        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: TOOL_NAME_EMIT_EXPLANATIONS.to_string(),
                input: tool_input,
            }],
            stop_reason: None,
        };

        let parsed = AnthropicClient::response_tool_explanations(&res)
            .unwrap()
            .unwrap();
        let texts = parsed.validate_into_texts(2).unwrap();
        assert_eq!(texts[0], "Widget may run out this week.");
    }

    #[test]
    fn tool_schema_pins_item_count() {
        let tools = AnthropicClient::tools(3);
        assert_eq!(tools.len(), 1);
        let schema = &tools[0].input_schema;
        assert_eq!(schema["properties"]["items"]["minItems"], json!(3));
        assert_eq!(schema["properties"]["items"]["maxItems"], json!(3));
    }

    #[test]
    fn collects_text_blocks_only() {
        let res = CreateMessageResponse {
            content: vec![
                ContentBlock::Thinking {
                    thinking: "...".to_string(),
                    signature: String::new(),
                },
                ContentBlock::Text {
                    text: "{\"items\": []}".to_string(),
                },
            ],
            stop_reason: None,
        };
        assert_eq!(AnthropicClient::response_text(&res), "{\"items\": []}");
    }
}
