//! Field extraction: send one page image with one tool schema to the model.
//!
//! The reply falls into one of three buckets:
//!
//! * the model called the tool → [`Extraction::Fields`]
//! * the model answered in prose instead → [`Extraction::NoToolInvoked`]
//! * the call itself failed (transport, API, timeout) → [`PageError`]
//!
//! Only the last bucket is retried. Declining the tool is a valid answer and
//! re-asking would just spend tokens.
//!
//! ## Retry Strategy
//!
//! Each attempt is bounded by `api_timeout_secs`. Failed attempts back off
//! exponentially (`retry_backoff_ms * 2^(attempt-1)`), so with the defaults
//! (500 ms, 2 retries) a page waits at most 1.5 s between attempts.

use crate::backend::{ExtractionBackend, ToolReply, ToolRequest, ToolSpec};
use crate::config::ExtractionConfig;
use crate::error::PageError;
use crate::output::{Extraction, PageResult};
use crate::prompts::{user_instruction, DEFAULT_SYSTEM_PROMPT, NO_TOOL_INVOKED_MESSAGE};
use crate::schema::DocumentSchema;
use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Build the request for one page.
pub fn build_request(
    schema: &DocumentSchema,
    image: ImageData,
    config: &ExtractionConfig,
) -> ToolRequest {
    ToolRequest {
        system_prompt: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        instruction: user_instruction(schema),
        image,
        tool: ToolSpec::from_schema(schema),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating at `u64::MAX`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Run the extraction call for a single page.
///
/// Always returns a `PageResult`; failures are recorded in `result.error`
/// so one bad page doesn't abort the document.
pub async fn extract_page(
    backend: &dyn ExtractionBackend,
    schema: &DocumentSchema,
    page_num: usize,
    image: ImageData,
    config: &ExtractionConfig,
) -> PageResult {
    let start = Instant::now();
    let request = build_request(schema, image, config);
    let per_call = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<PageError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_call, backend.call(&request)).await {
            Ok(Ok(reply)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {}ms",
                    page_num, reply.input_tokens, reply.output_tokens, duration_ms
                );

                let (extraction, error) = match interpret_reply(schema, page_num, &reply) {
                    Ok(extraction) => (Some(extraction), None),
                    Err(e) => (None, Some(e)),
                };

                return PageResult {
                    page_num,
                    extraction,
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration_ms,
                    retries: attempt,
                    error,
                };
            }
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = Some(PageError::ExtractionFailed {
                    page: page_num,
                    retries: config.max_retries,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(PageError::Timeout {
                    page: page_num,
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    PageResult {
        page_num,
        extraction: None,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        retries: config.max_retries,
        error: Some(last_err.unwrap_or_else(|| PageError::ExtractionFailed {
            page: page_num,
            retries: config.max_retries,
            detail: "Unknown error".to_string(),
        })),
    }
}

/// Classify a model reply.
///
/// The first tool call whose name matches the schema's tool wins; calls to
/// any other name are ignored. No matching call means the model declined.
pub fn interpret_reply(
    schema: &DocumentSchema,
    page_num: usize,
    reply: &ToolReply,
) -> Result<Extraction, PageError> {
    let Some(call) = reply.tool_calls.iter().find(|c| c.name == schema.tool_name) else {
        debug!("Page {}: model did not call '{}'", page_num, schema.tool_name);
        return Ok(Extraction::NoToolInvoked {
            message: NO_TOOL_INVOKED_MESSAGE.to_string(),
            model_text: reply.content.trim().to_string(),
        });
    };

    let fields = parse_arguments(&call.arguments).map_err(|detail| PageError::MalformedArguments {
        page: page_num,
        tool: call.name.clone(),
        detail,
    })?;

    let missing_required = schema
        .required
        .iter()
        .filter(|name| fields.get(**name).is_none_or(Value::is_null))
        .map(|name| name.to_string())
        .collect();

    Ok(Extraction::Fields {
        tool: call.name.clone(),
        fields: fields.into_iter().collect(),
        missing_required,
    })
}

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*?)\n?```\s*$").unwrap());

/// Parse tool arguments as a JSON object.
///
/// Some providers wrap the payload in a ```json fence or send an empty
/// string for a tool with no filled fields; both are accepted.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    let body = RE_FENCED_JSON
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str());

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
