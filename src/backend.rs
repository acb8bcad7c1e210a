//! The remote model behind the extraction call.
//!
//! [`ExtractionBackend`] is the single seam between the pipeline and the
//! network: one method that takes a page image plus a tool definition and
//! returns whatever the model said. The production implementation,
//! [`LlmBackend`], forwards to any `edgequake-llm` provider with vision and
//! tool-calling support (Anthropic, OpenAI, Gemini, …). Tests and embedders
//! can supply their own implementation through
//! [`crate::config::ExtractionConfigBuilder::backend`].

use crate::config::ExtractionConfig;
use crate::error::DocExtractError;
use crate::schema::DocumentSchema;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory, ToolDefinition,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Model used when the Anthropic key is picked up from the environment.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Model used when the OpenAI key is picked up from the environment.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

/// Tool offered to the model: a name, a description and a JSON Schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn from_schema(schema: &DocumentSchema) -> Self {
        Self {
            name: schema.tool_name.to_string(),
            description: schema.description.to_string(),
            parameters: schema.tool_parameters(),
        }
    }
}

/// One extraction call: a single page image and a single tool.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub system_prompt: String,
    pub instruction: String,
    pub image: ImageData,
    pub tool: ToolSpec,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A tool invocation reported by the model. `arguments` is raw JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallReply {
    pub name: String,
    pub arguments: String,
}

/// The model's answer to a [`ToolRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolReply {
    /// Free text the model produced alongside (or instead of) tool calls.
    pub content: String,
    pub tool_calls: Vec<ToolCallReply>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Transport or API failure; the caller may retry.
#[derive(Debug, Error)]
#[error("{backend}: {message}")]
pub struct BackendError {
    pub backend: String,
    pub message: String,
}

/// Something that can answer a [`ToolRequest`].
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Send one request and wait for the reply.
    async fn call(&self, request: &ToolRequest) -> Result<ToolReply, BackendError>;
}

/// [`ExtractionBackend`] over an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ExtractionBackend for LlmBackend {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn call(&self, request: &ToolRequest) -> Result<ToolReply, BackendError> {
        let messages = vec![
            ChatMessage::system(request.system_prompt.clone()),
            ChatMessage::user_with_images(request.instruction.clone(), vec![request.image.clone()]),
        ];
        let tools = vec![ToolDefinition::function(
            request.tool.name.clone(),
            request.tool.description.clone(),
            request.tool.parameters.clone(),
        )];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        // No forced tool choice: the model is allowed to decline.
        let response = self
            .provider
            .chat_with_tools(&messages, &tools, None, Some(&options))
            .await
            .map_err(|e| BackendError {
                backend: self.provider.name().to_string(),
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} tool call(s), {} in / {} out tokens",
            self.provider.name(),
            response.tool_calls.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        Ok(ToolReply {
            content: response.content,
            tool_calls: response
                .tool_calls
                .into_iter()
                .map(|call| ToolCallReply {
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve the extraction backend, from most-specific to least-specific.
///
/// 1. `config.backend`: used as-is.
/// 2. `config.provider`: wrapped in [`LlmBackend`].
/// 3. `config.provider_name` (+ `config.model`).
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 5. `ANTHROPIC_API_KEY`, then `OPENAI_API_KEY`.
/// 6. `ProviderFactory::from_env()`.
pub fn resolve_backend(
    config: &ExtractionConfig,
) -> Result<Arc<dyn ExtractionBackend>, DocExtractError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let provider = resolve_provider(config)?;
    info!("Using LLM provider '{}' ({})", provider.name(), provider.model());
    Ok(Arc::new(LlmBackend::new(provider)))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, DocExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    for (provider_name, key_var) in [("anthropic", "ANTHROPIC_API_KEY"), ("openai", "OPENAI_API_KEY")]
    {
        if std::env::var(key_var).is_ok_and(|k| !k.is_empty()) {
            let model = config
                .model
                .as_deref()
                .unwrap_or_else(|| default_model_for(provider_name));
            return create_provider(provider_name, model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn default_model_for(provider_name: &str) -> &'static str {
    match provider_name {
        "anthropic" => DEFAULT_ANTHROPIC_MODEL,
        _ => DEFAULT_OPENAI_MODEL,
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::INVOICE;

    struct NamedBackend;

    #[async_trait]
    impl ExtractionBackend for NamedBackend {
        fn name(&self) -> &str {
            "named"
        }

        async fn call(&self, _request: &ToolRequest) -> Result<ToolReply, BackendError> {
            Ok(ToolReply::default())
        }
    }

    #[test]
    fn tool_spec_mirrors_schema() {
        let tool = ToolSpec::from_schema(&INVOICE);
        assert_eq!(tool.name, "extract_invoice_fields");
        assert_eq!(tool.parameters, INVOICE.tool_parameters());
    }

    #[test]
    fn explicit_backend_wins() {
        let config = ExtractionConfig::builder()
            .backend(Arc::new(NamedBackend))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let backend = resolve_backend(&config).expect("explicit backend");
        assert_eq!(backend.name(), "named");
    }

    #[test]
    fn default_models() {
        assert_eq!(default_model_for("anthropic"), DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(default_model_for("openai"), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn backend_call_is_awaitable_outside_tokio_main() {
        let reply = tokio_test::block_on(NamedBackend.call(&ToolRequest {
            system_prompt: String::new(),
            instruction: String::new(),
            image: ImageData::new(String::new(), "image/jpeg"),
            tool: ToolSpec::from_schema(&INVOICE),
            temperature: 0.0,
            max_tokens: 16,
        }))
        .unwrap();
        assert!(reply.tool_calls.is_empty());
    }
}
