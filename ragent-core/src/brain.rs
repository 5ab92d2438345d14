//! Brain module: LLM provider abstraction and interaction.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, a token
//! counter for context-window checks, the `Brain` wrapper that prepends the
//! system prompt and tracks usage, and a scriptable `MockLlmProvider`.

use crate::config::RetryConfig;
use crate::error::LlmError;
use crate::providers::with_retry;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Estimate the token count for a set of messages.
    fn estimate_tokens(&self, messages: &[Message]) -> usize;

    /// Return the context window size for this provider's model.
    fn context_window(&self) -> usize;

    /// Whether this provider supports native tool/function calling.
    fn supports_tools(&self) -> bool;

    /// The model identifier.
    fn model_name(&self) -> &str;
}

/// Token counter using tiktoken-rs for BPE tokenization.
///
/// Falls back to a ~4 characters per token estimate when no encoding can be
/// loaded.
pub struct TokenCounter {
    bpe: Option<tiktoken_rs::CoreBPE>,
}

impl TokenCounter {
    /// Create a token counter for the given model, defaulting to cl100k_base.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .ok();
        Self { bpe }
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len().div_ceil(4),
        }
    }

    /// Estimate the token count for a set of tool definitions.
    pub fn count_tool_definitions(&self, tools: &[ToolDefinition]) -> usize {
        tools
            .iter()
            .map(|tool| {
                10 + self.count(&tool.name)
                    + self.count(&tool.description)
                    + self.count(&tool.parameters.to_string())
            })
            .sum()
    }

    /// Estimate the token count for a set of messages, with ~4 tokens of
    /// per-message overhead and 3 for reply priming.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|msg| 4 + self.count_content(&msg.content))
            .sum::<usize>()
            + 3
    }

    fn count_content(&self, content: &Content) -> usize {
        match content {
            Content::Text { text } => self.count(text),
            Content::ToolCall {
                name, arguments, ..
            } => self.count(name) + self.count(&arguments.to_string()),
            Content::ToolResult { output, .. } => self.count(output),
            Content::MultiPart { parts } => parts.iter().map(|p| self.count_content(p)).sum(),
        }
    }
}

/// The Brain wraps an LLM provider and adds prompt construction, context
/// checks, retries, and usage tracking.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: Option<usize>,
    retry: RetryConfig,
    token_counter: TokenCounter,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let model_name = provider.model_name().to_string();
        Self {
            provider,
            system_prompt: None,
            temperature: 0.0,
            max_tokens: None,
            retry: RetryConfig::default(),
            token_counter: TokenCounter::for_model(&model_name),
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = if prompt.is_empty() { None } else { Some(prompt) };
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Construct messages for the LLM with the system prompt prepended.
    pub fn build_messages(&self, conversation: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend_from_slice(conversation);
        messages
    }

    /// Send one completion request and return the response, tracking usage.
    pub async fn think(
        &self,
        conversation: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, LlmError> {
        let messages = self.build_messages(conversation);
        let mut token_estimate = self.provider.estimate_tokens(&messages);
        if let Some(tool_defs) = &tools {
            token_estimate += self.token_counter.count_tool_definitions(tool_defs);
        }
        let context_limit = self.provider.context_window();
        if token_estimate > context_limit {
            return Err(LlmError::ContextOverflow {
                used: token_estimate,
                limit: context_limit,
            });
        }

        debug!(
            model = self.provider.model_name(),
            estimated_tokens = token_estimate,
            tools = tools.as_ref().map_or(0, |t| t.len()),
            "Sending completion request"
        );

        let request = CompletionRequest {
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        let response = self.provider.complete(request).await?;
        self.track_usage(&response.usage);

        info!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or(""),
            "Completion received"
        );

        Ok(response)
    }

    /// [`Brain::think`] with exponential backoff on transient errors.
    pub async fn think_with_retry(
        &self,
        conversation: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, LlmError> {
        with_retry(&self.retry, || self.think(conversation, tools.clone())).await
    }

    pub fn total_usage(&self) -> TokenUsage {
        *self.total_usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    fn track_usage(&self, usage: &TokenUsage) {
        self.total_usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accumulate(usage);
    }
}

/// A scriptable LLM provider for tests and offline runs.
///
/// Responses are returned in the order they were queued; every request is
/// recorded so callers can inspect prompts and offered tools.
pub struct MockLlmProvider {
    model: String,
    context_window: usize,
    supports_tools: bool,
    responses: Mutex<Vec<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 128_000,
            supports_tools: true,
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers with the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    pub fn without_tool_support(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(response);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create a simple text response.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Create a single tool call response.
    pub fn tool_call_response(tool_name: &str, arguments: serde_json::Value) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::tool_call(&call_id, tool_name, arguments),
            ),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    /// Create a multipart response (text + tool call).
    pub fn multipart_response(
        text: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::MultiPart {
                    parts: vec![
                        Content::text(text),
                        Content::tool_call(&call_id, tool_name, arguments),
                    ],
                },
            ),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            Ok(responses.remove(0))
        }
    }

    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| m.content_length() / 4).sum::<usize>() + 100
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_mock_provider_default_response() {
        let provider = MockLlmProvider::new();
        let response = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert!(response.message.content.as_text().is_some());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_queued_responses() {
        let provider = MockLlmProvider::new();
        provider.queue_response(MockLlmProvider::text_response("first"));
        provider.queue_response(MockLlmProvider::text_response("second"));

        let r1 = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert_eq!(r1.message.content.as_text(), Some("first"));

        let r2 = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert_eq!(r2.message.content.as_text(), Some("second"));
    }

    #[test]
    fn test_mock_provider_properties() {
        let provider = MockLlmProvider::new();
        assert_eq!(provider.context_window(), 128_000);
        assert!(provider.supports_tools());
        assert!(!MockLlmProvider::new().without_tool_support().supports_tools());
        assert_eq!(provider.model_name(), "mock-model");
    }

    #[test]
    fn test_token_counter_counts() {
        let counter = TokenCounter::for_model("gpt-4o-mini");
        assert!(counter.count("hello world") >= 2);
        let messages = vec![Message::user("hello")];
        assert!(counter.count_messages(&messages) > counter.count("hello"));
    }

    #[tokio::test]
    async fn test_brain_think_tracks_usage() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response("Paris."));

        let brain = Brain::new(provider);
        let response = brain
            .think(&[Message::user("Capital of France?")], None)
            .await
            .unwrap();
        assert_eq!(response.message.content.as_text(), Some("Paris."));
        assert_eq!(brain.total_usage().total(), 150);
    }

    #[tokio::test]
    async fn test_brain_builds_messages_with_system_prompt() {
        let provider = Arc::new(MockLlmProvider::new());
        let brain = Brain::new(provider.clone()).with_system_prompt("system prompt");

        let messages = brain.build_messages(&[Message::user("hello")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content.as_text(), Some("system prompt"));
        assert_eq!(messages[1].role, Role::User);

        let bare = Brain::new(provider);
        assert_eq!(bare.build_messages(&[Message::user("hello")]).len(), 1);
    }

    #[tokio::test]
    async fn test_brain_context_overflow() {
        let provider = Arc::new(MockLlmProvider::new().with_context_window(10));
        let brain = Brain::new(provider.clone());
        let err = brain
            .think(&[Message::user("a long question")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContextOverflow { .. }));
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn test_mock_tool_call_response() {
        let response = MockLlmProvider::tool_call_response(
            "retriever",
            serde_json::json!({"query": "capital of France"}),
        );
        match &response.message.content {
            Content::ToolCall {
                name, arguments, ..
            } => {
                assert_eq!(name, "retriever");
                assert_eq!(arguments["query"], "capital of France");
            }
            _ => panic!("Expected ToolCall content"),
        }
    }

    /// A provider that fails N times before succeeding.
    struct FailingProvider {
        failures_remaining: Mutex<usize>,
        error_type: String,
    }

    impl FailingProvider {
        fn new(failures: usize, error_type: &str) -> Self {
            Self {
                failures_remaining: Mutex::new(failures),
                error_type: error_type.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FailingProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                match self.error_type.as_str() {
                    "timeout" => Err(LlmError::Timeout { timeout_secs: 5 }),
                    "connection" => Err(LlmError::Connection {
                        message: "connection reset".into(),
                    }),
                    _ => Err(LlmError::ApiRequest {
                        message: "non-retryable".into(),
                    }),
                }
            } else {
                Ok(MockLlmProvider::text_response("Success after retry"))
            }
        }

        fn estimate_tokens(&self, _messages: &[Message]) -> usize {
            100
        }
        fn context_window(&self) -> usize {
            128_000
        }
        fn supports_tools(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "failing-mock"
        }
    }

    #[tokio::test]
    async fn test_think_with_retry_succeeds_after_failures() {
        let provider = Arc::new(FailingProvider::new(2, "connection"));
        let brain = Brain::new(provider).with_retry(fast_retry());

        let result = brain.think_with_retry(&[Message::user("test")], None).await;
        assert_eq!(
            result.unwrap().message.content.as_text(),
            Some("Success after retry")
        );
    }

    #[tokio::test]
    async fn test_think_with_retry_exhausted() {
        let provider = Arc::new(FailingProvider::new(10, "timeout"));
        let brain = Brain::new(provider).with_retry(fast_retry());

        let result = brain.think_with_retry(&[Message::user("test")], None).await;
        assert!(matches!(result.unwrap_err(), LlmError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_think_with_retry_non_retryable_fails_immediately() {
        let provider = Arc::new(FailingProvider::new(1, "non_retryable"));
        let brain = Brain::new(provider.clone()).with_retry(fast_retry());

        let result = brain.think_with_retry(&[Message::user("test")], None).await;
        assert!(matches!(result.unwrap_err(), LlmError::ApiRequest { .. }));
        assert_eq!(*provider.failures_remaining.lock().unwrap(), 0);
    }
}
