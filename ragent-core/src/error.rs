//! Error types for the Ragent core library.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering input validation, source loading, embeddings, LLM calls, tool
//! execution, configuration, and the agent loop.

use std::path::PathBuf;

/// Boxed error used for collaborator failures whose concrete type is opaque
/// to the pipeline (HTTP fetchers, PDF extractors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for the Ragent core library.
#[derive(Debug, thiserror::Error)]
pub enum RagentError {
    /// A caller-side precondition was violated.
    #[error("{message}")]
    InvalidInput { message: String },

    /// A component was used before it was built.
    #[error("{component} is not initialized. Call 'create_retriever' first.")]
    NotInitialized { component: String },

    /// A loader collaborator failed while reading a source.
    #[error("Failed to load documents from {target}: {cause}")]
    LoadFailure {
        target: String,
        #[source]
        cause: BoxError,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagentError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn load_failure(target: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::LoadFailure {
            target: target.into(),
            cause: cause.into(),
        }
    }

    pub fn not_initialized(component: impl Into<String>) -> Self {
        Self::NotInitialized {
            component: component.into(),
        }
    }
}

/// Errors from embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {message}")]
    Request { message: String },

    #[error("Embedding response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding provider '{provider}' is not available: {message}")]
    Unavailable { provider: String, message: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Context window exceeded: used {used} of {limit} tokens")]
    ContextOverflow { used: usize, limit: usize },

    #[error("Model not supported: {model}")]
    UnsupportedModel { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the agentic answer loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent has no tools configured")]
    NoTools,

    #[error("Duplicate tool name in agent configuration: {name}")]
    DuplicateTool { name: String },

    #[error("Provider model '{model}' does not support tool calling")]
    ToolsUnsupported { model: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// A type alias for results using the top-level `RagentError`.
pub type Result<T> = std::result::Result<T, RagentError>;
