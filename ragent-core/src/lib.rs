//! # Ragent Core
//!
//! Core library for Ragent, a retrieval-augmented answering pipeline.
//! Provides document loading and chunking, the vector index, the
//! retrieve-then-generate workflow, single-shot and agentic answer
//! generation, the LLM interface (brain), configuration, and fundamental types.

pub mod agent;
pub mod brain;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod index;
pub mod loader;
pub mod providers;
pub mod types;
pub mod workflow;

// Re-export commonly used types at the crate root.
pub use agent::{
    AgentObserver, AgentRun, AgenticGenerator, AgenticGeneratorBuilder, LoopState, ModelOutput,
    NoOpObserver, RecordingObserver, RegisteredTool, ToolCallRequest, ToolExecutor,
    ToolInvocation,
};
pub use brain::{Brain, LlmProvider, MockLlmProvider, TokenCounter};
pub use chunker::{Chunker, ChunkingConfig};
pub use config::{RagentConfig, load_config};
pub use document::Document;
pub use embeddings::{Embedder, EmbeddingConfig, LocalEmbedder, create_embedder};
pub use error::{AgentError, ConfigError, EmbeddingError, LlmError, RagentError, Result, ToolError};
pub use generator::{AnswerGenerator, StuffingGenerator};
pub use index::{DocumentRetriever, Retriever, ScoredDocument, VectorIndex};
pub use loader::{HttpFetcher, PdfExtractor, PdfTextExtractor, SourceLoader, WebFetcher};
pub use providers::{OpenAiCompatibleProvider, create_provider};
pub use types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
    ToolOutput,
};
pub use workflow::{RagWorkflow, WorkflowGraph, WorkflowStage, WorkflowState};
