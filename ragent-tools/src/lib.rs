//! # Ragent Tools
//!
//! Tool implementations for the Ragent agent: search over the user's indexed
//! documents and Wikipedia lookup, plus the registry that exposes them to the
//! agent loop.

pub mod rag_agent;
pub mod registry;
pub mod retriever;
pub mod wikipedia;

pub use rag_agent::{RAG_SYSTEM_PROMPT, build_rag_agent, build_rag_agent_with_observer};
pub use registry::{Tool, ToolRegistry};
pub use retriever::RetrieverTool;
pub use wikipedia::{ExternalKnowledgeTool, KnowledgeLookup, WikipediaLookup};
