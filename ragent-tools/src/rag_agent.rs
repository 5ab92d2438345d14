//! Assembly of the retrieval agent: the two tools plus its instruction.

use crate::registry::ToolRegistry;
use crate::retriever::RetrieverTool;
use crate::wikipedia::{ExternalKnowledgeTool, KnowledgeLookup};
use ragent_core::agent::{AgentObserver, AgenticGenerator};
use ragent_core::brain::Brain;
use ragent_core::config::AgentConfig;
use ragent_core::error::Result;
use ragent_core::index::DocumentRetriever;
use std::sync::Arc;

/// System instruction for the agent.
pub const RAG_SYSTEM_PROMPT: &str = "You are a helpful RAG agent. \
Prefer the 'retriever' tool for questions about the user's indexed documents. \
Use 'wikipedia' only for general world knowledge. \
Think step by step with tools, but return only the final helpful answer to the user.";

/// Register `retriever` and `wikipedia`, in that order.
pub fn register_rag_tools(
    registry: &mut ToolRegistry,
    retriever: Arc<dyn DocumentRetriever>,
    knowledge: Arc<dyn KnowledgeLookup>,
) -> Result<()> {
    registry.register(Arc::new(RetrieverTool::new(retriever)))?;
    registry.register(Arc::new(ExternalKnowledgeTool::new(knowledge)))?;
    Ok(())
}

/// Build a ready agentic generator over `retriever` and `knowledge`.
pub fn build_rag_agent(
    brain: Brain,
    retriever: Arc<dyn DocumentRetriever>,
    knowledge: Arc<dyn KnowledgeLookup>,
    config: &AgentConfig,
) -> Result<AgenticGenerator> {
    build_rag_agent_with_observer(brain, retriever, knowledge, config, None)
}

/// [`build_rag_agent`], reporting loop events to `observer`.
pub fn build_rag_agent_with_observer(
    brain: Brain,
    retriever: Arc<dyn DocumentRetriever>,
    knowledge: Arc<dyn KnowledgeLookup>,
    config: &AgentConfig,
    observer: Option<Arc<dyn AgentObserver>>,
) -> Result<AgenticGenerator> {
    let mut registry = ToolRegistry::new();
    register_rag_tools(&mut registry, retriever, knowledge)?;

    let prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| RAG_SYSTEM_PROMPT.to_string());
    let mut builder = AgenticGenerator::configure()
        .brain(brain.with_system_prompt(prompt))
        .max_turns(config.max_turns);
    for tool in registry.registered_tools() {
        builder = builder.tool(tool);
    }
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }
    builder.ready()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use ragent_core::brain::MockLlmProvider;
    use ragent_core::document::Document;
    use ragent_core::error::{AgentError, RagentError, ToolError};
    use ragent_core::types::Role;

    struct NoDocs;

    #[async_trait]
    impl DocumentRetriever for NoDocs {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }
    }

    struct NoKnowledge;

    #[async_trait]
    impl KnowledgeLookup for NoKnowledge {
        async fn lookup(&self, _query: &str) -> std::result::Result<String, ToolError> {
            Ok(crate::wikipedia::NO_RESULT.to_string())
        }
    }

    #[test]
    fn test_registers_exactly_two_tools() {
        let mut registry = ToolRegistry::new();
        register_rag_tools(&mut registry, Arc::new(NoDocs), Arc::new(NoKnowledge)).unwrap();
        assert_eq!(registry.list_names(), vec!["retriever", "wikipedia"]);
    }

    #[tokio::test]
    async fn test_agent_sends_instruction_and_both_tools() {
        let provider = Arc::new(MockLlmProvider::with_response("ok"));
        let agent = build_rag_agent(
            Brain::new(provider.clone()),
            Arc::new(NoDocs),
            Arc::new(NoKnowledge),
            &AgentConfig::default(),
        )
        .unwrap();
        assert_eq!(agent.max_turns(), 6);
        assert_eq!(agent.brain().system_prompt(), Some(RAG_SYSTEM_PROMPT));

        agent.answer("hello").await.unwrap();
        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        let offered: Vec<&str> = request
            .tools
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(offered, vec!["retriever", "wikipedia"]);
    }

    #[test]
    fn test_prompt_override_and_turns_from_config() {
        let config = AgentConfig {
            max_turns: 3,
            system_prompt: Some("Answer tersely.".to_string()),
            ..Default::default()
        };
        let agent = build_rag_agent(
            Brain::new(Arc::new(MockLlmProvider::new())),
            Arc::new(NoDocs),
            Arc::new(NoKnowledge),
            &config,
        )
        .unwrap();
        assert_eq!(agent.max_turns(), 3);
        assert_eq!(agent.brain().system_prompt(), Some("Answer tersely."));
    }

    #[test]
    fn test_provider_without_tools_fails_at_startup() {
        let result = build_rag_agent(
            Brain::new(Arc::new(MockLlmProvider::new().without_tool_support())),
            Arc::new(NoDocs),
            Arc::new(NoKnowledge),
            &AgentConfig::default(),
        );
        assert!(matches!(
            result,
            Err(RagentError::Agent(AgentError::ToolsUnsupported { .. }))
        ));
    }
}
