//! Tool Registry: tool registration, definitions for the model, and
//! timeout-bounded execution.
//!
//! Tools are registered once when an agent is assembled. The registry keeps
//! registration order, which is also the order definitions are offered to
//! the model.

use async_trait::async_trait;
use ragent_core::agent::RegisteredTool;
use ragent_core::error::ToolError;
use ragent_core::types::{ToolDefinition, ToolOutput};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// The definition sent to the model for `tool`.
pub fn definition_of(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// Run `tool`, failing with `ToolError::Timeout` once its timeout elapses.
pub async fn execute_with_timeout(
    tool: &dyn Tool,
    args: serde_json::Value,
) -> Result<ToolOutput, ToolError> {
    let timeout = tool.timeout();
    info!(tool = %tool.name(), timeout_secs = timeout.as_secs(), "Executing tool");

    match tokio::time::timeout(timeout, tool.execute(args)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::Timeout {
            name: tool.name().to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Wrap a tool as an agent-executable [`RegisteredTool`].
pub fn registered_tool(tool: Arc<dyn Tool>) -> RegisteredTool {
    let definition = definition_of(tool.as_ref());
    RegisteredTool::new(
        definition,
        Box::new(move |args| {
            let tool = Arc::clone(&tool);
            Box::pin(async move { execute_with_timeout(tool.as_ref(), args).await })
        }),
    )
}

/// The tool registry holds all registered tools and handles execution.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// List all registered tool definitions (for sending to LLM).
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.ordered().map(|tool| definition_of(tool.as_ref())).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given arguments, applying timeout.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        execute_with_timeout(tool.as_ref(), args).await
    }

    /// Every tool as an agent-executable [`RegisteredTool`], in registration order.
    pub fn registered_tools(&self) -> Vec<RegisteredTool> {
        self.ordered().cloned().map(registered_tool).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the required string parameter `key`, rejecting missing or blank values.
pub(crate) fn required_str<'a>(
    tool: &str,
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            name: tool.to_string(),
            reason: format!("Missing required parameter: {key}"),
        })
}
