//! Agentic answer generation.
//!
//! The model is offered a small set of tools and runs an explicit loop:
//! `Thinking -> ToolCall -> Observation -> Thinking -> ... -> Final`. Each
//! `Thinking` step is one completion whose output is classified as either
//! tool calls or a final answer. The loop is bounded by `max_turns`; once the
//! bound is reached one last completion is requested without tools.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::brain::Brain;
use crate::error::{AgentError, ConfigError, Result, ToolError};
use crate::generator::AnswerGenerator;
use crate::types::{Message, ToolDefinition, ToolOutput};
use crate::workflow::WorkflowState;

/// Answer used when the model finishes without any text.
pub const FALLBACK_ANSWER: &str = "Could not generate response.";

/// Default bound on reasoning turns.
pub const DEFAULT_MAX_TURNS: usize = 6;

/// A tool executor function type. The agent holds tool executors and their definitions.
pub type ToolExecutor = Box<
    dyn Fn(serde_json::Value) -> BoxFuture<'static, std::result::Result<ToolOutput, ToolError>>
        + Send
        + Sync,
>;

/// A registered tool with its definition and executor.
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub executor: ToolExecutor,
}

impl RegisteredTool {
    pub fn new(definition: ToolDefinition, executor: ToolExecutor) -> Self {
        Self {
            definition,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Where the agent loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Thinking,
    ToolCall,
    Observation,
    Final,
}

impl LoopState {
    /// Whether the loop may move from `self` to `next`.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        matches!(
            (self, next),
            (LoopState::Thinking, LoopState::ToolCall)
                | (LoopState::Thinking, LoopState::Final)
                | (LoopState::ToolCall, LoopState::Observation)
                | (LoopState::Observation, LoopState::Thinking)
        )
    }

    fn advance(self, next: LoopState) -> std::result::Result<LoopState, AgentError> {
        if self.can_transition_to(next) {
            debug!(from = %self, to = %next, "Agent loop transition");
            Ok(next)
        } else {
            Err(AgentError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Thinking => write!(f, "thinking"),
            LoopState::ToolCall => write!(f, "tool_call"),
            LoopState::Observation => write!(f, "observation"),
            LoopState::Final => write!(f, "final"),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What one completion asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    ToolCalls(Vec<ToolCallRequest>),
    FinalAnswer(String),
}

impl ModelOutput {
    /// Classify an assistant message. Any tool call wins over text.
    pub fn from_message(message: &Message) -> Self {
        let calls: Vec<ToolCallRequest> = message
            .content
            .tool_calls()
            .into_iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect();
        if calls.is_empty() {
            ModelOutput::FinalAnswer(message.content.collect_text().unwrap_or_default())
        } else {
            ModelOutput::ToolCalls(calls)
        }
    }
}

/// One tool execution during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub turn: usize,
    pub name: String,
    pub arguments: serde_json::Value,
    pub is_error: bool,
    pub duration_ms: u64,
}

/// The outcome of [`AgenticGenerator::answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRun {
    pub answer: String,
    pub invocations: Vec<ToolInvocation>,
    pub turns: usize,
}

impl AgentRun {
    /// Names of the invoked tools, in call order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.name.as_str()).collect()
    }
}

/// Hooks into the agent loop. Every method defaults to a no-op.
#[async_trait]
pub trait AgentObserver: Send + Sync {
    async fn on_turn_start(&self, _turn: usize) {}

    async fn on_tool_start(&self, _tool_name: &str, _args: &serde_json::Value) {}

    async fn on_tool_result(&self, _tool_name: &str, _output: &ToolOutput, _duration_ms: u64) {}

    async fn on_final_answer(&self, _answer: &str) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

#[async_trait]
impl AgentObserver for NoOpObserver {}

/// Observer that records what happened, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    turns: Mutex<usize>,
    tools: Mutex<Vec<String>>,
    answers: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoked_tools(&self) -> Vec<String> {
        self.tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn turns(&self) -> usize {
        *self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn final_answer(&self) -> Option<String> {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl AgentObserver for RecordingObserver {
    async fn on_turn_start(&self, turn: usize) {
        *self.turns.lock().unwrap_or_else(PoisonError::into_inner) = turn;
    }

    async fn on_tool_start(&self, tool_name: &str, _args: &serde_json::Value) {
        self.tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tool_name.to_string());
    }

    async fn on_final_answer(&self, answer: &str) {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(answer.to_string());
    }
}

/// First phase of agent construction. Nothing is validated until
/// [`AgenticGeneratorBuilder::ready`].
pub struct AgenticGeneratorBuilder {
    brain: Option<Brain>,
    tools: Vec<RegisteredTool>,
    max_turns: usize,
    observer: Arc<dyn AgentObserver>,
}

impl AgenticGeneratorBuilder {
    pub fn brain(mut self, brain: Brain) -> Self {
        self.brain = Some(brain);
        self
    }

    pub fn tool(mut self, tool: RegisteredTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the configuration and produce a usable generator.
    pub fn ready(self) -> Result<AgenticGenerator> {
        let brain = self.brain.ok_or_else(|| ConfigError::MissingField {
            field: "brain".to_string(),
        })?;
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid {
                message: "agent.max_turns must be greater than 0".to_string(),
            }
            .into());
        }
        if self.tools.is_empty() {
            return Err(AgentError::NoTools.into());
        }
        for (i, tool) in self.tools.iter().enumerate() {
            if self.tools[..i].iter().any(|t| t.name() == tool.name()) {
                return Err(AgentError::DuplicateTool {
                    name: tool.name().to_string(),
                }
                .into());
            }
        }
        if !brain.provider().supports_tools() {
            return Err(AgentError::ToolsUnsupported {
                model: brain.model_name().to_string(),
            }
            .into());
        }

        let definitions = self.tools.iter().map(|t| t.definition.clone()).collect();
        info!(
            model = brain.model_name(),
            tools = ?self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            max_turns = self.max_turns,
            "Agent ready"
        );
        Ok(AgenticGenerator {
            brain,
            tools: self.tools,
            definitions,
            max_turns: self.max_turns,
            observer: self.observer,
        })
    }
}

/// Tool-using answer generator.
pub struct AgenticGenerator {
    brain: Brain,
    tools: Vec<RegisteredTool>,
    definitions: Vec<ToolDefinition>,
    max_turns: usize,
    observer: Arc<dyn AgentObserver>,
}

impl std::fmt::Debug for AgenticGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgenticGenerator")
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

impl AgenticGenerator {
    pub fn configure() -> AgenticGeneratorBuilder {
        AgenticGeneratorBuilder {
            brain: None,
            tools: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
            observer: Arc::new(NoOpObserver),
        }
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Run the loop for `query` until the model gives a final answer.
    pub async fn answer(&self, query: &str) -> Result<AgentRun> {
        let mut conversation = vec![Message::user(query)];
        let mut invocations = Vec::new();
        let mut pending: Vec<ToolCallRequest> = Vec::new();
        let mut state = LoopState::Thinking;
        let mut turns = 0;

        loop {
            match state {
                LoopState::Thinking if turns >= self.max_turns => {
                    warn!(
                        max_turns = self.max_turns,
                        "Turn limit reached, requesting final answer without tools"
                    );
                    let response = self.brain.think_with_retry(&conversation, None).await?;
                    conversation.push(response.message);
                    state = state.advance(LoopState::Final)?;
                }
                LoopState::Thinking => {
                    turns += 1;
                    self.observer.on_turn_start(turns).await;
                    let response = self
                        .brain
                        .think_with_retry(&conversation, Some(self.definitions.clone()))
                        .await?;
                    let output = ModelOutput::from_message(&response.message);
                    conversation.push(response.message);
                    state = match output {
                        ModelOutput::ToolCalls(calls) => {
                            pending = calls;
                            state.advance(LoopState::ToolCall)?
                        }
                        ModelOutput::FinalAnswer(_) => state.advance(LoopState::Final)?,
                    };
                }
                LoopState::ToolCall => {
                    for call in pending.drain(..) {
                        let (output, invocation) = self.invoke(call.clone(), turns).await?;
                        conversation.push(Message::tool_result(
                            &call.id,
                            output.content,
                            invocation.is_error,
                        ));
                        invocations.push(invocation);
                    }
                    state = state.advance(LoopState::Observation)?;
                }
                LoopState::Observation => {
                    state = state.advance(LoopState::Thinking)?;
                }
                LoopState::Final => break,
            }
        }

        let answer = conversation
            .last()
            .and_then(|m| m.content.collect_text())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
        self.observer.on_final_answer(&answer).await;
        info!(
            turns,
            tool_calls = invocations.len(),
            answer_chars = answer.len(),
            "Agent finished"
        );

        Ok(AgentRun {
            answer,
            invocations,
            turns,
        })
    }

    /// Execute one tool call. Unknown tools and rejected arguments become
    /// error observations; other tool failures abort the run.
    async fn invoke(
        &self,
        call: ToolCallRequest,
        turn: usize,
    ) -> Result<(ToolOutput, ToolInvocation)> {
        self.observer.on_tool_start(&call.name, &call.arguments).await;
        let start = Instant::now();

        let output = match self.tools.iter().find(|t| t.name() == call.name) {
            None => {
                warn!(tool = %call.name, "Model requested an unknown tool");
                let available: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
                ToolOutput::error(format!(
                    "{}. Available tools: {}",
                    ToolError::NotFound {
                        name: call.name.clone()
                    },
                    available.join(", ")
                ))
            }
            Some(tool) => match (tool.executor)(call.arguments.clone()).await {
                Ok(output) => output,
                Err(e @ ToolError::InvalidArguments { .. }) => {
                    warn!(tool = %call.name, error = %e, "Tool rejected its arguments");
                    ToolOutput::error(e.to_string())
                }
                Err(e) => return Err(e.into()),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.observer
            .on_tool_result(&call.name, &output, duration_ms)
            .await;
        debug!(
            tool = %call.name,
            duration_ms,
            is_error = output.is_error(),
            output_chars = output.content.len(),
            "Tool executed"
        );

        let invocation = ToolInvocation {
            turn,
            name: call.name,
            arguments: call.arguments,
            is_error: output.is_error(),
            duration_ms,
        };
        Ok((output, invocation))
    }
}

#[async_trait]
impl AnswerGenerator for AgenticGenerator {
    async fn generate(&self, state: WorkflowState) -> Result<WorkflowState> {
        let run = self.answer(&state.query).await?;
        Ok(state.with_response(run.answer))
    }
}
