//! The retrieve-then-generate workflow.
//!
//! A query moves through a fixed graph, `Retrieve -> Generate -> Done`. Each
//! stage consumes the current [`WorkflowState`] and returns a new one; fields
//! a stage does not own are carried over untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

use crate::document::Document;
use crate::error::{AgentError, Result};
use crate::generator::AnswerGenerator;
use crate::index::DocumentRetriever;

/// The record that flows through one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub query: String,
    /// Retrieved chunks in rank order.
    #[serde(default)]
    pub retrieved_docs: Vec<Document>,
    /// Empty until generation has completed.
    #[serde(default)]
    pub response: String,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_docs(self, retrieved_docs: Vec<Document>) -> Self {
        Self {
            retrieved_docs,
            ..self
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..self
        }
    }
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Retrieve,
    Generate,
    Done,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStage::Retrieve => write!(f, "retrieve"),
            WorkflowStage::Generate => write!(f, "generate"),
            WorkflowStage::Done => write!(f, "done"),
        }
    }
}

/// The wired stage graph: a single linear path with no branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowGraph {
    entry: WorkflowStage,
    edges: Vec<(WorkflowStage, WorkflowStage)>,
}

impl WorkflowGraph {
    fn build() -> Self {
        debug!("Compiling workflow graph");
        Self {
            entry: WorkflowStage::Retrieve,
            edges: vec![
                (WorkflowStage::Retrieve, WorkflowStage::Generate),
                (WorkflowStage::Generate, WorkflowStage::Done),
            ],
        }
    }

    pub fn entry(&self) -> WorkflowStage {
        self.entry
    }

    /// The stage that follows `stage`, or `None` for the terminal stage.
    pub fn next(&self, stage: WorkflowStage) -> Option<WorkflowStage> {
        self.edges
            .iter()
            .find(|(from, _)| *from == stage)
            .map(|(_, to)| *to)
    }

    pub fn transitions(&self) -> &[(WorkflowStage, WorkflowStage)] {
        &self.edges
    }
}

/// Runs queries through `Retrieve -> Generate -> Done`.
pub struct RagWorkflow {
    retriever: Arc<dyn DocumentRetriever>,
    generator: Arc<dyn AnswerGenerator>,
    graph: OnceLock<WorkflowGraph>,
}

impl RagWorkflow {
    pub fn new(retriever: Arc<dyn DocumentRetriever>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever,
            generator,
            graph: OnceLock::new(),
        }
    }

    /// The stage graph, compiled on first use and reused afterwards.
    pub fn graph(&self) -> &WorkflowGraph {
        self.graph.get_or_init(WorkflowGraph::build)
    }

    /// Execute one query. A failing stage aborts the run and its error is
    /// returned as-is.
    pub async fn run(&self, query: &str) -> Result<WorkflowState> {
        let graph = self.graph();
        let run_start = Instant::now();
        let mut state = WorkflowState::new(query);
        let mut stage = graph.entry();

        loop {
            let stage_start = Instant::now();
            state = match stage {
                WorkflowStage::Retrieve => self.retrieve(state).await?,
                WorkflowStage::Generate => self.generator.generate(state).await?,
                WorkflowStage::Done => break,
            };
            let next = graph
                .next(stage)
                .ok_or_else(|| AgentError::InvalidStateTransition {
                    from: stage.to_string(),
                    to: "<none>".to_string(),
                })?;
            info!(
                stage = %stage,
                next = %next,
                query = %state.query,
                docs = state.retrieved_docs.len(),
                elapsed_ms = stage_start.elapsed().as_millis() as u64,
                "Workflow stage complete"
            );
            stage = next;
        }

        debug!(
            total_ms = run_start.elapsed().as_millis() as u64,
            response_chars = state.response.len(),
            "Workflow finished"
        );
        Ok(state)
    }

    async fn retrieve(&self, state: WorkflowState) -> Result<WorkflowState> {
        let docs = self.retriever.retrieve(&state.query).await?;
        Ok(state.with_docs(docs))
    }
}
