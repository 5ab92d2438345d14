//! Answer generation: turn a query plus retrieved context into a response.

use async_trait::async_trait;
use tracing::debug;

use crate::brain::Brain;
use crate::error::Result;
use crate::types::Message;
use crate::workflow::WorkflowState;

/// Default prompt for single-shot generation. `{context}` and `{query}` are
/// substituted before the call.
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Answer the query based on the context provided\n\nContext:\n{context}\n\nquery: {query}";

/// Produces the `response` field of a workflow state.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Return a new state carrying the generated response. Other fields are
    /// preserved.
    async fn generate(&self, state: WorkflowState) -> Result<WorkflowState>;
}

/// Single-shot generation: all retrieved chunks are stuffed into one prompt.
pub struct StuffingGenerator {
    brain: Brain,
    template: String,
}

impl StuffingGenerator {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Fill the template with the joined context and the query.
    pub fn build_prompt(&self, state: &WorkflowState) -> String {
        let context = state
            .retrieved_docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        fill_template(
            &self.template,
            &[("{context}", context.as_str()), ("{query}", state.query.as_str())],
        )
    }
}

/// Substitute each placeholder in a single left-to-right pass. Inserted
/// values are never rescanned.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|pos| (pos, *key, *value)))
            .min_by_key(|(pos, _, _)| *pos);
        match next {
            Some((pos, key, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

#[async_trait]
impl AnswerGenerator for StuffingGenerator {
    async fn generate(&self, state: WorkflowState) -> Result<WorkflowState> {
        let prompt = self.build_prompt(&state);
        debug!(
            docs = state.retrieved_docs.len(),
            prompt_chars = prompt.len(),
            "Generating single-shot answer"
        );
        let response = self
            .brain
            .think_with_retry(&[Message::user(prompt)], None)
            .await?;
        let text = response.message.content.collect_text().unwrap_or_default();
        Ok(state.with_response(text))
    }
}
