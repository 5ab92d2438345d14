//! `retriever`: search the user's indexed documents.

use crate::registry::{Tool, required_str};
use async_trait::async_trait;
use ragent_core::document::Document;
use ragent_core::error::ToolError;
use ragent_core::index::DocumentRetriever;
use ragent_core::types::ToolOutput;
use std::sync::Arc;
use tracing::debug;

/// At most this many passages are shown to the model per call.
pub const MAX_PASSAGES: usize = 8;

/// Returned when retrieval comes back empty.
pub const NO_DOCUMENTS: &str = "No documents found.";

/// Render passages as numbered `[i] title\ncontent` blocks.
///
/// The label is the `title` metadata, then `source`, then `doc_<i>`.
pub fn format_passages(docs: &[Document]) -> String {
    if docs.is_empty() {
        return NO_DOCUMENTS.to_string();
    }
    docs.iter()
        .take(MAX_PASSAGES)
        .enumerate()
        .map(|(i, doc)| {
            let n = i + 1;
            match doc.title() {
                Some(title) => format!("[{n}] {title}\n{}", doc.content),
                None => format!("[{n}] doc_{n}\n{}", doc.content),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fetch passages from the vector index.
pub struct RetrieverTool {
    retriever: Arc<dyn DocumentRetriever>,
}

impl RetrieverTool {
    pub fn new(retriever: Arc<dyn DocumentRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        "retriever"
    }

    fn description(&self) -> &str {
        "Fetch passages from the indexed vector store. Use this for questions about \
         the user's own documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search the indexed documents for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(self.name(), &args, "query")?;
        let docs = self
            .retriever
            .retrieve(query)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;
        debug!(query, hits = docs.len(), "Retriever tool");
        Ok(ToolOutput::text(format_passages(&docs)).with_metadata("hits", docs.len().into()))
    }
}
