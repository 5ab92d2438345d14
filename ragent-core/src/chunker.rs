//! Overlapping, boundary-aware text chunking.
//!
//! Windows are measured in characters (Unicode scalar values). Each window is
//! an exact slice of its parent document: at most `chunk_size` long, and every
//! window after the first starts exactly `chunk_overlap` characters before
//! the previous one ended. Within those bounds a window prefers to end right
//! after the coarsest separator available (paragraph, line, sentence, word),
//! and falls back to a hard cut only when none fits.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, meta};
use crate::error::{ConfigError, Result};
use crate::loader::SourceLoader;

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same document.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Boundary separators, most preferred first.
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    /// Record each chunk's character offset as `start_index` metadata.
    #[serde(default)]
    pub add_start_index: bool,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_separators() -> Vec<String> {
    vec![
        "\n\n".into(),
        "\n".into(),
        ". ".into(),
        "! ".into(),
        "? ".into(),
        " ".into(),
    ]
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
            add_start_index: false,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_size must be greater than 0".into(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        Ok(())
    }
}

/// Splits documents into overlapping chunks.
#[derive(Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    separators: Vec<Vec<char>>,
    loader: SourceLoader,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    /// Create a chunker, rejecting inconsistent sizes up front.
    pub fn new(config: ChunkingConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let separators = config
            .separators
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().collect())
            .collect();
        Ok(Self {
            config,
            separators,
            loader: SourceLoader::default(),
        })
    }

    /// Use a specific loader for [`Chunker::process`].
    pub fn with_loader(mut self, loader: SourceLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }

    /// Load `sources` and split the result.
    pub async fn process<S: AsRef<str>>(&self, sources: &[S]) -> Result<Vec<Document>> {
        let documents = self.loader.load_documents(sources).await?;
        Ok(self.split_documents(&documents))
    }

    /// Split every document, preserving document order then text order.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (start, text) in self.split_with_offsets(&doc.content) {
                let mut chunk = Document {
                    content: text,
                    metadata: doc.metadata.clone(),
                };
                if self.config.add_start_index {
                    chunk
                        .metadata
                        .insert(meta::START_INDEX.into(), serde_json::json!(start));
                }
                chunks.push(chunk);
            }
        }
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            chunk_overlap = self.config.chunk_overlap,
            "Split documents"
        );
        chunks
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text)
            .into_iter()
            .map(|(_, t)| t)
            .collect()
    }

    fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let end = if len - start <= size {
                len
            } else {
                // Never shorter than overlap + 1, so the next window advances.
                let min_end = start + (overlap + 1).max(size / 2);
                let hard_end = start + size;
                self.find_boundary(&chars, min_end, hard_end)
                    .unwrap_or(hard_end)
            };

            out.push((start, chars[start..end].iter().collect()));
            if end == len {
                break;
            }
            start = end - overlap;
        }
        out
    }

    /// Latest position in `[min_end, max_end]` that directly follows a
    /// separator, trying separators in order of preference.
    fn find_boundary(&self, chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
        for sep in &self.separators {
            let n = sep.len();
            let lowest = min_end.max(n);
            if lowest > max_end {
                continue;
            }
            if let Some(pos) = (lowest..=max_end)
                .rev()
                .find(|&p| chars[p - n..p] == sep[..])
            {
                return Some(pos);
            }
        }
        None
    }
}
