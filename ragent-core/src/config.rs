//! Configuration system for Ragent.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/ragent/config.toml` and/or `.ragent/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::index::DEFAULT_K;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagentConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl RagentConfig {
    /// Check cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        if self.retrieval.k == 0 {
            return Err(ConfigError::Invalid {
                message: "retrieval.k must be greater than 0".into(),
            });
        }
        if self.agent.max_turns == 0 {
            return Err(ConfigError::Invalid {
                message: "agent.max_turns must be greater than 0".into(),
            });
        }
        if self.knowledge.top_k_results == 0 {
            return Err(ConfigError::Invalid {
                message: "knowledge.top_k_results must be greater than 0".into(),
            });
        }
        Ok(())
    }

    /// Render as TOML, suitable for a `config.toml`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Configuration for the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "ollama", or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.1").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Retry policy for transient provider errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            context_window: 128_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff policy for transient LLM errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks returned per query.
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

/// Agentic answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Use the tool-using agent instead of single-shot generation.
    pub enabled: bool,
    /// Upper bound on reasoning turns before a forced final answer.
    pub max_turns: usize,
    /// Replaces the built-in system instruction when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_turns: 6,
            system_prompt: None,
        }
    }
}

/// External knowledge (Wikipedia) lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Wikipedia language edition.
    pub lang: String,
    /// Number of page summaries returned per lookup.
    pub top_k_results: usize,
    /// Cap on the returned text, in characters.
    pub max_chars: usize,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            top_k_results: 3,
            max_chars: 4000,
            timeout_secs: 10,
        }
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ragent", "ragent")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".ragent").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGENT_`)
/// 3. Workspace-local config (`.ragent/config.toml`)
/// 4. User config (`~/.config/ragent/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RagentConfig>,
) -> Result<RagentConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RagentConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RAGENT_LLM__MODEL, RAGENT_CHUNKING__CHUNK_SIZE, etc.
    figment = figment.merge(Env::prefixed("RAGENT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagentConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.agent.max_turns, 6);
        assert!(!config.agent.enabled);
        assert_eq!(config.knowledge.top_k_results, 3);
        assert_eq!(config.knowledge.lang, "en");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_chunking() {
        let mut config = RagentConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_k() {
        let mut config = RagentConfig::default();
        config.retrieval.k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = RagentConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        let toml_str = config.to_toml().unwrap();
        assert!(!toml_str.contains("sk-secret"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = RagentConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: RagentConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.chunking, config.chunking);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = RagentConfig::default();
        overrides.llm.model = "llama3.1".to_string();
        overrides.retrieval.k = 8;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.retrieval.k, 8);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ragent_dir = dir.path().join(".ragent");
        std::fs::create_dir_all(&ragent_dir).unwrap();
        std::fs::write(
            ragent_dir.join("config.toml"),
            r#"
[chunking]
chunk_size = 800
chunk_overlap = 50

[agent]
enabled = true
max_turns = 4
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert!(config.agent.enabled);
        assert_eq!(config.agent.max_turns, 4);
        // Untouched sections keep their defaults.
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_workspace_config_path() {
        let path = workspace_config_path(Path::new("/tmp/project"));
        assert_eq!(path, PathBuf::from("/tmp/project/.ragent/config.toml"));
    }
}
