//! CLI subcommand handlers.

use crate::Commands;
use ragent_core::{
    AnswerGenerator, Brain, Chunker, Embedder, RagWorkflow, RagentConfig, StuffingGenerator,
    VectorIndex, create_embedder, create_provider,
};
use ragent_tools::{WikipediaLookup, build_rag_agent};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: RagentConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            query,
            sources,
            agentic,
            k,
            json,
        } => handle_ask(&config, &query, &sources, agentic, k, json).await,
        Commands::Ingest { sources } => handle_ingest(&config, &sources).await,
        Commands::Config { init } => handle_config(&config, init, workspace),
    }
}

async fn handle_ask(
    config: &RagentConfig,
    query: &str,
    sources: &[String],
    agentic: bool,
    k: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    if k == 0 {
        anyhow::bail!("-k must be greater than 0");
    }

    let chunker = Chunker::new(config.chunking.clone())?;
    let chunks = chunker.process(sources).await?;
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding));
    let index = VectorIndex::new(embedder);
    let retriever = Arc::new(index.create_retriever(chunks, k).await?);

    let provider = create_provider(&config.llm)?;
    let brain = Brain::new(provider)
        .with_temperature(config.llm.temperature)
        .with_max_tokens(Some(config.llm.max_tokens))
        .with_retry(config.llm.retry.clone());

    let generator: Arc<dyn AnswerGenerator> = if agentic || config.agent.enabled {
        let knowledge = Arc::new(WikipediaLookup::new(&config.knowledge));
        Arc::new(build_rag_agent(
            brain,
            retriever.clone(),
            knowledge,
            &config.agent,
        )?)
    } else {
        Arc::new(StuffingGenerator::new(brain))
    };

    let workflow = RagWorkflow::new(retriever, generator);
    let state = workflow.run(query).await?;
    info!(
        docs = state.retrieved_docs.len(),
        response_chars = state.response.len(),
        "Answered"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", state.response);
    }
    Ok(())
}

async fn handle_ingest(config: &RagentConfig, sources: &[String]) -> anyhow::Result<()> {
    let chunker = Chunker::new(config.chunking.clone())?;
    let mut total_docs = 0;
    let mut total_chunks = 0;

    for source in sources {
        let docs = chunker.loader().load_documents(&[source]).await?;
        let chunks = chunker.split_documents(&docs);
        let chars: usize = chunks.iter().map(|c| c.char_len()).sum();
        println!(
            "{source}: {} document(s), {} chunk(s), {} chars",
            docs.len(),
            chunks.len(),
            chars
        );
        total_docs += docs.len();
        total_chunks += chunks.len();
    }

    println!(
        "total: {} document(s), {} chunk(s) (chunk_size={}, chunk_overlap={})",
        total_docs, total_chunks, config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    Ok(())
}

fn handle_config(config: &RagentConfig, init: bool, workspace: &Path) -> anyhow::Result<()> {
    if !init {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let config_path = ragent_core::config::workspace_config_path(workspace);
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, RagentConfig::default().to_toml()?)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}
