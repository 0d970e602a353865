use std::io::Write;
use std::path::{Path, PathBuf};

use ragmark::chunking::Chunker;
use ragmark::clean::{clean_export_file, prepare_for_embedding};
use ragmark::cli::{Cli, Commands, ConfigAction, DataAction, ModelsAction};
use ragmark::config::Config;
use ragmark::corpus::{build_doc_id_map, load_corpus};
use ragmark::embedding::{EmbeddingResolver, RegistryResolver};
use ragmark::error::{RagmarkError, Result};
use ragmark::eval::{load_run_metrics, render_metrics_report, BatchRunner};
use ragmark::llm::build_generator;
use ragmark::pipeline::{context_token_budget, RagPipeline, Retriever};
use ragmark::registry::VerifyStatus;

/// Chunking defaults for the interactive chat index
const CHAT_CHUNK_SIZE: usize = 1000;
const CHAT_CHUNK_OVERLAP: usize = 200;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Evaluate => {
            cmd_evaluate(cli.config)?;
        }
        Commands::Chat { k } => {
            cmd_chat(cli.config, k)?;
        }
        Commands::Report { metrics, output } => {
            cmd_report(&metrics, &output)?;
        }
        Commands::Data { action } => {
            cmd_data(action)?;
        }
        Commands::Models { action } => {
            cmd_models(cli.config, action)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "ragmark=debug"
    } else {
        "ragmark=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_evaluate(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting evaluation sweep...");

    let config = load_config(config_path)?;
    let mut runner = BatchRunner::new(config)?;

    let rt = runtime()?;
    let summary = rt.block_on(runner.run())?;

    println!("✓ Sweep finished: {} runs", summary.total_runs);
    match &summary.best_run_id {
        Some(best) => println!("  Best run: {}", best),
        None => println!("  No completed runs"),
    }

    Ok(())
}

fn cmd_chat(config_path: Option<PathBuf>, k: usize) -> Result<()> {
    let config = load_config(config_path)?;

    let spec = config
        .sweeps
        .embedding_models
        .first()
        .cloned()
        .ok_or_else(|| RagmarkError::Config("No embedding models configured".to_string()))?;

    tracing::info!("Starting chat with the following configuration:");
    tracing::info!("  Generator: {}", config.frozen.generator.llm_name);
    tracing::info!("  Embedding model: {}", spec.name);
    tracing::info!("  k: {}", k);

    // Build the ephemeral index over the document corpus
    let documents = load_corpus(&config.dataset.document_source)?;
    let (key_to_id, _) = build_doc_id_map(&documents);
    let chunker = Chunker::from_config(config.dataset.document_source.tokenizer_json.as_deref());
    let chunks = chunker.chunk(&documents, CHAT_CHUNK_SIZE, CHAT_CHUNK_OVERLAP, &key_to_id)?;
    tracing::info!(
        "Indexed {} chunks from {} documents",
        chunks.len(),
        documents.len()
    );

    let resolver = RegistryResolver::new(config.registry.clone());
    let provider = resolver.resolve(&spec)?;
    let retriever = Retriever::build(provider, chunks)?;

    let generator = build_generator(&config.frozen.generator, &config.registry)?;
    let budget = context_token_budget(
        config.frozen.generator.n_ctx,
        config.frozen.generator.max_new_tokens,
        config.frozen.generator.n_ctx_margin,
    );
    let pipeline = RagPipeline::new(retriever, generator, k, budget);

    println!(
        "Starting CLI chat with {}. Type 'exit' or 'quit' to end.",
        config.frozen.generator.llm_name
    );

    let rt = runtime()?;
    loop {
        print!("You: ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| RagmarkError::Io {
                source: e,
                context: "Failed to read from stdin".to_string(),
            })?;
        if read == 0 {
            break;
        }

        let question = line.trim_end_matches(['\r', '\n']);
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match rt.block_on(pipeline.answer(question, chunker.tokenizer())) {
            Ok(result) => println!("Assistant: {}", result.answer.trim()),
            Err(e) => {
                println!("An error occurred: {}", e);
                break;
            }
        }
    }
    println!("\nChat ended.");

    Ok(())
}

fn cmd_report(metrics_path: &Path, output: &Path) -> Result<()> {
    let metrics = load_run_metrics(metrics_path)?;
    let report = render_metrics_report(&metrics);

    std::fs::write(output, &report).map_err(|e| RagmarkError::Io {
        source: e,
        context: format!("Failed to write report: {:?}", output),
    })?;

    println!("Report generated successfully. Saved to {}", output.display());
    println!("\n{}", report);

    Ok(())
}

fn cmd_data(action: DataAction) -> Result<()> {
    match action {
        DataAction::Clean { input, output } => {
            let count = clean_export_file(&input, &output)?;
            println!("✓ Cleaned {} records to {}", count, output.display());
        }
        DataAction::Prepare { input, output } => {
            let count = prepare_for_embedding(&input, &output)?;
            if count == 0 {
                println!("No records to prepare");
            } else {
                println!("✓ Prepared {} records to {}", count, output.display());
            }
        }
    }

    Ok(())
}

fn cmd_models(config_path: Option<PathBuf>, action: ModelsAction) -> Result<()> {
    match action {
        ModelsAction::Verify => {
            let config = load_config(config_path)?;
            let entries = config.registry.verify();

            if entries.is_empty() {
                println!("No models declared in the registry");
                return Ok(());
            }

            let mut missing = 0usize;
            for entry in &entries {
                match &entry.status {
                    VerifyStatus::Present => {
                        if entry.path.as_os_str().is_empty() {
                            println!("✓ Verified: {} (builtin, downloads on first use)", entry.name);
                        } else {
                            println!("✓ Verified: {}", entry.path.display());
                        }
                    }
                    VerifyStatus::Sharded(shards) => {
                        println!(
                            "✓ Sharded model {} (assembled at runtime):",
                            entry.name
                        );
                        for shard in shards {
                            println!("   - {}", shard.display());
                        }
                    }
                    VerifyStatus::Missing => {
                        missing += 1;
                        println!("✗ Missing: {}", entry.path.display());
                    }
                }
            }

            if missing == 0 {
                println!("\nAll models verified");
            } else {
                println!("\n{} model(s) missing. Download them before running a sweep.", missing);
            }
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let value = serde_json::to_value(&config).map_err(|e| RagmarkError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match &section {
                Some(name) => {
                    value
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RagmarkError::InvalidConfigValue {
                            path: name.clone(),
                            message: "Unknown config section".to_string(),
                        })?
                }
                None => value,
            };

            let rendered =
                serde_json::to_string_pretty(&shown).map_err(|e| RagmarkError::Json {
                    source: e,
                    context: "Failed to serialize config".to_string(),
                })?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagmarkError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            // Save default config
            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ragmark config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| RagmarkError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}
