use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use argopipe::config::Config;
use argopipe::embedding::local::LocalEmbeddingProvider;
use argopipe::embedding::EmbeddingProvider;
use argopipe::ingest::run_ingest;
use argopipe::llm::gemini::GeminiProvider;
use argopipe::llm::GenerativeProvider;
use argopipe::logging;
use argopipe::pipeline::IndexingPipeline;
use argopipe::server::{run_server, AppState};
use argopipe::store::postgres::PostgresProfileStore;

#[derive(Parser)]
#[command(name = "argopipe", version, about = "ARGO float ingestion, summarization, and query backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skip automatic database migration on startup
    #[arg(long)]
    skip_migrate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit
    Migrate,
    /// Ingest every .nc profile file from a directory into the profile table
    Ingest {
        /// Directory containing ARGO NetCDF profile files
        dir: PathBuf,
    },
    /// Summarize profile rows with the LLM and index them into the vector table
    Index,
    /// Serve the HTTP query API (trajectories + analyze)
    Serve,
}

/// Create the Gemini provider from configuration.
///
/// A missing API key is a fatal startup error for the subcommands that need
/// the model (index, serve).
fn create_llm_provider(config: &Config) -> Result<Arc<dyn GenerativeProvider>> {
    let api_key = config.gemini.api_key.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "Gemini API key required. \
             Set ARGOPIPE_GEMINI__API_KEY or gemini.api_key in argopipe.toml"
        )
    })?;
    let provider = GeminiProvider::new(
        api_key,
        config.gemini.model.clone(),
        config.gemini.base_url.clone(),
    )?;
    Ok(Arc::new(provider))
}

/// Create the local embedding provider (downloads model weights on first use).
async fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = LocalEmbeddingProvider::new(&config.embedding.cache_dir).await?;
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    logging::init_logging(&config);

    let run_migrations = !cli.skip_migrate;

    match cli.command {
        Commands::Migrate => {
            tracing::info!("Running database migrations...");
            let _store = PostgresProfileStore::new(&config.database_url, true).await?;
            println!("Migrations completed successfully.");
        }

        Commands::Ingest { dir } => {
            let store = PostgresProfileStore::new(&config.database_url, run_migrations).await?;
            tracing::info!(dir = %dir.display(), "Starting ingest");

            let report = run_ingest(&store, &dir).await?;
            println!(
                "Ingested {} rows from {} files ({} files skipped, {} cycles skipped).",
                report.rows_inserted, report.files_processed, report.files_skipped, report.cycles_skipped
            );
        }

        Commands::Index => {
            let store = Arc::new(PostgresProfileStore::new(&config.database_url, run_migrations).await?);
            let llm = create_llm_provider(&config)?;
            let embedder = create_embedding_provider(&config).await?;

            let pipeline = IndexingPipeline::new(
                store,
                llm,
                embedder,
                config.pipeline.page_size,
                PathBuf::from(&config.pipeline.checkpoint_path),
            );

            pipeline.run().await?;
            println!("Indexing run finished.");
        }

        Commands::Serve => {
            let store = Arc::new(PostgresProfileStore::new(&config.database_url, run_migrations).await?);
            let llm = create_llm_provider(&config)?;
            let embedder = create_embedding_provider(&config).await?;

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                model = %llm.model_name(),
                "Query service starting"
            );

            let state = AppState {
                store,
                llm,
                embedder,
                search_top_k: config.server.search_top_k,
            };

            run_server(state, &config.server.bind).await?;
        }
    }

    Ok(())
}
