use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use newswire_storage::ArticleStore;
use newswire_sync::SyncConfig;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "newswire")]
#[command(about = "Newswire AI news aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every enabled source once and update the article store.
    Sync,
    /// Serve the dashboard and JSON API.
    Serve,
    /// Run ingestion on the configured cron schedule until interrupted.
    Schedule,
    /// Print what the article store currently holds.
    Status,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newswire=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = newswire_sync::run_ingest_once_from_env().await?;
            println!(
                "sync complete: run_id={} sources={} fetched={} retained={} stored={} errors={}",
                summary.run_id,
                summary.enabled_sources,
                summary.fetched,
                summary.retained,
                summary.stored,
                summary.failures.len()
            );
            for failure in &summary.failures {
                warn!(source_id = %failure.source_id, message = %failure.message, "source failed during sync");
            }
            if let Some(err) = summary.save_error {
                bail!("sync could not save articles: {err}");
            }
        }
        Commands::Serve => {
            newswire_web::serve_from_env().await?;
        }
        Commands::Schedule => {
            newswire_sync::run_scheduler_from_env().await?;
        }
        Commands::Status => {
            let config = SyncConfig::from_env();
            let store = ArticleStore::with_config(config.store_config());
            let outcome = store.load_outcome().await?;
            let saved = outcome.snapshot.articles.iter().filter(|a| a.saved).count();
            println!(
                "store={} loaded_from={:?} articles={} saved={} last_updated={}",
                store.path().display(),
                outcome.source,
                outcome.snapshot.articles.len(),
                saved,
                outcome.snapshot.last_updated.to_rfc3339()
            );
        }
    }

    Ok(())
}
