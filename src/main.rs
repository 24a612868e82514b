use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_records::Collection;
use std::path::Path;
use std::sync::Arc;
use topic_consensus::TrustTier;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topicsync::config::Config;
use topicsync::jobs::{Job, MemoryJobQueue};
use topicsync::processors::ProcessorRegistry;
use topicsync::store::{MirrorRead, MirrorStore, SqliteMirrorStore};
use topicsync::sync::{DirSnapshotFetcher, MemoryPendingBuffer, SyncCoordinator, SyncOutcome};
use topicsync::topics::{
    recompute_current_version, BlobFetcher, CachedBlobFetcher, ContributionAccountant,
    DirBlobFetcher,
};

#[derive(Parser)]
#[command(name = "topicsync")]
#[command(about = "Mirror record repositories and resolve topic versions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (default: ~/.topicsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one or more subjects from their snapshots
    Sync {
        subjects: Vec<String>,
        /// Restrict to these collections (NSID or name); repeatable
        #[arg(long = "collection", value_parser = parse_collection)]
        collections: Vec<Collection>,
    },
    /// Re-resolve a topic's current version and its contributions
    Recompute { topic: String },
    /// Show a subject's mirror status
    Status { subject: String },
    /// Return a subject to idle, clearing a terminal status
    Reset { subject: String },
    /// Set an author's trust tier
    SetTier {
        author: String,
        #[arg(value_parser = parse_tier)]
        tier: TrustTier,
    },
    /// Set the tier a reject vote needs to veto versions of a topic
    Protect {
        topic: String,
        #[arg(value_parser = parse_tier)]
        tier: TrustTier,
    },
    /// Print the JSON Schema of the config file
    ConfigSchema,
}

fn parse_collection(s: &str) -> Result<Collection, String> {
    Collection::from_nsid(s)
        .or_else(|| serde_json::from_value(serde_json::Value::String(s.to_string())).ok())
        .ok_or_else(|| format!("unknown collection '{s}'"))
}

fn parse_tier(s: &str) -> Result<TrustTier, String> {
    TrustTier::parse(s).ok_or_else(|| format!("unknown tier '{s}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ConfigSchema = cli.command {
        println!("{}", Config::json_schema()?);
        return Ok(());
    }

    let mut config = Config::load_or_default(cli.config.as_deref())
        .with_context(|| "Failed to load config")?;
    config
        .expand_paths()
        .with_context(|| "Failed to expand paths in config")?;

    init_logging(&config.logging.level)?;

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    let store: Arc<SqliteMirrorStore> = Arc::new(
        SqliteMirrorStore::open(Path::new(&config.store.db_path))
            .with_context(|| format!("Failed to open mirror at {}", config.store.db_path))?,
    );

    match cli.command {
        Commands::Sync {
            subjects,
            collections,
        } => run_sync(&config, store, subjects, collections).await,
        Commands::Recompute { topic } => {
            {
                let mut tx = store.begin()?;
                let current = recompute_current_version(tx.as_mut(), &topic, &config.consensus)?;
                tx.commit()?;
                println!("current version: {}", current.as_deref().unwrap_or("none"));
            }
            let accountant = accountant(&config, store);
            let stats = accountant.update_topic(&topic).await?;
            for s in stats {
                println!(
                    "{}  +{} -{}  all={:.4} monetized={:.4}",
                    s.uri, s.chars_added, s.chars_deleted, s.contribution_all, s.contribution_monetized
                );
            }
            Ok(())
        }
        Commands::Status { subject } => {
            match store.mirror_status(&subject)? {
                Some(status) => println!(
                    "{}: {} (run {}, {} transitions, updated {})",
                    status.subject,
                    status.status,
                    status.run_id.as_deref().unwrap_or("-"),
                    status.transitions,
                    status.updated_at.to_rfc3339()
                ),
                None => println!("{subject}: never synced"),
            }
            Ok(())
        }
        Commands::Reset { subject } => {
            store.reset_status(&subject)?;
            println!("{subject}: idle");
            Ok(())
        }
        Commands::SetTier { author, tier } => {
            store.set_author_tier(&author, tier)?;
            println!("{author}: {tier}");
            Ok(())
        }
        Commands::Protect { topic, tier } => {
            store.set_topic_protection(&topic, tier)?;
            // A protection change can flip which rejections veto.
            let mut tx = store.begin()?;
            recompute_current_version(tx.as_mut(), &topic, &config.consensus)?;
            tx.commit()?;
            println!("{topic}: protected at {tier}");
            Ok(())
        }
        Commands::ConfigSchema => Ok(()),
    }
}

fn accountant(config: &Config, store: Arc<SqliteMirrorStore>) -> ContributionAccountant {
    let blobs: Arc<dyn BlobFetcher> = Arc::new(CachedBlobFetcher::new(
        Arc::new(DirBlobFetcher::new(&config.blobs.dir)),
        config.blobs.cache_entries,
    ));
    ContributionAccountant::new(
        store,
        blobs,
        config.consensus.clone(),
        config.contribution.clone(),
    )
}

async fn run_sync(
    config: &Config,
    store: Arc<SqliteMirrorStore>,
    subjects: Vec<String>,
    collections: Vec<Collection>,
) -> Result<()> {
    if subjects.is_empty() {
        anyhow::bail!("No subjects given");
    }
    tracing::info!("Starting topicsync v{}", env!("CARGO_PKG_VERSION"));

    let jobs = Arc::new(MemoryJobQueue::new());
    let coordinator = SyncCoordinator::new(
        store.clone(),
        ProcessorRegistry::new(config.consensus.clone()),
        Arc::new(DirSnapshotFetcher::new(
            &config.snapshots.dir,
            config.snapshots.max_bytes,
        )),
        Arc::new(MemoryPendingBuffer::new()),
        jobs.clone(),
        config.sync.clone(),
    );

    let filter = (!collections.is_empty()).then_some(collections.as_slice());
    let results = coordinator.sync_many(&subjects, filter).await;

    let mut failures = 0;
    for (subject, result) in &results {
        match result {
            Ok(SyncOutcome::Finished(report)) => println!(
                "{subject}: {} (+{} -{} ={} invalid {} pending {} failed batches {})",
                report.status,
                report.upserted,
                report.deleted,
                report.skipped_unchanged,
                report.invalid,
                report.pending_events,
                report.failed_batches
            ),
            Ok(SyncOutcome::Skipped { status }) => println!("{subject}: skipped ({status})"),
            Err(e) => {
                failures += 1;
                println!("{subject}: error: {e:#}");
            }
        }
    }

    let accountant = accountant(config, store);
    for job in jobs.drain().await {
        match &job {
            Job::UpdateTopicContributions { topic_id } => {
                if let Err(e) = accountant.update_topic(topic_id).await {
                    tracing::warn!(topic_id = topic_id.as_str(), "Contribution update failed: {e:#}");
                }
            }
            other => tracing::info!(job = other.name(), payload = %other.payload(), "Job"),
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} subjects failed", results.len());
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    Ok(())
}
