use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kbenrich::db::{migrate, Db};
use kbenrich::kb::{parse_jsonl, KnowledgeBaseAdapter, SqliteStore, SyncParams, WriteMode};
use kbenrich::walker::discover_documents;
use kbenrich::{Config, KbenrichError, KnowledgePipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "kbenrich")]
#[command(version, about = "Enrich documents and keep a knowledge base in sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a file or a directory of text documents into the knowledge base
    Process {
        path: PathBuf,
    },
    /// Synchronize rows from a JSON Lines file
    Sync {
        rows: PathBuf,

        /// Source name (defaults to [sync].source in config)
        #[arg(short, long)]
        source: Option<String>,

        /// Rewrite every row and remove rows missing from the input
        #[arg(long)]
        full_reload: bool,
    },
    /// Print record counts by business unit, document type and source
    Stats,
    /// Verify configuration and database schema
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.kbenrich.log_level.to_lowercase())
    ).init();

    log::info!("Starting kbenrich v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    match cli.command.unwrap_or(Command::Verify) {
        Command::Process { path } => run_process(&config, &path).await,
        Command::Sync { rows, source, full_reload } => run_sync(&config, &rows, source, full_reload).await,
        Command::Stats => run_stats(&config).await,
        Command::Verify => run_verification(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let db = Db::new(config.db_path());
    let store = SqliteStore::open(db, config.migrations_dir())
        .await
        .context("Failed to open knowledge base")?;
    Ok(Arc::new(store))
}

async fn build_pipeline(config: &Config) -> Result<KnowledgePipeline> {
    let store = open_store(config).await?;
    let adapter = Arc::new(KnowledgeBaseAdapter::new(store.clone()).with_content_store(store));
    let processing = Arc::new(config.processing_config()?);

    let mut pipeline = KnowledgePipeline::new(
        adapter,
        processing,
        config.kbenrich.enable_enhanced_knowledge_processing,
    )?;
    if let Some(timeout) = config.processing_timeout() {
        pipeline = pipeline.with_timeout(timeout);
    }
    Ok(pipeline)
}

async fn run_process(config: &Config, path: &Path) -> Result<()> {
    let start = Instant::now();
    let pipeline = build_pipeline(config).await?;
    let files = discover_documents(path)?;

    if files.is_empty() {
        log::warn!("No documents found in {}", path.display());
        return Ok(());
    }

    let mut stored = 0usize;
    let mut records = 0usize;
    let mut degraded = 0usize;
    let mut failed = 0usize;

    for file in &files {
        let input = match file.to_input() {
            Ok(input) => input,
            Err(e) => {
                log::warn!("Skipping {}: {}", file.relative_path, e);
                failed += 1;
                continue;
            }
        };

        match pipeline.submit(input, WriteMode::Upsert).await {
            Ok(outcome) => {
                stored += 1;
                records += outcome.records_written;
                if outcome.degraded {
                    degraded += 1;
                }
            }
            Err(e) => {
                log::error!("Failed to store {}: {}", file.relative_path, e);
                failed += 1;
            }
        }
    }

    println!(
        "Processed {} documents: stored={}, records={}, degraded={}, failed={} ({:.2}s)",
        files.len(),
        stored,
        records,
        degraded,
        failed,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn run_sync(config: &Config, rows_path: &Path, source: Option<String>, full_reload: bool) -> Result<()> {
    let text = std::fs::read_to_string(rows_path)
        .with_context(|| format!("Failed to read rows file: {}", rows_path.display()))?;
    let rows = parse_jsonl(&text)?;

    let mut params = SyncParams {
        source: source.or_else(|| config.sync.source.clone()),
        full_reload: false,
    };
    if full_reload {
        params = params.full_reload();
    }

    let pipeline = build_pipeline(config).await?;
    let summary = pipeline.synchronize(rows, params).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;

    println!("\n=== kbenrich knowledge base ===\n");
    println!("Records:   {}", stats.total_records);
    println!("Documents: {}", stats.documents);

    for (title, counts) in [
        ("Business units", &stats.by_business_unit),
        ("Document types", &stats.by_document_type),
        ("Sources", &stats.by_source),
    ] {
        println!("\n{}:", title);
        if counts.is_empty() {
            println!("  (none)");
        }
        for (name, count) in counts {
            println!("  {:<24} {}", name, count);
        }
    }
    Ok(())
}

async fn run_verification(config: &Config) -> Result<()> {
    let processing = config.processing_config()?;
    log::info!(
        "Processing config OK (enabled={}, enhanced processing={})",
        processing.processing.enabled,
        config.kbenrich.enable_enhanced_knowledge_processing
    );

    let store = open_store(config).await?;
    verify_database_schema(store.db()).await?;

    println!("kbenrich configuration and schema verified");
    Ok(())
}

/// Check that the expected tables, indexes and pragmas are in place.
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        for table in ["knowledge_records", "schema_migrations"] {
            let exists = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name = ?1")?
                .exists([table])?;
            if !exists {
                return Err(KbenrichError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        for index in ["idx_knowledge_records_doc_id", "idx_knowledge_records_source"] {
            let exists = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name = ?1")?
                .exists([index])?;
            if exists {
                log::debug!("✓ Index exists: {}", index);
            } else {
                log::warn!("Index not found: {}", index);
            }
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        if migrate::column_exists(conn, "knowledge_records", "content_hash")? {
            log::info!("✓ content_hash column present");
        } else {
            log::info!("content_hash column not yet created (added on first sync)");
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(KbenrichError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(KbenrichError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    Ok(())
}
