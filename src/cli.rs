use crate::config::Config;
use crate::memory::{
    MemoryEngine, RecordFilter, RecordInput, RecordKind, SearchMode, SearchQuery, WriteReceipt,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// `engram` - Local, file-backed memory engine for AI-agent workspaces.
#[derive(Parser, Debug)]
#[command(name = "engram")]
#[command(version = "0.1.0")]
#[command(about = "A local, file-backed agent memory store.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a record (insert-or-update by key)
    Save {
        /// Unique record key
        key: String,

        /// Record value (stored verbatim; pass JSON if you want JSON)
        value: String,

        /// Record kind (conversation, knowledge, goal, task, decision, custom)
        #[arg(short, long, default_value = "custom")]
        kind: String,

        /// Comma-separated tags
        #[arg(short, long)]
        tags: Option<String>,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Load records by key, id, tags or kind
    Load {
        /// Exact key
        #[arg(short, long)]
        key: Option<String>,

        /// Record id
        #[arg(long)]
        id: Option<String>,

        /// Tag filter (repeatable; all must match)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Kind filter
        #[arg(long)]
        kind: Option<String>,

        /// Maximum number of records
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Search records (exact, semantic or hybrid)
    Search {
        /// Query text for semantic/hybrid search
        query: Option<String>,

        /// Key substring for exact search
        #[arg(short, long)]
        key: Option<String>,

        /// Tag filter (repeatable; all must match)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Kind filter
        #[arg(long)]
        kind: Option<String>,

        /// Search mode (exact, semantic, hybrid)
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Delete records by key, id, tags or kind
    Delete {
        /// Exact key
        #[arg(short, long)]
        key: Option<String>,

        /// Record id
        #[arg(long)]
        id: Option<String>,

        /// Tag filter (repeatable; all must match)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Kind filter
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show storage statistics
    Stats,

    /// Replay unconsumed WAL entries into the record store
    Replay,

    /// Re-run the full fan-out for unacknowledged WAL entries
    Recover,

    /// Manage snapshots of the engine tree
    Backup {
        #[command(subcommand)]
        backup_command: BackupCommands,
    },

    /// Move old mirror files into the archive tree
    Archive {
        /// Age threshold in days
        #[arg(short, long, default_value = "90")]
        days: u32,
    },

    /// Free space once the tree exceeds its size budget
    Cleanup {
        /// Size budget in bytes (defaults to the configured budget)
        #[arg(long)]
        max_size_bytes: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a snapshot
    Create {
        /// Snapshot kind, used as the filename prefix
        #[arg(short, long, default_value = "daily")]
        kind: String,
    },

    /// List snapshots, newest first
    List,

    /// Extract a snapshot over the engine tree
    Restore {
        /// Path to a .tar.gz snapshot
        path: PathBuf,
    },
}

fn parse_kind(kind: Option<&str>) -> Result<Option<RecordKind>> {
    match kind {
        Some(raw) => Ok(Some(RecordKind::from_str(raw)?)),
        None => Ok(None),
    }
}

fn build_filter(
    key: Option<String>,
    id: Option<String>,
    tags: Vec<String>,
    kind: Option<String>,
) -> Result<RecordFilter> {
    let mut filter = RecordFilter::new();
    if let Some(key) = key {
        filter = filter.by_key(key);
    }
    if let Some(id) = id {
        filter = filter.by_id(id);
    }
    if !tags.is_empty() {
        filter = filter.by_tags(tags);
    }
    if let Some(kind) = parse_kind(kind.as_deref())? {
        filter = filter.by_kind(kind);
    }
    Ok(filter)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let engine = MemoryEngine::open(&config).await?;
    let outcome = run(&engine, cli.command, &config).await;
    engine.close().await?;
    outcome
}

#[allow(clippy::too_many_lines)]
async fn run(engine: &MemoryEngine, command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Save {
            key,
            value,
            kind,
            tags,
            metadata,
        } => {
            let kind = RecordKind::from_str(&kind)?;
            let tags: Vec<String> = tags
                .map(|t| {
                    t.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::json!({}),
            };

            let input = RecordInput::new(key, value)
                .with_kind(kind)
                .with_tags(tags)
                .with_metadata(metadata);

            match engine.save(input).await? {
                WriteReceipt::Saved { id } => println!("saved: {id}"),
                WriteReceipt::Queued => println!("queued"),
                WriteReceipt::Deleted { .. } => unreachable!("save cannot delete"),
            }
        }

        Commands::Load {
            key,
            id,
            tag,
            kind,
            limit,
        } => {
            let filter = build_filter(key, id, tag, kind)?;
            let records = engine.load(&filter, limit).await?;
            print_json(&records)?;
        }

        Commands::Search {
            query,
            key,
            tag,
            kind,
            mode,
            limit,
        } => {
            let mut search = SearchQuery::new(SearchMode::from_str(&mode)?)
                .with_tags(tag)
                .with_limit(limit);
            if let Some(query) = query {
                search = search.with_query(query);
            }
            if let Some(key) = key {
                search = search.with_key(key);
            }
            if let Some(kind) = parse_kind(kind.as_deref())? {
                search = search.with_kind(kind);
            }

            let results = engine.search(&search).await?;
            print_json(&results)?;
        }

        Commands::Delete { key, id, tag, kind } => {
            let filter = build_filter(key, id, tag, kind)?;
            if filter.is_empty() {
                anyhow::bail!("refusing to delete everything; pass at least one filter");
            }
            match engine.delete(filter).await? {
                WriteReceipt::Deleted { count } => println!("deleted: {count}"),
                WriteReceipt::Queued => println!("queued"),
                WriteReceipt::Saved { .. } => unreachable!("delete cannot save"),
            }
        }

        Commands::Stats => {
            let stats = engine.stats().await?;
            print_json(&stats)?;
        }

        Commands::Replay => {
            let applied = engine.replay().await?;
            println!("replayed: {applied}");
        }

        Commands::Recover => {
            let applied = engine.recover().await?;
            println!("recovered: {applied}");
        }

        Commands::Backup { backup_command } => match backup_command {
            BackupCommands::Create { kind } => {
                let info = engine.backup().create_backup(&kind)?;
                print_json(&info)?;
            }
            BackupCommands::List => {
                let backups = engine.backup().list_backups()?;
                print_json(&backups)?;
            }
            BackupCommands::Restore { path } => {
                engine.backup().restore_backup(&path)?;
                println!("restored from {}", path.display());
            }
        },

        Commands::Archive { days } => {
            let moved = engine.backup().archive_old_data(days)?;
            println!("archived: {moved}");
        }

        Commands::Cleanup { max_size_bytes } => {
            let budget = max_size_bytes.unwrap_or(config.backup.max_size_bytes);
            let report = engine.backup().cleanup(budget)?;
            print_json(&report)?;
        }
    }

    Ok(())
}
