use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use strata_store::{FulltextIndexApi, IndexApi, ObjectApi, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let storage = open(&cli.datastore, cli.url.as_deref()).await?;
    let outcome = run(&storage, cli.command).await;
    if let Err(err) = storage.close().await {
        log::warn!("closing the connection pool failed: {err}");
    }
    outcome
}

#[derive(Parser)]
#[command(author, version, about = "Operator utilities for strata datastores")]
struct Cli {
    /// Directory holding `strata.json` and the default sqlite file.
    #[arg(long, default_value = ".strata", global = true)]
    datastore: PathBuf,
    /// Connection string overriding the datastore config.
    #[arg(long, env = "STRATA_DATABASE_URL", global = true)]
    url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or migrate the object tables.
    Setup,
    /// Print the backend server version.
    ServerVersion,
    /// Count the objects stored under an extent.
    ExtentCount { extent: String },
    /// Drop and recreate an index table.
    CreateIndex {
        name: String,
        #[arg(long, value_enum, default_value_t = IndexKind::Exact)]
        kind: IndexKind,
    },
    /// Drop an index table of any kind.
    DropIndex { name: String },
    /// Query an exact or full-text index and print the hits.
    Search {
        index: String,
        term: String,
        #[arg(long, value_enum, default_value_t = IndexKind::Exact)]
        kind: IndexKind,
        #[arg(long)]
        limit: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum IndexKind {
    Exact,
    Fulltext,
}

async fn open(datastore: &Path, url: Option<&str>) -> Result<Storage> {
    Storage::open(datastore, url)
        .await
        .with_context(|| format!("open datastore {}", datastore.display()))
}

async fn run(storage: &Storage, command: Command) -> Result<()> {
    match command {
        Command::Setup => {
            storage.setup().await?;
            println!("schema is up to date");
        }
        Command::ServerVersion => {
            println!("{}", storage.server_version().await?);
        }
        Command::ExtentCount { extent } => {
            println!("{}", storage.extent_count(&extent).await?);
        }
        Command::CreateIndex { name, kind } => {
            match kind {
                IndexKind::Exact => storage.create_index(&name).await?,
                IndexKind::Fulltext => storage.create_fulltext_index(&name).await?,
            }
            println!("created {kind:?} index {name}");
        }
        Command::DropIndex { name } => {
            storage.drop_index(&name).await?;
            println!("dropped index {name}");
        }
        Command::Search {
            index,
            term,
            kind,
            limit,
        } => match kind {
            IndexKind::Exact => {
                for hit in storage.retrieve_from_index(&index, &term, false, limit).await? {
                    println!("{}\t{}", hit.target_id, hit.relevance);
                }
            }
            IndexKind::Fulltext => {
                for hit in storage
                    .retrieve_from_fulltext_index(&index, &term, None, limit)
                    .await?
                {
                    println!("{}\t{:.4}", hit.target_id, hit.relevance);
                }
            }
        },
    }
    Ok(())
}
