//! cwscan worker CLI
//!
//! # Usage
//!
//! ```bash
//! # Poll the parsing queue until Ctrl-C
//! cwscan-worker --config worker.yaml run
//!
//! # Queue a source bundle, then process it once
//! cwscan-worker enqueue contract.zip --address juno1... --code-id 42
//! cwscan-worker tick
//!
//! # Inspect a project or a job
//! cwscan-worker analyze ./contracts/cw20-base
//! cwscan-worker status 3f2a...
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use cwscan_ir::analyze_project;
use cwscan_orchestration::{
    build_producer, read_crate_name, InMemoryBackend, LifecycleManager, WorkerConfig,
    WorkerContext,
};
use cwscan_storage::JobRecordUpdate;
use serde_json::json;
use std::env;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "cwscan-worker")]
#[command(about = "Contract schema extraction worker", long_about = None)]
struct Cli {
    /// Worker configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use in-memory stores instead of the SQLite database
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the queue until interrupted
    Run,

    /// Process at most one job
    Tick,

    /// Upload a source bundle and queue it for parsing
    Enqueue {
        /// Zip archive of the contract sources
        archive: PathBuf,

        /// Package to analyze when the archive is a workspace
        #[arg(long)]
        crate_name: Option<String>,

        /// Contract address
        #[arg(long)]
        address: Option<String>,

        /// Code id of the deployed contract
        #[arg(long)]
        code_id: Option<String>,
    },

    /// Print the entry point bindings of a project
    Analyze {
        /// Project directory (containing Cargo.toml)
        dir: PathBuf,

        /// Crate name, read from Cargo.toml when omitted
        #[arg(long)]
        crate_name: Option<String>,
    },

    /// Print the job record of a source
    Status {
        source_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = WorkerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => {
            // Connects on the first interval, retrying while the database is unreachable
            let mut manager = if cli.in_memory {
                manager(config, true)?
            } else {
                LifecycleManager::new(config)
            };
            manager
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    }
                })
                .await;
        }
        Commands::Tick => {
            let outcome = manager(config, cli.in_memory)?.tick().await;
            println!("{:?}", outcome);
        }
        Commands::Enqueue {
            archive,
            crate_name,
            address,
            code_id,
        } => {
            let ctx = context(&config, cli.in_memory)?;
            let data = tokio::fs::read(&archive)
                .await
                .with_context(|| format!("failed to read {}", archive.display()))?;

            let mut metadata = serde_json::Map::new();
            if let Some(crate_name) = crate_name {
                metadata.insert("crateName".to_string(), json!(crate_name));
            }
            if let Some(address) = address {
                metadata.insert("address".to_string(), json!(address));
            }
            if let Some(code_id) = code_id {
                let value = code_id
                    .parse::<u64>()
                    .map(|id| json!(id))
                    .unwrap_or_else(|_| json!(code_id));
                metadata.insert("codeID".to_string(), value);
            }

            let source_id = ctx
                .sources
                .upload("source.zip", &data, serde_json::Value::Object(metadata))
                .await?;
            ctx.results
                .update_job_record(&source_id, &JobRecordUpdate::default())
                .await?;
            ctx.queue.add(&source_id).await?;

            info!("Queued source {} ({} bytes)", source_id, data.len());
            println!("{}", source_id);
        }
        Commands::Analyze { dir, crate_name } => {
            let crate_name = match crate_name {
                Some(name) => name,
                None => read_crate_name(&dir).await?,
            };
            let producer = build_producer(&config);
            let bindings = analyze_project(&dir, &crate_name, producer.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&bindings)?);
        }
        Commands::Status { source_id } => {
            let ctx = context(&config, cli.in_memory)?;
            match ctx.results.get_job_record(&source_id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("no job record for {}", source_id),
            }
        }
    }

    Ok(())
}

fn context(config: &WorkerConfig, in_memory: bool) -> anyhow::Result<WorkerContext> {
    if in_memory {
        return Ok(InMemoryBackend::new(config).context(config));
    }
    Ok(WorkerContext::connect(config)?)
}

fn manager(config: WorkerConfig, in_memory: bool) -> anyhow::Result<LifecycleManager> {
    let ctx = context(&config, in_memory)?;
    Ok(LifecycleManager::with_context(config, ctx))
}
