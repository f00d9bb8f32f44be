//! MiniCube - distributed in-memory OLAP cubes
//!
//! Single binary that provides:
//! - Local load-and-aggregate runs over a flat file
//! - An in-process cluster with shard assignment and scatter/gather queries

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use minicube_common::types::ExecutionMode;

mod cli;
mod config;

use cli::Aggregation;

#[derive(Parser)]
#[command(name = "minicube")]
#[command(author, version, about = "MiniCube - distributed in-memory OLAP cubes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "minicube.toml", env = "MINICUBE_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a tab-separated file into one cube and aggregate it
    Query {
        /// Data file with a header line
        #[arg(short, long)]
        data: PathBuf,

        /// Indicator column to sum
        #[arg(short, long)]
        indicator: String,

        /// Dimension column to group by
        #[arg(short, long)]
        group_by: Option<String>,

        /// Filter as JSON, e.g. {"dim_tranid": [1, 2]}
        #[arg(short, long)]
        filter: Option<String>,

        /// Only load rows inside this shard key
        #[arg(short, long)]
        shard_key: Option<String>,

        /// Scan on the calling thread only
        #[arg(long)]
        sequential: bool,
    },

    /// Start an in-process cluster over the configured source and aggregate across it
    Cluster {
        /// Number of nodes to start
        #[arg(short, long, default_value_t = 2)]
        nodes: usize,

        /// Shard keys handed out to the nodes, one each
        #[arg(short, long, value_delimiter = ',')]
        shard_keys: Vec<String>,

        /// Indicator column to sum
        #[arg(short, long)]
        indicator: String,

        /// Dimension column to group by
        #[arg(short, long)]
        group_by: Option<String>,

        /// Filter as JSON, e.g. {"dim_tranid": [1, 2]}
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("minicube=info".parse()?)
                .add_directive("minicube_storage=info".parse()?)
                .add_directive("minicube_cluster=info".parse()?),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            data,
            indicator,
            group_by,
            filter,
            shard_key,
            sequential,
        } => {
            let config = config::load(&cli.config).await?;
            let aggregation = Aggregation::new(indicator, group_by, filter.as_deref())?;
            let mode = ExecutionMode::from_parallel(config.cube.parallel && !sequential);
            info!("Running local query over {} ({:?})", data.display(), mode);
            tokio::task::spawn_blocking(move || {
                cli::run_local_query(&config, &data, shard_key.as_deref(), mode, &aggregation)
            })
            .await??;
        }

        Commands::Cluster {
            nodes,
            shard_keys,
            indicator,
            group_by,
            filter,
        } => {
            let config = config::load(&cli.config).await?;
            let aggregation = Aggregation::new(indicator, group_by, filter.as_deref())?;
            info!("Starting local cluster with {} nodes", nodes);
            cli::run_local_cluster(&config, nodes, &shard_keys, &aggregation).await?;
        }

        Commands::Version => {
            println!("MiniCube v{}", env!("CARGO_PKG_VERSION"));
            println!("In-memory OLAP cubes over bitmap indexes");
        }
    }

    Ok(())
}
