//! CLI command handlers

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use minicube_cluster::LocalCluster;
use minicube_common::config::Config;
use minicube_common::types::ExecutionMode;
use minicube_storage::source::{load_fact_table, ColumnSplit, DateRange, RowSource, TsvRowSource};
use minicube_storage::{init_worker_pool, CubeEngine, DimFilter};

/// What to aggregate
pub struct Aggregation {
    pub indicator: String,
    pub group_by: Option<String>,
    pub filter: Option<DimFilter>,
}

impl Aggregation {
    pub fn new(indicator: String, group_by: Option<String>, filter: Option<&str>) -> Result<Self> {
        let filter = filter
            .map(serde_json::from_str::<DimFilter>)
            .transpose()
            .context("filter must be a JSON object of column to value list")?;
        Ok(Self {
            indicator,
            group_by,
            filter,
        })
    }
}

/// Load a flat file into one cube and aggregate it locally
pub fn run_local_query(
    config: &Config,
    data: &Path,
    shard_key: Option<&str>,
    mode: ExecutionMode,
    aggregation: &Aggregation,
) -> Result<()> {
    init_worker_pool(config.cube.worker_threads);

    let range = match shard_key {
        Some(key) => minicube_cluster::ShardKey::parse(key)?.date_range(),
        None => DateRange::all(),
    };
    let source = TsvRowSource::new(data, config.source.date_column.clone());

    let started = Instant::now();
    let scan = source.scan(&range)?;
    let table = load_fact_table(
        shard_key.unwrap_or("local"),
        scan,
        &ColumnSplit::from(&config.source),
        &[],
    )?;
    info!(
        "Loaded {} rows from {} in {} ms",
        table.len(),
        data.display(),
        started.elapsed().as_millis()
    );

    let engine = CubeEngine::new(table, mode);
    let started = Instant::now();
    let output = match &aggregation.group_by {
        Some(group_by) => {
            let groups: BTreeMap<_, _> = engine
                .group_sum(&aggregation.indicator, group_by, aggregation.filter.as_ref())?
                .into_iter()
                .collect();
            json!({ "groups": groups })
        }
        None => json!({
            "sum": engine.sum(&aggregation.indicator, aggregation.filter.as_ref())?,
        }),
    };
    info!("Query took {} ms", started.elapsed().as_millis());

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Start an in-process cluster, hand out shards and run one aggregation
pub async fn run_local_cluster(
    config: &Config,
    nodes: usize,
    shard_keys: &[String],
    aggregation: &Aggregation,
) -> Result<()> {
    init_worker_pool(config.cube.worker_threads);

    let source: Arc<dyn RowSource> = Arc::new(TsvRowSource::from_config(&config.source));
    let cluster = LocalCluster::new(config, source);
    let addresses: Vec<String> = (1..=nodes)
        .map(|i| format!("{}#{}", config.node.address, i))
        .collect();
    info!(
        "Waiting {} s for {} nodes to join",
        config.node.join_delay_secs,
        addresses.len()
    );
    cluster.start_nodes(&addresses).await?;

    let assigned = cluster.assign_awaiting(shard_keys).await?;
    info!("Cube ids: {:?}", assigned);

    let manager = cluster.manager();
    let output = match &aggregation.group_by {
        Some(group_by) => {
            let groups: BTreeMap<_, _> = manager
                .group_sum(
                    &aggregation.indicator,
                    group_by,
                    aggregation.filter.clone(),
                    shard_keys,
                )
                .await?
                .into_iter()
                .collect();
            json!({ "status": manager.status(), "groups": groups })
        }
        None => {
            let sum = manager
                .sum(&aggregation.indicator, aggregation.filter.clone(), shard_keys)
                .await?;
            json!({ "status": manager.status(), "sum": sum })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
