//! Cluster management
//!
//! Provides:
//! - Time-series shard keys and cube identities
//! - Shard registry and the per-node assignment state machine
//! - Scatter/gather dispatch with strict failure handling
//! - Cluster manager: the coordinator-side query and admin API

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dispatch;
pub mod identity;
pub mod local;
pub mod node;
pub mod ops;
pub mod reduce;
pub mod registry;
pub mod shard;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use tracing::{debug, info};

use minicube_common::config::ClusterConfig;
use minicube_common::error::{ClusterError, Error, Result};
use minicube_common::types::{ClusterStatus, DimValue, ExecutionMode};
use minicube_storage::{DimFilter, DistinctSet};

pub use dispatch::Dispatcher;
pub use identity::CubeId;
pub use local::LocalCluster;
pub use node::CubeNode;
pub use ops::{CubeOp, CubeResponse};
pub use registry::{MemoryShardRegistry, ShardRegistry};
pub use shard::{ShardKey, ShardSpan};
pub use transport::{ClusterTransport, LocalTransport};

/// Coordinator API over the whole cluster
///
/// Every query names its shard keys explicitly; an empty list means every member.
pub struct ClusterManager {
    dispatcher: Dispatcher,
    timeout: Option<Duration>,
}

impl ClusterManager {
    pub fn new(
        config: &ClusterConfig,
        transport: Arc<dyn ClusterTransport>,
        registry: Arc<dyn ShardRegistry>,
    ) -> Self {
        let timeout = config.executor_timeout();
        info!("Initializing cluster manager, executor timeout {:?}", timeout);
        Self {
            dispatcher: Dispatcher::new(transport, registry),
            timeout,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Cube ids of every live member, sorted
    pub fn all_cube_ids(&self) -> Vec<String> {
        let members = self.dispatcher.transport().members();
        let mut ids: Vec<String> = self
            .dispatcher
            .registry()
            .entries()
            .into_iter()
            .filter(|(node, _)| members.contains(node))
            .map(|(_, id)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Cube ids whose shard key starts with `prefix`
    pub fn cube_ids(&self, prefix: &str) -> Vec<String> {
        self.all_cube_ids()
            .into_iter()
            .filter(|id| {
                id.parse::<CubeId>()
                    .ok()
                    .and_then(|id| id.shard_key().map(|shard| shard.starts_with(prefix)))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Working and awaiting cube ids
    pub fn status(&self) -> ClusterStatus {
        let (working, awaiting): (Vec<String>, Vec<String>) =
            self.all_cube_ids().into_iter().partition(|id| {
                id.parse::<CubeId>()
                    .map(|id| id.is_assigned())
                    .unwrap_or(false)
            });
        ClusterStatus { working, awaiting }
    }

    /// Move the node owning `cube_id` onto `shard_key`
    ///
    /// The request goes to the owning node only and waits for the rebuild.
    pub async fn reassign(&self, cube_id: &str, shard_key: &str) -> Result<String> {
        let current: CubeId = cube_id.parse()?;
        ShardKey::parse(shard_key)?;
        info!("Reassigning {} to {}", current, shard_key);

        let op = CubeOp::AssignShard {
            cube_id: current.to_string(),
            shard_key: shard_key.to_string(),
        };
        let mut responses = self
            .dispatcher
            .execute_on(op, vec![current.node().to_string()], None)
            .await?;
        responses
            .pop()
            .ok_or_else(|| Error::Internal(format!("No answer to assignment of {}", current)))?
            .into_assigned()
    }

    /// Set the execution mode on the owners of `shard_keys`, or every member
    pub async fn set_mode(&self, mode: ExecutionMode, shard_keys: &[String]) -> Result<()> {
        self.dispatcher
            .execute(CubeOp::SetMode { mode }, shard_keys, self.timeout)
            .await
            .map_err(no_cubes_is_invalid)?;
        info!("Execution mode {:?} set for {:?}", mode, shard_keys);
        Ok(())
    }

    /// Set the execution mode of one node
    pub async fn set_node_mode(&self, node: &str, mode: ExecutionMode) -> Result<()> {
        self.dispatcher
            .execute_on(CubeOp::SetMode { mode }, vec![node.to_string()], self.timeout)
            .await?;
        Ok(())
    }

    pub async fn sum(
        &self,
        indicator: &str,
        filter: Option<DimFilter>,
        shard_keys: &[String],
    ) -> Result<BigDecimal> {
        let op = CubeOp::Sum {
            indicator: indicator.to_string(),
            filter,
        };
        let parts = self
            .query(op, shard_keys)
            .await?
            .into_iter()
            .map(CubeResponse::into_sum)
            .collect::<Result<Vec<_>>>()?;
        let total = reduce::sum_decimals(parts);
        debug!("Cluster sum {} over {:?}: {}", indicator, shard_keys, total);
        Ok(total)
    }

    pub async fn group_sum(
        &self,
        indicator: &str,
        group_by: &str,
        filter: Option<DimFilter>,
        shard_keys: &[String],
    ) -> Result<HashMap<DimValue, BigDecimal>> {
        let op = CubeOp::GroupSum {
            indicator: indicator.to_string(),
            group_by: group_by.to_string(),
            filter,
        };
        let parts = self
            .query(op, shard_keys)
            .await?
            .into_iter()
            .map(CubeResponse::into_group_sum)
            .collect::<Result<Vec<_>>>()?;
        Ok(reduce::merge_group_sums(parts))
    }

    pub async fn distinct(
        &self,
        target: &str,
        target_is_dimension: bool,
        group_by: &str,
        filter: Option<DimFilter>,
        shard_keys: &[String],
    ) -> Result<HashMap<DimValue, DistinctSet>> {
        let op = CubeOp::Distinct {
            target: target.to_string(),
            target_is_dimension,
            group_by: group_by.to_string(),
            filter,
        };
        let parts = self
            .query(op, shard_keys)
            .await?
            .into_iter()
            .map(CubeResponse::into_distinct)
            .collect::<Result<Vec<_>>>()?;
        Ok(reduce::merge_distinct(parts))
    }

    /// Cardinality of the merged distinct sets, never a sum of node counts
    pub async fn distinct_count(
        &self,
        target: &str,
        target_is_dimension: bool,
        group_by: &str,
        filter: Option<DimFilter>,
        shard_keys: &[String],
    ) -> Result<HashMap<DimValue, u64>> {
        let merged = self
            .distinct(target, target_is_dimension, group_by, filter, shard_keys)
            .await?;
        Ok(reduce::count_distinct(&merged))
    }

    async fn query(&self, op: CubeOp, shard_keys: &[String]) -> Result<Vec<CubeResponse>> {
        self.dispatcher
            .execute(op, shard_keys, self.timeout)
            .await
            .map_err(no_cubes_is_invalid)
    }
}

fn no_cubes_is_invalid(e: Error) -> Error {
    match e {
        Error::Cluster(ClusterError::NoCubes(keys)) => {
            Error::InvalidArgument(format!("No cubes for shard keys: {}", keys))
        }
        other => other,
    }
}
