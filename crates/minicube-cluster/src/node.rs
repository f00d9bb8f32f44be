//! Cluster node: owns one cube and its shard assignment
//!
//! A node starts load-pending. While load-pending, assignments only record the
//! intended shard in the registry. [`CubeNode::join`] ends the load-pending
//! window and then either publishes an unassigned identity or, after a restart,
//! rebuilds the shard the registry still records for this node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bigdecimal::{BigDecimal, Zero};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use minicube_common::config::Config;
use minicube_common::error::{Error, Result};
use minicube_common::metrics;
use minicube_common::types::{AssignmentState, ExecutionMode, NodeAddress};
use minicube_storage::source::{load_fact_table, ColumnSplit, RowSource};
use minicube_storage::{round_indicator, CubeEngine, DerivedDimension};

use crate::identity::CubeId;
use crate::ops::{CubeOp, CubeResponse};
use crate::registry::ShardRegistry;
use crate::shard::ShardKey;

/// One member of the cluster serving at most one shard
pub struct CubeNode {
    address: NodeAddress,
    group: String,
    default_mode: ExecutionMode,
    split: ColumnSplit,
    derived: Vec<DerivedDimension>,
    registry: Arc<dyn ShardRegistry>,
    source: Arc<dyn RowSource>,
    engine: RwLock<Option<Arc<CubeEngine>>>,
    /// Identity advertised as this node's member attribute
    advertised: RwLock<Option<CubeId>>,
    state: RwLock<AssignmentState>,
    load_pending: AtomicBool,
    /// Serializes assignments on this node
    assigning: Mutex<()>,
}

impl CubeNode {
    pub fn new(
        config: &Config,
        registry: Arc<dyn ShardRegistry>,
        source: Arc<dyn RowSource>,
    ) -> Self {
        Self {
            address: config.node.address.clone(),
            group: config.node.group.clone(),
            default_mode: ExecutionMode::from_parallel(config.cube.parallel),
            split: ColumnSplit::from(&config.source),
            derived: Vec::new(),
            registry,
            source,
            engine: RwLock::new(None),
            advertised: RwLock::new(None),
            state: RwLock::new(AssignmentState::Unassigned),
            load_pending: AtomicBool::new(true),
            assigning: Mutex::new(()),
        }
    }

    /// Dimensions computed from indicators on every table this node builds
    #[must_use]
    pub fn with_derived_dimensions(mut self, derived: Vec<DerivedDimension>) -> Self {
        self.derived = derived;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn state(&self) -> AssignmentState {
        *self.state.read()
    }

    pub fn is_load_pending(&self) -> bool {
        self.load_pending.load(Ordering::Acquire)
    }

    /// Identity currently advertised by this node
    pub fn advertised(&self) -> Option<CubeId> {
        self.advertised.read().clone()
    }

    /// Cube currently served, if any
    pub fn engine(&self) -> Option<Arc<CubeEngine>> {
        self.engine.read().clone()
    }

    /// End the load-pending window and claim a role in the cluster
    ///
    /// With a concrete registry entry (restart) the recorded shard is rebuilt,
    /// otherwise the node publishes itself as unassigned. A failed rebuild also
    /// leaves the node published as unassigned.
    pub fn join(&self) -> Result<CubeId> {
        let _assigning = self.assigning.lock();
        self.load_pending.store(false, Ordering::Release);

        let previous = self
            .registry
            .get(&self.address)
            .and_then(|id| id.parse::<CubeId>().ok())
            .filter(|id| id.node() == self.address);

        match previous.filter(CubeId::is_assigned) {
            Some(id) => {
                info!("Node {} restarted, reloading shard from {}", self.address, id);
                let rebuilt = ShardKey::parse(id.shard_key().unwrap_or_default())
                    .and_then(|shard| self.build(&shard));
                rebuilt.map_err(|e| {
                    error!(
                        "Node {} could not reload {}, now unassigned: {}",
                        self.address, id, e
                    );
                    self.publish(&CubeId::unassigned(self.group.clone(), self.address.clone()));
                    e
                })
            }
            None => {
                let id = CubeId::unassigned(self.group.clone(), self.address.clone());
                self.publish(&id);
                *self.state.write() = AssignmentState::Unassigned;
                info!("Node {} joined as {}", self.address, id);
                Ok(id)
            }
        }
    }

    /// Run [`CubeNode::join`] on the blocking pool after `delay`
    pub fn spawn_join(self: &Arc<Self>, delay: Duration) -> JoinHandle<Result<CubeId>> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let address = node.address.clone();
            tokio::task::spawn_blocking(move || node.join())
                .await
                .map_err(|e| Error::Internal(format!("Join of {} panicked: {}", address, e)))?
        })
    }

    /// Serve `shard_key` in place of the shard named by `current`
    ///
    /// Only the node owning `current` may run this. On failure the node keeps
    /// its previous cube and state.
    pub fn assign(&self, current: &CubeId, shard_key: &str) -> Result<CubeId> {
        if current.node() != self.address {
            return Err(Error::PermissionDenied(format!(
                "Assignment of {} to {} only permitted on node {}, not {}",
                current,
                shard_key,
                current.node(),
                self.address
            )));
        }
        let shard = ShardKey::parse(shard_key)?;

        let _assigning = self.assigning.lock();
        if self.is_load_pending() {
            let target = CubeId::assigned(shard.as_str(), self.group.clone(), self.address.clone());
            self.registry.put(&self.address, target.to_string());
            warn!("Node {} is load-pending, only recorded {}", self.address, target);
            return Ok(target);
        }
        self.build(&shard)
    }

    /// Rebuild the cube for `shard` and publish it; callers hold `assigning`
    fn build(&self, shard: &ShardKey) -> Result<CubeId> {
        let target = CubeId::assigned(shard.as_str(), self.group.clone(), self.address.clone());
        let previous_state = std::mem::replace(&mut *self.state.write(), AssignmentState::Loading);
        info!("Building cube {} for dates {}", target, shard.date_range());
        let started = Instant::now();

        let table = self
            .source
            .scan(&shard.date_range())
            .and_then(|scan| load_fact_table(shard.as_str(), scan, &self.split, &self.derived));
        let table = match table {
            Ok(table) => table,
            Err(e) => {
                *self.state.write() = previous_state;
                metrics::record_assignment(false);
                error!("Failed to build cube {} on {}: {}", target, self.address, e);
                return Err(e);
            }
        };

        let rows = table.len();
        *self.engine.write() = Some(Arc::new(CubeEngine::new(table, self.default_mode)));
        self.publish(&target);
        *self.state.write() = AssignmentState::Assigned;
        metrics::record_assignment(true);
        info!(
            "Node {} now serves {} ({} rows, {} ms)",
            self.address,
            target,
            rows,
            started.elapsed().as_millis()
        );
        Ok(target)
    }

    /// Cube to answer queries from
    ///
    /// `None` when this node owns no shard. Owning a shard in the registry
    /// without a loaded cube is `InvalidState`, so the node never answers for
    /// data it does not hold.
    fn serving_engine(&self) -> Result<Option<Arc<CubeEngine>>> {
        if let Some(engine) = self.engine() {
            return Ok(Some(engine));
        }
        let recorded = self
            .registry
            .get(&self.address)
            .and_then(|id| id.parse::<CubeId>().ok())
            .filter(|id| id.is_assigned() && id.node() == self.address);
        match recorded {
            Some(id) => Err(Error::InvalidState(format!(
                "Cube {} is not loaded on {}",
                id, self.address
            ))),
            None => Ok(None),
        }
    }

    /// Execute one unit of work against the local cube
    ///
    /// A node without a shard answers sums with zero and the other queries with
    /// empty maps. A node recorded as owning a shard it has not loaded fails.
    pub fn handle(&self, op: CubeOp) -> Result<CubeResponse> {
        match op {
            CubeOp::Sum { indicator, filter } => {
                let sum = match self.serving_engine()? {
                    Some(engine) => engine.sum(&indicator, filter.as_ref())?,
                    None => round_indicator(&BigDecimal::zero()),
                };
                Ok(CubeResponse::Sum(sum))
            }
            CubeOp::GroupSum {
                indicator,
                group_by,
                filter,
            } => Ok(CubeResponse::GroupSum(match self.serving_engine()? {
                Some(engine) => engine.group_sum(&indicator, &group_by, filter.as_ref())?,
                None => HashMap::new(),
            })),
            CubeOp::Distinct {
                target,
                target_is_dimension,
                group_by,
                filter,
            } => Ok(CubeResponse::Distinct(match self.serving_engine()? {
                Some(engine) => {
                    engine.distinct(&target, target_is_dimension, &group_by, filter.as_ref())?
                }
                None => HashMap::new(),
            })),
            CubeOp::DistinctCount {
                target,
                target_is_dimension,
                group_by,
                filter,
            } => Ok(CubeResponse::DistinctCount(match self.serving_engine()? {
                Some(engine) => engine.distinct_count(
                    &target,
                    target_is_dimension,
                    &group_by,
                    filter.as_ref(),
                )?,
                None => HashMap::new(),
            })),
            CubeOp::AssignShard { cube_id, shard_key } => {
                let current: CubeId = cube_id.parse()?;
                Ok(CubeResponse::Assigned(
                    self.assign(&current, &shard_key)?.to_string(),
                ))
            }
            CubeOp::SetMode { mode } => {
                match self.engine() {
                    Some(engine) => engine.set_mode(mode),
                    None => info!("Node {} has no cube, mode {:?} not applied", self.address, mode),
                }
                Ok(CubeResponse::Ack)
            }
        }
    }

    fn publish(&self, id: &CubeId) {
        *self.advertised.write() = Some(id.clone());
        self.registry.put(&self.address, id.to_string());
    }
}
