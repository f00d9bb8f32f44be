//! Scatter/gather execution of cube operations
//!
//! A call succeeds only when every target answered successfully. Any node
//! failure fails the whole call with `PartialFailure`; missing answers at the
//! deadline fail it with `Timeout`. Calls still running at the deadline are
//! left to finish on their own and their answers are dropped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, warn};

use minicube_common::error::{ClusterError, Result};
use minicube_common::metrics;
use minicube_common::types::NodeAddress;

use crate::identity::CubeId;
use crate::ops::{CubeOp, CubeResponse};
use crate::registry::ShardRegistry;
use crate::transport::ClusterTransport;

/// Resolves shard keys to nodes and fans operations out to them
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn ClusterTransport>,
    registry: Arc<dyn ShardRegistry>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn ClusterTransport>, registry: Arc<dyn ShardRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<dyn ShardRegistry> {
        &self.registry
    }

    /// Nodes whose registered shard key starts with any of `shard_keys`
    ///
    /// No shard keys selects every live member. Fails with `NoCubes` when
    /// nothing matches.
    pub fn resolve(&self, shard_keys: &[String]) -> Result<Vec<NodeAddress>> {
        if shard_keys.is_empty() {
            return Ok(self.transport.members());
        }

        let members: BTreeSet<NodeAddress> = self.transport.members().into_iter().collect();
        let targets: BTreeSet<NodeAddress> = self
            .registry
            .entries()
            .into_iter()
            .filter_map(|(node, cube_id)| {
                let id = cube_id.parse::<CubeId>().ok()?;
                let shard = id.shard_key()?;
                shard_keys
                    .iter()
                    .any(|key| shard.starts_with(key.as_str()))
                    .then_some(node)
            })
            .filter(|node| members.contains(node))
            .collect();

        if targets.is_empty() {
            return Err(ClusterError::NoCubes(shard_keys.join(",")).into());
        }
        debug!("Shard keys {:?} resolved to {:?}", shard_keys, targets);
        Ok(targets.into_iter().collect())
    }

    /// Run `op` on the owners of `shard_keys`
    pub async fn execute(
        &self,
        op: CubeOp,
        shard_keys: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<CubeResponse>> {
        let targets = self.resolve(shard_keys)?;
        self.execute_on(op, targets, timeout).await
    }

    /// Run `op` on every node of `targets` and wait for all answers
    ///
    /// `None` waits indefinitely.
    pub async fn execute_on(
        &self,
        op: CubeOp,
        targets: Vec<NodeAddress>,
        timeout: Option<Duration>,
    ) -> Result<Vec<CubeResponse>> {
        let started = Instant::now();
        let total = targets.len();
        let op_name = op.name();

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|node| {
                let transport = Arc::clone(&self.transport);
                let op = op.clone();
                tokio::spawn(async move {
                    let result = transport.call(&node, op).await;
                    (node, result)
                })
            })
            .collect();

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut responses = Vec::with_capacity(total);
        let mut errors = Vec::new();

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "{} timed out with {} of {} responses",
                            op_name,
                            responses.len() + errors.len(),
                            total
                        );
                        break;
                    }
                },
                None => pending.next().await,
            };
            match next {
                Some(Ok((node, Ok(response)))) => {
                    debug!("Completed {} of {}, {} answered", responses.len() + 1, total, node);
                    responses.push(response);
                }
                Some(Ok((node, Err(e)))) => errors.push(format!("{}: {}", node, e)),
                Some(Err(e)) => errors.push(format!("task failed: {}", e)),
                None => break,
            }
        }

        let elapsed = started.elapsed();
        metrics::record_dispatch(total, errors.len(), elapsed.as_secs_f64() * 1000.0);

        if !errors.is_empty() {
            error!(
                "{} exceptions occurred when executing {} on {} nodes",
                errors.len(),
                op_name,
                total
            );
            for (i, e) in errors.iter().enumerate() {
                error!("#{} {}", i + 1, e);
            }
            return Err(ClusterError::PartialFailure {
                failed: errors.len(),
                total,
                errors,
            }
            .into());
        }
        if responses.len() < total {
            return Err(ClusterError::Timeout {
                waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                received: responses.len(),
                total,
            }
            .into());
        }

        debug!("Executed {} on {} nodes in {:?}", op_name, total, elapsed);
        Ok(responses)
    }
}
