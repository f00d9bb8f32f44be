//! Single-process cluster wiring
//!
//! Every node shares one in-memory registry, one transport and one row source.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::info;

use minicube_common::config::Config;
use minicube_common::error::{Error, Result};
use minicube_storage::source::RowSource;

use crate::node::CubeNode;
use crate::registry::MemoryShardRegistry;
use crate::transport::LocalTransport;
use crate::ClusterManager;

pub struct LocalCluster {
    config: Config,
    source: Arc<dyn RowSource>,
    registry: Arc<MemoryShardRegistry>,
    transport: Arc<LocalTransport>,
    manager: ClusterManager,
}

impl LocalCluster {
    pub fn new(config: &Config, source: Arc<dyn RowSource>) -> Self {
        let registry = Arc::new(MemoryShardRegistry::new());
        let transport = Arc::new(LocalTransport::new());
        let manager = ClusterManager::new(&config.cluster, transport.clone(), registry.clone());
        Self {
            config: config.clone(),
            source,
            registry,
            transport,
            manager,
        }
    }

    pub fn manager(&self) -> &ClusterManager {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<MemoryShardRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.transport
    }

    /// Add a member at `address`, still load-pending
    pub fn add_node(&self, address: &str) -> Arc<CubeNode> {
        let mut config = self.config.clone();
        config.node.address = address.to_string();
        let node = Arc::new(CubeNode::new(
            &config,
            self.registry.clone(),
            Arc::clone(&self.source),
        ));
        self.transport.join(Arc::clone(&node));
        node
    }

    /// Add members at `addresses` and wait for them to join
    ///
    /// Each member stays load-pending for the configured join delay, during
    /// which assignments only record the intended shard.
    pub async fn start_nodes(&self, addresses: &[String]) -> Result<Vec<Arc<CubeNode>>> {
        let delay = self.config.node.join_delay();
        let nodes: Vec<_> = addresses.iter().map(|address| self.add_node(address)).collect();
        info!("Started {} nodes, joining in {:?}", nodes.len(), delay);

        let joins = nodes.iter().map(|node| {
            let join = node.spawn_join(delay);
            async move {
                join.await
                    .map_err(|e| Error::Internal(format!("Join task failed: {}", e)))
                    .and_then(|joined| joined)
            }
        });
        try_join_all(joins).await?;
        Ok(nodes)
    }

    /// Remove a member; its registry entry survives for a later restart
    pub fn stop_node(&self, address: &str) -> Option<Arc<CubeNode>> {
        self.transport.leave(address)
    }

    /// Hand `shard_keys` out to awaiting members, one each, in address order
    pub async fn assign_awaiting(&self, shard_keys: &[String]) -> Result<Vec<String>> {
        let awaiting = self.manager.status().awaiting;
        let mut assigned = Vec::new();
        for (cube_id, shard_key) in awaiting.iter().zip(shard_keys) {
            assigned.push(self.manager.reassign(cube_id, shard_key).await?);
        }
        info!("Assigned {} of {} shard keys", assigned.len(), shard_keys.len());
        Ok(assigned)
    }
}
