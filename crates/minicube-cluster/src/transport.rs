//! Delivery of cube operations to cluster members

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use minicube_common::error::{ClusterError, Error, Result};
use minicube_common::types::NodeAddress;

use crate::node::CubeNode;
use crate::ops::{CubeOp, CubeResponse};

/// Sends a unit of work to one member and returns its answer
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Addresses of the live members
    fn members(&self) -> Vec<NodeAddress>;

    /// Run `op` on `node`
    async fn call(&self, node: &str, op: CubeOp) -> Result<CubeResponse>;
}

/// In-process transport; node work runs on the blocking pool
#[derive(Default)]
pub struct LocalTransport {
    nodes: DashMap<NodeAddress, Arc<CubeNode>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member
    pub fn join(&self, node: Arc<CubeNode>) {
        let address = node.address().to_string();
        if self.nodes.insert(address.clone(), node).is_some() {
            warn!("Member {} rejoined, replacing its previous instance", address);
        } else {
            info!("Member {} has joined, {} members", address, self.nodes.len());
        }
    }

    /// Remove a member; its shard registry entry is left untouched
    pub fn leave(&self, address: &str) -> Option<Arc<CubeNode>> {
        let removed = self.nodes.remove(address).map(|(_, node)| node);
        if removed.is_some() {
            info!("Member {} has left, {} members", address, self.nodes.len());
        }
        removed
    }

    pub fn node(&self, address: &str) -> Option<Arc<CubeNode>> {
        self.nodes.get(address).map(|e| Arc::clone(e.value()))
    }
}

#[async_trait]
impl ClusterTransport for LocalTransport {
    fn members(&self) -> Vec<NodeAddress> {
        let mut members: Vec<NodeAddress> = self.nodes.iter().map(|e| e.key().clone()).collect();
        members.sort();
        members
    }

    async fn call(&self, node: &str, op: CubeOp) -> Result<CubeResponse> {
        let member = self
            .node(node)
            .ok_or_else(|| ClusterError::NodeNotFound(node.to_string()))?;
        tokio::task::spawn_blocking(move || member.handle(op))
            .await
            .map_err(|e| Error::Internal(format!("Task on {} failed: {}", node, e)))?
    }
}
