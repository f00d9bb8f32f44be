//! Common type definitions for MiniCube

use serde::{Deserialize, Serialize};

/// Primary key of a fact record, unique within one fact table
pub type RowId = u32;

/// Value of a dimension column
pub type DimValue = i32;

/// Address a node advertises to the cluster
pub type NodeAddress = String;

// ============================================================================
// Execution Types
// ============================================================================

/// How a cube engine runs the per-row pass of a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Spread rows over the worker pool
    Parallel,
    /// Run on the calling thread
    Sequential,
}

impl ExecutionMode {
    #[must_use]
    pub fn from_parallel(parallel: bool) -> Self {
        if parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        }
    }

    #[must_use]
    pub fn is_parallel(self) -> bool {
        self == ExecutionMode::Parallel
    }
}

// ============================================================================
// Cluster Types
// ============================================================================

/// Lifecycle of a node's shard assignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentState {
    /// Identity published with `?` as shard key
    Unassigned,
    /// Fact table being rebuilt from the row source
    Loading,
    /// Serving a concrete shard
    Assigned,
}

/// Cluster status as seen by the status surface
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterStatus {
    /// Cube ids with a concrete shard key
    pub working: Vec<String>,
    /// Cube ids still waiting for a shard (`?`)
    pub awaiting: Vec<String>,
}

impl ClusterStatus {
    #[must_use]
    pub fn total(&self) -> usize {
        self.working.len() + self.awaiting.len()
    }
}
