//! Units of work exchanged between coordinator and nodes

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use minicube_common::error::{Error, Result};
use minicube_common::types::{DimValue, ExecutionMode};
use minicube_storage::{DimFilter, DistinctSet};

/// Operation a node executes against its own cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CubeOp {
    Sum {
        indicator: String,
        filter: Option<DimFilter>,
    },
    GroupSum {
        indicator: String,
        group_by: String,
        filter: Option<DimFilter>,
    },
    Distinct {
        target: String,
        target_is_dimension: bool,
        group_by: String,
        filter: Option<DimFilter>,
    },
    DistinctCount {
        target: String,
        target_is_dimension: bool,
        group_by: String,
        filter: Option<DimFilter>,
    },
    AssignShard {
        cube_id: String,
        shard_key: String,
    },
    SetMode {
        mode: ExecutionMode,
    },
}

impl CubeOp {
    pub fn name(&self) -> &'static str {
        match self {
            CubeOp::Sum { .. } => "sum",
            CubeOp::GroupSum { .. } => "group_sum",
            CubeOp::Distinct { .. } => "distinct",
            CubeOp::DistinctCount { .. } => "distinct_count",
            CubeOp::AssignShard { .. } => "assign_shard",
            CubeOp::SetMode { .. } => "set_mode",
        }
    }
}

/// Result of a [`CubeOp`] on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum CubeResponse {
    Sum(BigDecimal),
    GroupSum(HashMap<DimValue, BigDecimal>),
    Distinct(HashMap<DimValue, DistinctSet>),
    DistinctCount(HashMap<DimValue, u64>),
    /// Cube id published by an assignment
    Assigned(String),
    Ack,
}

impl CubeResponse {
    pub fn into_sum(self) -> Result<BigDecimal> {
        match self {
            CubeResponse::Sum(v) => Ok(v),
            other => Err(unexpected("sum", &other)),
        }
    }

    pub fn into_group_sum(self) -> Result<HashMap<DimValue, BigDecimal>> {
        match self {
            CubeResponse::GroupSum(v) => Ok(v),
            other => Err(unexpected("group_sum", &other)),
        }
    }

    pub fn into_distinct(self) -> Result<HashMap<DimValue, DistinctSet>> {
        match self {
            CubeResponse::Distinct(v) => Ok(v),
            other => Err(unexpected("distinct", &other)),
        }
    }

    pub fn into_distinct_count(self) -> Result<HashMap<DimValue, u64>> {
        match self {
            CubeResponse::DistinctCount(v) => Ok(v),
            other => Err(unexpected("distinct_count", &other)),
        }
    }

    pub fn into_assigned(self) -> Result<String> {
        match self {
            CubeResponse::Assigned(v) => Ok(v),
            other => Err(unexpected("assigned", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &CubeResponse) -> Error {
    Error::Internal(format!("Expected {} response, got {:?}", expected, got))
}
