//! Cube identity: `<shard-key or ?>::<group>@<node-address>`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use minicube_common::error::{Error, Result};
use minicube_common::types::NodeAddress;

/// Shard key placeholder of a node that has not been assigned yet
pub const UNASSIGNED: &str = "?";

/// Which shard a node serves, as published to the shard registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CubeId {
    shard: Option<String>,
    group: String,
    node: NodeAddress,
}

impl CubeId {
    pub fn unassigned(group: impl Into<String>, node: impl Into<NodeAddress>) -> Self {
        Self {
            shard: None,
            group: group.into(),
            node: node.into(),
        }
    }

    pub fn assigned(
        shard: impl Into<String>,
        group: impl Into<String>,
        node: impl Into<NodeAddress>,
    ) -> Self {
        Self {
            shard: Some(shard.into()),
            group: group.into(),
            node: node.into(),
        }
    }

    /// Same group and node, serving `shard`
    #[must_use]
    pub fn with_shard(&self, shard: impl Into<String>) -> Self {
        Self::assigned(shard, self.group.clone(), self.node.clone())
    }

    /// Concrete shard key, `None` while unassigned
    pub fn shard_key(&self) -> Option<&str> {
        self.shard.as_deref()
    }

    pub fn is_assigned(&self) -> bool {
        self.shard.is_some()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn node(&self) -> &str {
        &self.node
    }
}

impl fmt::Display for CubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}@{}",
            self.shard.as_deref().unwrap_or(UNASSIGNED),
            self.group,
            self.node
        )
    }
}

impl FromStr for CubeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("Malformed cube id: {:?}", s));
        let (shard, rest) = s.split_once("::").ok_or_else(invalid)?;
        let (group, node) = rest.split_once('@').ok_or_else(invalid)?;
        if shard.trim().is_empty() || group.trim().is_empty() || node.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            shard: (shard != UNASSIGNED).then(|| shard.to_string()),
            group: group.to_string(),
            node: node.to_string(),
        })
    }
}

impl TryFrom<String> for CubeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CubeId> for String {
    fn from(id: CubeId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = CubeId::assigned("20140606", "minicubes-cluster", "/10.0.0.7:5701");
        let text = id.to_string();
        assert_eq!(text, "20140606::minicubes-cluster@/10.0.0.7:5701");
        assert_eq!(text.parse::<CubeId>().unwrap(), id);
    }

    #[test]
    fn test_unassigned() {
        let id: CubeId = "?::g@n1".parse().unwrap();
        assert!(!id.is_assigned());
        assert_eq!(id, CubeId::unassigned("g", "n1"));
        assert_eq!(id.with_shard("201406").to_string(), "201406::g@n1");
    }

    #[test]
    fn test_malformed() {
        for text in ["", "20140606", "20140606::g", "::g@n", "x::@n", "x::g@"] {
            assert!(
                matches!(text.parse::<CubeId>(), Err(Error::InvalidArgument(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let id = CubeId::unassigned("g", "n1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""?::g@n1""#);
    }
}
