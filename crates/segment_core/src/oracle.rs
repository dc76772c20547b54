//! Interface to the external tree-growth oracle
//!
//! The oracle decides which feature to split on and how categories are
//! grouped into branches. It hands back a flat, parent-pointer node list
//! plus one terminal rule per leaf; everything downstream is rebuilt from
//! that output.

use serde::{Deserialize, Serialize};

use crate::table::{Constraint, CategoricalValue, Table};

/// One entry of the oracle's flat node list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatNode {
    pub id: u32,
    /// `None` only for the root
    pub parent: Option<u32>,
    /// Column this node branches on; `None` for terminal nodes
    pub split_feature: Option<String>,
    /// Values routing into this node from its parent; `None` only for the root
    pub choice: Option<Vec<CategoricalValue>>,
    /// Leaf closed because its split candidates carried no entropy
    #[serde(default)]
    pub zero_entropy: bool,
}

impl FlatNode {
    pub fn root(id: u32, split_feature: Option<&str>) -> Self {
        Self {
            id,
            parent: None,
            split_feature: split_feature.map(str::to_string),
            choice: None,
            zero_entropy: false,
        }
    }

    pub fn child(id: u32, parent: u32, choice: Vec<CategoricalValue>, split_feature: Option<&str>) -> Self {
        Self {
            id,
            parent: Some(parent),
            split_feature: split_feature.map(str::to_string),
            choice: Some(choice),
            zero_entropy: false,
        }
    }

    pub fn with_zero_entropy(mut self) -> Self {
        self.zero_entropy = true;
        self
    }
}

/// Ordered constraints leading to one leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRule {
    pub leaf_id: u32,
    pub constraints: Vec<Constraint>,
}

/// Full oracle output for one partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrownTree {
    pub nodes: Vec<FlatNode>,
    pub rules: Vec<TerminalRule>,
}

/// Split-selection settings handed to the oracle, not interpreted here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleParams {
    pub alpha_merge: f64,
    pub max_depth: usize,
    pub min_parent_node_size: usize,
    pub min_child_node_size: usize,
    pub split_threshold: f64,
    pub is_exhaustive: bool,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            alpha_merge: 0.05,
            max_depth: 2,
            min_parent_node_size: 30,
            min_child_node_size: 30,
            split_threshold: 0.0,
            is_exhaustive: false,
        }
    }
}

/// A statistical procedure that grows a categorical tree over one sub-table
pub trait TreeGrowthOracle {
    /// Grow a tree over `table` using the categorical `features` and the
    /// continuous `target`. Errors are reported as plain messages and
    /// attributed to the partition by the caller.
    fn grow(
        &self,
        table: &Table,
        features: &[String],
        target: &str,
        params: &OracleParams,
    ) -> std::result::Result<GrownTree, String>;
}

/// Oracle that hands back the same precomputed output for every partition
#[derive(Debug, Clone, Default)]
pub struct FixedOracle {
    grown: GrownTree,
}

impl FixedOracle {
    pub fn new(grown: GrownTree) -> Self {
        Self { grown }
    }
}

impl TreeGrowthOracle for FixedOracle {
    fn grow(
        &self,
        _table: &Table,
        _features: &[String],
        _target: &str,
        _params: &OracleParams,
    ) -> std::result::Result<GrownTree, String> {
        Ok(self.grown.clone())
    }
}
