//! Segmentation configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::errors::{Result, SegmentError};
use crate::oracle::OracleParams;
use crate::table::Table;

/// Which columns partition, split and score a segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Supernode features; empty for a single partition
    pub partition_features: Vec<String>,
    /// Categorical features offered to the tree-growth oracle
    pub features: Vec<String>,
    /// Continuous target column
    pub target: String,
    /// Fill collapsed cutoff vectors up to six boundaries
    pub impute_cutoffs: bool,
    /// Settings forwarded to the oracle
    pub oracle: OracleParams,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            partition_features: Vec::new(),
            features: Vec::new(),
            target: "gm".to_string(),
            impute_cutoffs: true,
            oracle: OracleParams::default(),
        }
    }
}

impl SegmentationConfig {
    pub fn new(partition_features: Vec<String>, features: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            partition_features,
            features,
            target: target.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading segmentation config from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the feature lists for consistency
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(SegmentError::InvalidConfig("no split features configured".into()));
        }
        if self.target.is_empty() {
            return Err(SegmentError::InvalidConfig("empty target column name".into()));
        }

        let mut seen = HashSet::new();
        for feature in self.partition_features.iter().chain(self.features.iter()) {
            if feature == &self.target {
                return Err(SegmentError::InvalidConfig(format!(
                    "target '{}' is also listed as a feature",
                    self.target
                )));
            }
            if !seen.insert(feature.as_str()) {
                return Err(SegmentError::InvalidConfig(format!(
                    "feature '{feature}' listed more than once"
                )));
            }
        }

        if self.oracle.max_depth == 0 {
            return Err(SegmentError::InvalidConfig("oracle max_depth must be positive".into()));
        }
        Ok(())
    }

    /// Check that `table` carries every configured column
    pub fn check_table(&self, table: &Table) -> Result<()> {
        if table.target_name() != self.target {
            return Err(SegmentError::InvalidConfig(format!(
                "table target '{}' does not match configured target '{}'",
                table.target_name(),
                self.target
            )));
        }
        for feature in self.partition_features.iter().chain(self.features.iter()) {
            table.column_index(feature)?;
        }
        Ok(())
    }
}
