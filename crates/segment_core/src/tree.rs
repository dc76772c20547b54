//! Tree reconstruction from the oracle's flat node list
//!
//! The oracle reports nodes as a parent-pointer list. This module rebuilds
//! an arena-backed tree in one depth-first pass where every node owns the
//! rows routed to it, its split feature, its ordered children and the
//! path constraints that lead to it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::errors::{Result, SegmentError};
use crate::oracle::{FlatNode, GrownTree};
use crate::partition::PartitionKey;
use crate::table::{choice_label, CategoricalValue, PathPairs, RowSet, Table};

/// A node of a reconstructed partition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: u32,
    pub parent: Option<u32>,
    /// Column this node branches on; `None` for terminal nodes
    pub split_feature: Option<String>,
    /// Values that route a row from the parent into this node (empty at the root)
    pub choice: Vec<CategoricalValue>,
    /// Display label of `choice`
    pub label: String,
    /// Rows of the partition owned by this node
    pub rows: RowSet,
    /// Child ids in the oracle's order
    pub children: Vec<u32>,
    /// Constraints accumulated from the root
    pub path: PathPairs,
    #[serde(default)]
    pub zero_entropy: bool,
}

impl TreeNode {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Arena of nodes for one partition, keyed by oracle node id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTree {
    root: u32,
    nodes: BTreeMap<u32, TreeNode>,
}

impl SegmentTree {
    /// Rebuild the hierarchical tree for `table` from the oracle output
    pub fn reconstruct(partition: &PartitionKey, table: &Table, grown: &GrownTree) -> Result<Self> {
        let malformed = |reason: String| SegmentError::MalformedTree {
            partition: partition.clone(),
            reason,
        };

        if grown.nodes.is_empty() {
            return Err(malformed("empty node list".to_string()));
        }

        let mut ids = HashSet::with_capacity(grown.nodes.len());
        for node in &grown.nodes {
            if !ids.insert(node.id) {
                return Err(malformed(format!("duplicate node id {}", node.id)));
            }
        }

        let roots: Vec<&FlatNode> = grown.nodes.iter().filter(|n| n.parent.is_none()).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(malformed("no root node".to_string())),
            _ => return Err(malformed(format!("{} root nodes", roots.len()))),
        };

        let mut children: HashMap<u32, Vec<&FlatNode>> = HashMap::new();
        for node in &grown.nodes {
            let Some(parent) = node.parent else { continue };
            if !ids.contains(&parent) {
                return Err(malformed(format!(
                    "node {} has unknown parent {}",
                    node.id, parent
                )));
            }
            if node.choice.is_none() {
                return Err(malformed(format!("node {} has no choice set", node.id)));
            }
            children.entry(parent).or_default().push(node);
        }

        let mut builder = Builder {
            partition,
            table,
            children: &children,
            nodes: BTreeMap::new(),
        };
        builder.visit(root, None, Vec::new(), RowSet::all(table), PathPairs::new())?;

        if builder.nodes.len() != grown.nodes.len() {
            return Err(malformed(format!(
                "{} of {} nodes unreachable from root {}",
                grown.nodes.len() - builder.nodes.len(),
                grown.nodes.len(),
                root.id
            )));
        }

        Ok(Self {
            root: root.id,
            nodes: builder.nodes,
        })
    }

    pub fn root_id(&self) -> u32 {
        self.root
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[&self.root]
    }

    pub fn node(&self, id: u32) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Children of `node` in routing order
    pub fn children<'a>(&'a self, node: &'a TreeNode) -> impl Iterator<Item = &'a TreeNode> + 'a {
        node.children.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values().filter(|n| n.is_terminal())
    }

    /// Structural checks for a tree restored from storage against its partition table
    pub fn validate(&self, table: &Table) -> std::result::Result<(), String> {
        if !self.nodes.contains_key(&self.root) {
            return Err(format!("root {} missing", self.root));
        }
        for node in self.nodes.values() {
            if node.is_terminal() != node.split_feature.is_none() {
                return Err(format!("node {} split feature does not match its children", node.id));
            }
            if let Some(feature) = node.split_feature.as_deref() {
                if table.column_index(feature).is_err() {
                    return Err(format!("node {} splits on unknown column {feature}", node.id));
                }
            }
            if let Some(row) = node.rows.iter().find(|&row| row >= table.len()) {
                return Err(format!(
                    "node {} owns row {row} outside a table of {} rows",
                    node.id,
                    table.len()
                ));
            }
            for child_id in &node.children {
                match self.nodes.get(child_id) {
                    Some(child) if child.parent == Some(node.id) => {}
                    Some(_) => return Err(format!("node {child_id} does not point back to parent {}", node.id)),
                    None => return Err(format!("node {} references missing child {child_id}", node.id)),
                }
            }
        }
        Ok(())
    }
}

struct Builder<'a> {
    partition: &'a PartitionKey,
    table: &'a Table,
    children: &'a HashMap<u32, Vec<&'a FlatNode>>,
    nodes: BTreeMap<u32, TreeNode>,
}

impl Builder<'_> {
    fn visit(
        &mut self,
        flat: &FlatNode,
        parent: Option<u32>,
        choice: Vec<CategoricalValue>,
        rows: RowSet,
        path: PathPairs,
    ) -> Result<()> {
        if self.nodes.contains_key(&flat.id) {
            return Err(self.malformed(format!("node {} reached twice", flat.id)));
        }

        let children = self.children;
        let flat_children = children.get(&flat.id).map(Vec::as_slice).unwrap_or(&[]);
        let split_feature = if flat_children.is_empty() {
            None
        } else {
            match &flat.split_feature {
                Some(feature) => Some(feature.clone()),
                None => {
                    return Err(self.malformed(format!(
                        "node {} has children but no split feature",
                        flat.id
                    )))
                }
            }
        };

        debug!(
            partition = %self.partition,
            node = flat.id,
            rows = rows.len(),
            split = split_feature.as_deref().unwrap_or("-"),
            "reconstructed node"
        );

        self.nodes.insert(
            flat.id,
            TreeNode {
                id: flat.id,
                parent,
                split_feature: split_feature.clone(),
                label: choice_label(&choice),
                choice,
                rows: rows.clone(),
                children: flat_children.iter().map(|c| c.id).collect(),
                path: path.clone(),
                zero_entropy: flat.zero_entropy,
            },
        );

        let Some(feature) = split_feature else {
            return Ok(());
        };
        let column = self.table.column_index(&feature)?;

        let mut routed = Vec::with_capacity(flat_children.len());
        for child in flat_children {
            let child_choice = child.choice.clone().unwrap_or_default();
            let child_rows = rows.filter_in(self.table, column, &child_choice);
            routed.push((*child, child_choice, child_rows));
        }

        let claimed: Vec<usize> = routed.iter().flat_map(|(_, _, r)| r.iter()).collect();
        if RowSet::from_positions(claimed).has_duplicates() {
            return Err(self.malformed(format!(
                "children of node {} have overlapping choice sets on {}",
                flat.id, feature
            )));
        }

        for (child, child_choice, child_rows) in routed {
            let child_path = path.extended(&feature, &child_choice);
            self.visit(child, Some(flat.id), child_choice, child_rows, child_path)?;
        }

        Ok(())
    }

    fn malformed(&self, reason: String) -> SegmentError {
        SegmentError::MalformedTree {
            partition: self.partition.clone(),
            reason,
        }
    }
}
