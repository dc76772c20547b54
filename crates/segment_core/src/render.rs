//! Graphviz export of partition trees

use std::collections::HashMap;
use std::fmt::Write;

use crate::index::PartitionModel;
use crate::segment::Segment;
use crate::tree::TreeNode;

/// Colors of the exported graph
#[derive(Debug, Clone)]
pub struct DotStyle {
    pub internal_color: String,
    pub leaf_color: String,
    pub problematic_color: String,
    pub zero_entropy_color: String,
    pub edge_label_color: String,
}

impl Default for DotStyle {
    fn default() -> Self {
        Self {
            internal_color: "#BBBB00".to_string(),
            leaf_color: "#008800".to_string(),
            problematic_color: "#CC0000".to_string(),
            zero_entropy_color: "#00CC00".to_string(),
            edge_label_color: "#0000BB".to_string(),
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_label(node: &TreeNode, segment: Option<&Segment>) -> String {
    match (node.split_feature.as_deref(), segment) {
        (Some(feature), _) => format!("id: {}\\nrows: {}\\nsplit: {}", node.id, node.row_count(), escape(feature)),
        (None, Some(segment)) => format!(
            "segment: {}\\nrows: {}\\ncutoffs: {}",
            segment.id(),
            segment.rows_count(),
            segment.cutoffs().format()
        ),
        (None, None) => format!("id: {}\\nrows: {}", node.id, node.row_count()),
    }
}

/// Render one partition tree as a DOT digraph
pub fn to_dot(model: &PartitionModel, style: &DotStyle) -> String {
    let tree = model.tree();
    let by_leaf: HashMap<u32, &Segment> = model.segments().iter().map(|s| (s.leaf_id(), s)).collect();

    let mut dot = String::new();
    let _ = writeln!(dot, "digraph \"{}\" {{", escape(&model.key().to_string()));

    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        let segment = by_leaf.get(&node.id).copied();
        let color = match (node.is_terminal(), segment) {
            (false, _) => &style.internal_color,
            (true, Some(s)) if s.is_problematic() => &style.problematic_color,
            (true, _) if node.zero_entropy => &style.zero_entropy_color,
            (true, _) => &style.leaf_color,
        };
        let _ = writeln!(
            dot,
            "  {} [label=\"{}\", style=filled, color=\"{}\"];",
            node.id,
            node_label(node, segment),
            color
        );

        let children: Vec<&TreeNode> = tree.children(node).collect();
        for child in &children {
            let _ = writeln!(
                dot,
                "  {} -> {} [label=\"{}\", fontcolor=\"{}\"];",
                node.id,
                child.id,
                escape(&child.label),
                style.edge_label_color
            );
        }
        stack.extend(children.into_iter().rev());
    }

    dot.push_str("}\n");
    dot
}
