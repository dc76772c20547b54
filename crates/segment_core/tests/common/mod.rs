//! Shared fixture: two regions, one family/channel tree replayed per region

#![allow(dead_code)]

use lumen_segment_core::{
    CategoricalValue, Constraint, FixedOracle, FlatNode, GrownTree, SegmentIndex, SegmentationConfig, Table,
    TerminalRule,
};

fn values(raw: &[&str]) -> Vec<CategoricalValue> {
    raw.iter().map(|v| CategoricalValue::parse(v)).collect()
}

/// region | family | channel | gm
///
/// Per region: PF1/D x10, PF2/D x5, PF1/I x4, PF3 x6 (alternating channel)
pub fn training_table() -> Table {
    let mut table = Table::new(vec!["region".into(), "family".into(), "channel".into()], "gm");
    for (region, shift) in [("EU", 0.0), ("US", 0.05)] {
        for i in 0..10 {
            push(&mut table, region, "PF1", "D", 0.10 + 0.01 * i as f64 + shift);
        }
        for i in 0..5 {
            push(&mut table, region, "PF2", "D", 0.30 + 0.02 * i as f64 + shift);
        }
        for i in 0..4 {
            push(&mut table, region, "PF1", "I", 0.05 + 0.03 * i as f64 + shift);
        }
        for i in 0..6 {
            let channel = if i % 2 == 0 { "D" } else { "I" };
            push(&mut table, region, "PF3", channel, 0.50 + 0.05 * i as f64 + shift);
        }
    }
    table
}

fn push(table: &mut Table, region: &str, family: &str, channel: &str, gm: f64) {
    table
        .push_row(values(&[region, family, channel]), gm)
        .expect("fixture row arity");
}

/// root splits on family: {PF1, PF2} -> channel {D} | {I}; {PF3} -> leaf
pub fn grown_tree() -> GrownTree {
    let family_12 = Constraint::new("family", values(&["PF1", "PF2"]));
    GrownTree {
        nodes: vec![
            FlatNode::root(0, Some("family")),
            FlatNode::child(1, 0, values(&["PF1", "PF2"]), Some("channel")),
            FlatNode::child(2, 0, values(&["PF3"]), None),
            FlatNode::child(3, 1, values(&["D"]), None),
            FlatNode::child(4, 1, values(&["I"]), None),
        ],
        rules: vec![
            TerminalRule {
                leaf_id: 3,
                constraints: vec![family_12.clone(), Constraint::new("channel", values(&["D"]))],
            },
            TerminalRule {
                leaf_id: 4,
                constraints: vec![family_12, Constraint::new("channel", values(&["I"]))],
            },
            TerminalRule {
                leaf_id: 2,
                constraints: vec![Constraint::new("family", values(&["PF3"]))],
            },
        ],
    }
}

pub fn config() -> SegmentationConfig {
    SegmentationConfig::new(
        vec!["region".into()],
        vec!["family".into(), "channel".into()],
        "gm",
    )
}

pub fn fitted_index() -> SegmentIndex {
    SegmentIndex::fit(&training_table(), &config(), &FixedOracle::new(grown_tree())).expect("fixture fit")
}

/// family | gm with two equally populous branches: {PF2, PF1} (2 rows each) and {PF3} (4 rows)
pub fn tied_table() -> Table {
    let mut table = Table::new(vec!["family".into()], "gm");
    for (i, family) in ["PF1", "PF2", "PF1", "PF2", "PF3", "PF3", "PF3", "PF3"].iter().enumerate() {
        table
            .push_row(values(&[family]), 0.10 + 0.05 * i as f64)
            .expect("fixture row arity");
    }
    table
}

/// Single-split tree over [`tied_table`]; `pf3_first` lists the {PF3} branch first
pub fn tied_index(pf3_first: bool) -> SegmentIndex {
    let mixed = FlatNode::child(1, 0, values(&["PF2", "PF1"]), None);
    let single = FlatNode::child(2, 0, values(&["PF3"]), None);
    let children = if pf3_first { vec![single, mixed] } else { vec![mixed, single] };

    let mut nodes = vec![FlatNode::root(0, Some("family"))];
    nodes.extend(children);
    let grown = GrownTree {
        nodes,
        rules: vec![
            TerminalRule {
                leaf_id: 1,
                constraints: vec![Constraint::new("family", values(&["PF2", "PF1"]))],
            },
            TerminalRule {
                leaf_id: 2,
                constraints: vec![Constraint::new("family", values(&["PF3"]))],
            },
        ],
    };
    let config = SegmentationConfig::new(Vec::new(), vec!["family".into()], "gm");
    SegmentIndex::fit(&tied_table(), &config, &FixedOracle::new(grown)).expect("tied fixture fit")
}
