use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumen_segment_core::{
    CategoricalValue, Constraint, FixedOracle, FlatNode, GrownTree, Record, SegmentIndex, SegmentationConfig, Table,
    TerminalRule,
};

fn values(raw: &[&str]) -> Vec<CategoricalValue> {
    raw.iter().map(|v| CategoricalValue::parse(v)).collect()
}

fn sample_index() -> SegmentIndex {
    // Four regions, one family split per region with 2,000 rows each.
    let mut table = Table::new(vec!["region".into(), "family".into()], "gm");
    for region in ["EU", "US", "ASIA", "LATAM"] {
        for i in 0..2_000u32 {
            let family = ["PF1", "PF2", "PF3"][(i % 3) as usize];
            table
                .push_row(values(&[region, family]), f64::from(i % 97) / 100.0)
                .expect("bench row");
        }
    }

    let grown = GrownTree {
        nodes: vec![
            FlatNode::root(0, Some("family")),
            FlatNode::child(1, 0, values(&["PF1", "PF2"]), None),
            FlatNode::child(2, 0, values(&["PF3"]), None),
        ],
        rules: vec![
            TerminalRule {
                leaf_id: 1,
                constraints: vec![Constraint::new("family", values(&["PF1", "PF2"]))],
            },
            TerminalRule {
                leaf_id: 2,
                constraints: vec![Constraint::new("family", values(&["PF3"]))],
            },
        ],
    };

    let config = SegmentationConfig::new(vec!["region".into()], vec!["family".into()], "gm");
    SegmentIndex::fit(&table, &config, &FixedOracle::new(grown)).expect("bench fit")
}

fn bench_predict(c: &mut Criterion) {
    let index = sample_index();
    let direct = Record::new().with("region", "US").with("family", "PF2");
    let unseen = Record::new().with("region", "US").with("family", "PF9");

    c.bench_function("segment_predict_direct", |b| {
        b.iter(|| {
            let prediction = index.predict(black_box(&direct), true);
            black_box(prediction.is_ok());
        });
    });

    c.bench_function("segment_predict_imputed", |b| {
        b.iter(|| {
            let prediction = index.predict(black_box(&unseen), true);
            black_box(prediction.is_ok());
        });
    });
}

criterion_group!(segment_benches, bench_predict);
criterion_main!(segment_benches);
