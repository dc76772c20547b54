//! Persistence, restore and swap of fitted indexes

mod common;

use std::sync::Arc;

use lumen_segment_core::artifact::canonical_hash_hex;
use lumen_segment_core::{
    evaluate, to_dot, DotStyle, IndexArtifact, Record, SegmentError, SegmentIndex, SharedIndex,
};
use serde_json::{json, Value};
use tempfile::NamedTempFile;

#[test]
fn test_artifact_round_trip() -> lumen_segment_core::Result<()> {
    let index = common::fitted_index();
    let artifact = IndexArtifact::new(index.clone())?;

    let file = NamedTempFile::new()?;
    artifact.save_json(file.path())?;
    let restored = IndexArtifact::load_json(file.path())?;

    assert_eq!(restored.index, index, "restored index should equal the fitted one");
    assert_eq!(restored.index_hash, artifact.index_hash);
    Ok(())
}

#[test]
fn test_restored_index_predicts_with_imputation() -> lumen_segment_core::Result<()> {
    let index = common::fitted_index();
    let json = IndexArtifact::new(index.clone())?.to_canonical_json()?;
    let restored = IndexArtifact::from_json(&json)?.index;

    let record = Record::new()
        .with("region", "US")
        .with("family", "PF7")
        .with("channel", "NA");
    let original = index.predict(&record, true).expect("fitted prediction");
    let again = restored.predict(&record, true).expect("restored prediction");

    assert_eq!(original.segment.id(), again.segment.id());
    assert_eq!(original.imputed, again.imputed);
    Ok(())
}

#[test]
fn test_canonical_json_is_stable() -> lumen_segment_core::Result<()> {
    let index = common::fitted_index();
    let first = IndexArtifact::new(index.clone())?;
    let second = IndexArtifact::new(common::fitted_index())?;
    assert_eq!(first.index_hash, second.index_hash);

    let json = first.to_canonical_json()?;
    let reparsed = IndexArtifact::from_json(&json)?;
    assert_eq!(reparsed.to_canonical_json()?, json);
    Ok(())
}

#[test]
fn test_tampered_artifact_is_rejected() -> lumen_segment_core::Result<()> {
    let artifact = IndexArtifact::new(common::fitted_index())?;
    let json = artifact.to_canonical_json()?;
    let tampered = json.replacen("\"PF3\"", "\"PF4\"", 1);
    assert_ne!(json, tampered);

    let err = IndexArtifact::from_json(&tampered).unwrap_err();
    assert!(matches!(err, SegmentError::ValidationFailed(_)), "got {err:?}");
    Ok(())
}

/// Apply `edit` to the stored index and re-sign it so only structure checks can catch it
fn resigned_artifact(edit: impl FnOnce(&mut Value)) -> lumen_segment_core::Result<String> {
    let json = IndexArtifact::new(common::fitted_index())?.to_canonical_json()?;
    let mut value: Value = serde_json::from_str(&json)?;
    edit(&mut value["index"]);
    value["index_hash"] = Value::String(canonical_hash_hex(&value["index"])?);
    Ok(serde_json::to_string(&value)?)
}

#[test]
fn test_resigned_artifact_with_rows_out_of_range_is_rejected() -> lumen_segment_core::Result<()> {
    let json = resigned_artifact(|index| {
        index["partitions"][0]["tree"]["nodes"]["1"]["rows"] = json!(vec![9999; 20]);
    })?;

    let err = IndexArtifact::from_json(&json).unwrap_err();
    match err {
        SegmentError::ValidationFailed(reason) => assert!(reason.contains("row 9999"), "{reason}"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_resigned_artifact_with_short_row_is_rejected() -> lumen_segment_core::Result<()> {
    let json = resigned_artifact(|index| {
        if let Some(values) = index["partitions"][0]["table"]["rows"][0]["values"].as_array_mut() {
            values.pop();
        }
    })?;

    let err = IndexArtifact::from_json(&json).unwrap_err();
    match err {
        SegmentError::ValidationFailed(reason) => assert!(reason.contains("expects 3"), "{reason}"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_resigned_artifact_with_unknown_split_column_is_rejected() -> lumen_segment_core::Result<()> {
    let json = resigned_artifact(|index| {
        index["partitions"][0]["tree"]["nodes"]["0"]["split_feature"] = json!("colour");
    })?;

    let err = IndexArtifact::from_json(&json).unwrap_err();
    match err {
        SegmentError::ValidationFailed(reason) => assert!(reason.contains("colour"), "{reason}"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_shared_index_swap() {
    let shared = SharedIndex::new(common::fitted_index());
    let before = shared.snapshot();

    let mut config = common::config();
    config.partition_features.clear();
    let refit = SegmentIndex::fit(
        &common::training_table(),
        &config,
        &lumen_segment_core::FixedOracle::new(common::grown_tree()),
    )
    .unwrap();

    let replaced = shared.swap(refit);
    assert!(Arc::ptr_eq(&before, &replaced));
    assert_eq!(before.partitions().len(), 2, "old snapshot stays readable");
    assert_eq!(shared.snapshot().partitions().len(), 1);
    assert!(shared.snapshot().partitions()[0].key().is_singleton());
}

#[test]
fn test_evaluate_on_training_rows() {
    let index = common::fitted_index();
    let table = common::training_table();
    let report = evaluate(&index, &table, false);

    assert!(report.failed.is_empty());
    assert_eq!(report.test_rows, 50);
    assert_eq!(report.train_rows, 50);
    assert_eq!(report.imputed_rows, 0);
    for result in &report.results {
        assert_eq!(result.train_rows, result.test_rows);
        assert_eq!(result.out_of_band, 0);
        assert_eq!(result.band_counts.iter().sum::<usize>(), result.test_rows);
    }
    assert!(report.share_difference_mean().abs() < 1e-9);
}

#[test]
fn test_evaluate_counts_failures() {
    let index = common::fitted_index();
    let mut table = common::training_table().empty_like();
    table
        .push_row(vec!["ASIA".into(), "PF1".into(), "D".into()], 0.2)
        .unwrap();
    table
        .push_row(vec!["EU".into(), "PF9".into(), "D".into()], 0.2)
        .unwrap();
    table
        .push_row(vec!["EU".into(), "PF1".into(), "D".into()], 0.12)
        .unwrap();

    let report = evaluate(&index, &table, false);
    assert_eq!(report.failed, vec![0, 1]);
    assert_eq!(report.partition_not_found, 1);
    assert_eq!(report.no_matching_segment, 1);

    let imputed = evaluate(&index, &table, true);
    assert_eq!(imputed.failed, vec![0]);
    assert_eq!(imputed.imputed_rows, 1);
}

#[test]
fn test_dot_export() {
    let index = common::fitted_index();
    let model = &index.partitions()[0];
    let dot = to_dot(model, &DotStyle::default());

    assert!(dot.starts_with("digraph \"(EU)\" {"));
    assert!(dot.contains("0 -> 1 [label=\"PF1, PF2\""));
    assert!(dot.contains("1 -> 4 [label=\"I\""));
    assert!(dot.contains("split: family"));
    assert!(dot.contains("segment: 2\\nrows: 6"));
    assert!(dot.contains("#BBBB00"));
    assert!(dot.contains("#008800"));
    assert!(!dot.contains("#CC0000"));
    assert!(dot.trim_end().ends_with('}'));
}

#[test]
fn test_dot_export_marks_zero_entropy_leaves() -> lumen_segment_core::Result<()> {
    let mut grown = common::grown_tree();
    grown.nodes[2] = grown.nodes[2].clone().with_zero_entropy();
    let index = SegmentIndex::fit(
        &common::training_table(),
        &common::config(),
        &lumen_segment_core::FixedOracle::new(grown),
    )?;

    let style = DotStyle::default();
    let dot = to_dot(&index.partitions()[0], &style);
    let leaf_line = dot
        .lines()
        .find(|line| line.trim_start().starts_with("2 ["))
        .expect("leaf 2 rendered");
    assert!(leaf_line.contains(&style.zero_entropy_color), "{leaf_line}");
    assert_eq!(dot.matches(style.zero_entropy_color.as_str()).count(), 1);
    Ok(())
}
