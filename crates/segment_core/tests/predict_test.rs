//! Record classification against a fitted index

mod common;

use lumen_segment_core::{CategoricalValue, PartitionKey, PredictError, Record, SegmentId};

#[test]
fn test_fit_assigns_ids_across_partitions() {
    let index = common::fitted_index();

    assert_eq!(index.partitions().len(), 2);
    assert_eq!(index.segment_count(), 6);
    let ids: Vec<u64> = index.segments().map(|s| s.id().0).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);

    let us = index.partitions()[1].key();
    assert_eq!(us, &PartitionKey::new(vec![CategoricalValue::present("US")]));
    let leaves: Vec<u32> = index.partitions()[1].segments().iter().map(|s| s.leaf_id()).collect();
    assert_eq!(leaves, vec![3, 4, 2]);
}

#[test]
fn test_segment_rows_follow_rules() {
    let index = common::fitted_index();
    let eu = &index.partitions()[0];
    let counts: Vec<usize> = eu.segments().iter().map(|s| s.rows_count()).collect();
    assert_eq!(counts, vec![15, 4, 6]);
    assert_eq!(counts.iter().sum::<usize>(), eu.rows_count());
}

#[test]
fn test_direct_match_needs_no_imputation() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "EU")
        .with("family", "PF2")
        .with("channel", "D");

    let with_impute = index.predict(&record, true).unwrap();
    let without = index.predict(&record, false).unwrap();

    assert_eq!(with_impute.segment.id(), SegmentId(0));
    assert_eq!(with_impute.segment.id(), without.segment.id());
    assert!(with_impute.imputed.is_empty());
    assert!(!with_impute.was_imputed());
    assert_eq!(with_impute.resolved_record, record);
    assert_eq!(
        with_impute.resolved_path.get("family"),
        Some(&CategoricalValue::present("PF2"))
    );
}

#[test]
fn test_unknown_partition() {
    let index = common::fitted_index();
    let record = Record::new().with("region", "ASIA").with("family", "PF1");

    let err = index.predict(&record, true).unwrap_err();
    assert_eq!(
        err,
        PredictError::PartitionNotFound(PartitionKey::new(vec![CategoricalValue::present("ASIA")]))
    );
}

#[test]
fn test_missing_partition_value_is_its_own_key() {
    let index = common::fitted_index();
    let record = Record::new().with("family", "PF1").with("channel", "D");

    let err = index.predict(&record, true).unwrap_err();
    assert_eq!(
        err,
        PredictError::PartitionNotFound(PartitionKey::new(vec![CategoricalValue::Missing]))
    );
}

#[test]
fn test_unseen_value_without_imputation_halts() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "EU")
        .with("family", "PF9")
        .with("channel", "D");

    let err = index.predict(&record, false).unwrap_err();
    assert!(matches!(err, PredictError::NoMatchingSegment(_)));
}

#[test]
fn test_unseen_value_imputed_from_largest_branch() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "EU")
        .with("family", "PF9")
        .with("channel", "D");

    let prediction = index.predict(&record, true).unwrap();

    // {PF1, PF2} holds 19 rows against 6, and PF1 is its most frequent value
    assert_eq!(prediction.segment.leaf_id(), 3);
    assert_eq!(prediction.imputed.len(), 1);
    assert_eq!(prediction.imputed.get("family"), Some(&CategoricalValue::present("PF1")));
    assert_eq!(
        prediction.resolved_record.get("family"),
        CategoricalValue::present("PF1")
    );
    // caller's record untouched
    assert_eq!(record.get("family"), CategoricalValue::present("PF9"));
}

#[test]
fn test_literal_missing_is_imputed() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "US")
        .with("family", "missing")
        .with("channel", "I");

    let prediction = index.predict(&record, true).unwrap();
    assert_eq!(prediction.segment.id(), SegmentId(4));
    assert_eq!(prediction.imputed.get("family"), Some(&CategoricalValue::present("PF1")));
    assert_eq!(prediction.imputed.get("channel"), None);
}

#[test]
fn test_second_level_imputation() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "EU")
        .with("family", "PF2")
        .with("channel", "X");

    let prediction = index.predict(&record, true).unwrap();

    // channel D holds 15 rows against 4
    assert_eq!(prediction.segment.leaf_id(), 3);
    assert_eq!(prediction.imputed.get("channel"), Some(&CategoricalValue::present("D")));
    assert_eq!(prediction.resolved_path.len(), 2);
    assert_eq!(prediction.resolved_path.to_string(), "{family = PF2, channel = D}");
}

#[test]
fn test_imputation_is_deterministic() {
    let index = common::fitted_index();
    let record = Record::new().with("region", "EU").with("family", "");

    let first = index.predict(&record, true).unwrap();
    for _ in 0..10 {
        let again = index.predict(&record, true).unwrap();
        assert_eq!(again.segment.id(), first.segment.id());
        assert_eq!(again.imputed, first.imputed);
        assert_eq!(again.resolved_record, first.resolved_record);
    }
}

#[test]
fn test_band_of_prediction() {
    let index = common::fitted_index();
    let record = Record::new()
        .with("region", "EU")
        .with("family", "PF3")
        .with("channel", "D");

    let prediction = index.predict(&record, false).unwrap();
    let cutoffs = prediction.segment.cutoffs().values().to_vec();
    assert_eq!(cutoffs.len(), 6);
    assert_eq!(prediction.band_of(cutoffs[0]), Some(0));
    assert_eq!(prediction.band_of(cutoffs[5]), Some(4));
    assert_eq!(prediction.band_of(cutoffs[5] + 1.0), None);
}

#[test]
fn test_imputation_tie_on_rows_and_values_takes_first_in_oracle_order() {
    let index = common::tied_index(false);
    let record = Record::new().with("family", "PF9");

    let prediction = index.predict(&record, true).unwrap();

    // both branches hold 4 rows; PF2 and PF1 occur twice each inside {PF2, PF1}
    assert_eq!(prediction.segment.leaf_id(), 1);
    assert_eq!(prediction.imputed.get("family"), Some(&CategoricalValue::present("PF2")));
}

#[test]
fn test_imputation_tie_follows_branch_order() {
    let index = common::tied_index(true);
    let record = Record::new().with("family", "PF9");

    let prediction = index.predict(&record, true).unwrap();

    assert_eq!(prediction.segment.leaf_id(), 2);
    assert_eq!(prediction.imputed.get("family"), Some(&CategoricalValue::present("PF3")));
}
