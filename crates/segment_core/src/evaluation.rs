//! Batch evaluation of a fitted index on held-out rows
//!
//! Failed predictions are counted and their row indices kept; a batch
//! never aborts on an unclassifiable row.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::index::SegmentIndex;
use crate::predict::PredictError;
use crate::segment::SegmentId;
use crate::table::Table;

/// Test-time statistics of one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResult {
    pub segment: SegmentId,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Test rows per price band
    pub band_counts: Vec<usize>,
    /// Test rows whose target fell outside the segment's cutoffs
    pub out_of_band: usize,
    pub is_problematic: bool,
}

impl SegmentResult {
    /// Share of classified test rows per band (zeros when none)
    pub fn distribution(&self) -> Vec<f64> {
        let total: usize = self.band_counts.iter().sum();
        self.band_counts
            .iter()
            .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
            .collect()
    }

    /// Squared deviation of the band distribution from uniform
    ///
    /// The uniform share is `1 / bands`, which is 0.2 for the usual five
    /// bands and stays meaningful for shorter, non-imputed cutoff vectors.
    pub fn distribution_difference(&self) -> f64 {
        let bands = self.band_counts.len();
        if bands == 0 {
            return 0.0;
        }
        let uniform = 1.0 / bands as f64;
        self.distribution()
            .iter()
            .map(|p| (p - uniform) * (p - uniform))
            .sum()
    }
}

/// Aggregate outcome of [`evaluate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub results: Vec<SegmentResult>,
    /// Test row indices that could not be classified
    pub failed: Vec<usize>,
    pub partition_not_found: usize,
    pub no_matching_segment: usize,
    /// Classified rows that needed at least one imputation
    pub imputed_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl EvaluationReport {
    pub fn failure_rate(&self) -> f64 {
        if self.test_rows == 0 {
            0.0
        } else {
            self.failed.len() as f64 / self.test_rows as f64
        }
    }

    pub fn problematic_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_problematic).count()
    }

    /// Train share minus test share, in percent, for one segment
    pub fn share_difference(&self, result: &SegmentResult) -> f64 {
        let train = percent(result.train_rows, self.train_rows);
        let test = percent(result.test_rows, self.test_rows);
        (train - test).abs()
    }

    /// Mean absolute train/test share difference across segments
    pub fn share_difference_mean(&self) -> f64 {
        mean(self.results.iter().map(|r| self.share_difference(r)), self.results.len())
    }

    /// Mean band-distribution deviation from uniform across segments
    pub fn distribution_difference_mean(&self) -> f64 {
        mean(
            self.results.iter().map(SegmentResult::distribution_difference),
            self.results.len(),
        )
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        values.sum::<f64>() / count as f64
    }
}

/// Predict every row of `test` and tally per-segment band counts
pub fn evaluate(index: &SegmentIndex, test: &Table, impute: bool) -> EvaluationReport {
    let mut results: Vec<SegmentResult> = index
        .segments()
        .map(|s| SegmentResult {
            segment: s.id(),
            train_rows: s.rows_count(),
            test_rows: 0,
            band_counts: vec![0; s.cutoffs().band_count()],
            out_of_band: 0,
            is_problematic: s.is_problematic(),
        })
        .collect();
    let positions: HashMap<SegmentId, usize> = results
        .iter()
        .enumerate()
        .map(|(i, r)| (r.segment, i))
        .collect();

    let mut failed = Vec::new();
    let mut partition_not_found = 0;
    let mut no_matching_segment = 0;
    let mut imputed_rows = 0;

    for row in 0..test.len() {
        let record = test.record(row);
        let prediction = match index.predict(&record, impute) {
            Ok(prediction) => prediction,
            Err(err) => {
                debug!(row, error = %err, "prediction failed");
                match err {
                    PredictError::PartitionNotFound(_) => partition_not_found += 1,
                    PredictError::NoMatchingSegment(_) => no_matching_segment += 1,
                }
                failed.push(row);
                continue;
            }
        };

        if prediction.was_imputed() {
            imputed_rows += 1;
        }

        let Some(&position) = positions.get(&prediction.segment.id()) else {
            failed.push(row);
            continue;
        };
        let result = &mut results[position];
        result.test_rows += 1;
        match prediction.band_of(test.rows()[row].target) {
            Some(band) => result.band_counts[band] += 1,
            None => result.out_of_band += 1,
        }
    }

    let report = EvaluationReport {
        results,
        failed,
        partition_not_found,
        no_matching_segment,
        imputed_rows,
        train_rows: index.rows_count(),
        test_rows: test.len(),
    };

    info!(
        test_rows = report.test_rows,
        failed = report.failed.len(),
        imputed = report.imputed_rows,
        problematic = report.problematic_count(),
        "evaluation finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_difference_uniform_is_zero() {
        let result = SegmentResult {
            segment: SegmentId(0),
            train_rows: 10,
            test_rows: 5,
            band_counts: vec![1, 1, 1, 1, 1],
            out_of_band: 0,
            is_problematic: false,
        };
        assert!(result.distribution_difference().abs() < 1e-12);
    }

    #[test]
    fn test_distribution_difference_concentrated() {
        let result = SegmentResult {
            segment: SegmentId(0),
            train_rows: 10,
            test_rows: 4,
            band_counts: vec![4, 0, 0, 0, 0],
            out_of_band: 0,
            is_problematic: false,
        };
        // (1 - .2)^2 + 4 * .2^2
        assert!((result.distribution_difference() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_distribution_difference_short_cutoffs_uses_band_count() {
        let result = SegmentResult {
            segment: SegmentId(1),
            train_rows: 6,
            test_rows: 3,
            band_counts: vec![1, 1, 1],
            out_of_band: 0,
            is_problematic: true,
        };
        // uniform over three bands is 1/3 each, not 0.2
        assert!(result.distribution_difference().abs() < 1e-12);
    }

    #[test]
    fn test_empty_segment_distribution_is_zeros() {
        let result = SegmentResult {
            segment: SegmentId(3),
            train_rows: 10,
            test_rows: 0,
            band_counts: vec![0, 0, 0, 0, 0],
            out_of_band: 0,
            is_problematic: true,
        };
        assert_eq!(result.distribution(), vec![0.0; 5]);
    }
}
