//! Segmentation trainer
//!
//! Wraps index fitting and held-out evaluation with progress logging.

use lumen_segment_core::{evaluate, EvaluationReport, SegmentIndex, SegmentationConfig, Table, TreeGrowthOracle};
use tracing::info;

use crate::dataset::Dataset;
use crate::errors::TrainerError;

/// Evaluation settings
#[derive(Clone, Debug)]
pub struct EvaluationParams {
    /// Share of rows held out for testing
    pub test_fraction: f64,
    /// Shuffle seed applied before splitting
    pub seed: i64,
    /// Impute unmatched categorical values at prediction time
    pub impute: bool,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            impute: true,
        }
    }
}

/// Segmentation trainer
pub struct SegmentTrainer {
    config: SegmentationConfig,
}

impl SegmentTrainer {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Fit an index over every row of `table`
    pub fn fit<O>(&self, table: &Table, oracle: &O) -> Result<SegmentIndex, TrainerError>
    where
        O: TreeGrowthOracle + ?Sized,
    {
        info!(
            rows = table.len(),
            partition_features = ?self.config.partition_features,
            features = ?self.config.features,
            "fitting segmentation index"
        );
        let index = SegmentIndex::fit(table, &self.config, oracle)?;
        info!(
            partitions = index.partitions().len(),
            segments = index.segment_count(),
            problematic = index.problematic_count(),
            "fit complete"
        );
        Ok(index)
    }

    /// Shuffle, split, fit on the training part and evaluate on the rest
    pub fn fit_and_evaluate<O>(
        &self,
        dataset: &Dataset,
        oracle: &O,
        params: &EvaluationParams,
    ) -> Result<(SegmentIndex, EvaluationReport), TrainerError>
    where
        O: TreeGrowthOracle + ?Sized,
    {
        if !(0.0..1.0).contains(&params.test_fraction) {
            return Err(TrainerError::Training(format!(
                "test fraction must lie in [0, 1), got {}",
                params.test_fraction
            )));
        }

        let mut shuffled = dataset.clone();
        shuffled.shuffle(params.seed);
        let (train, test) = shuffled.train_test_split(params.test_fraction);
        info!(
            train = train.len(),
            test = test.len(),
            seed = params.seed,
            "split dataset"
        );

        let index = self.fit(&train, oracle)?;
        let report = evaluate(&index, &test, params.impute);
        log_report(&report);
        Ok((index, report))
    }

    /// Fit and evaluate once per fold
    pub fn cross_validate<O>(
        &self,
        dataset: &Dataset,
        oracle: &O,
        folds: usize,
        impute: bool,
    ) -> Result<Vec<EvaluationReport>, TrainerError>
    where
        O: TreeGrowthOracle + ?Sized,
    {
        if folds < 2 {
            return Err(TrainerError::Training(format!("need at least 2 folds, got {folds}")));
        }

        let mut reports = Vec::with_capacity(folds);
        for (fold, (train, test)) in dataset.k_fold(folds).into_iter().enumerate() {
            info!("Fold {}/{}", fold + 1, folds);
            let index = self.fit(&train, oracle)?;
            let report = evaluate(&index, &test, impute);
            log_report(&report);
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Summary lines of an evaluation report
pub fn log_report(report: &EvaluationReport) {
    info!("Evaluation:");
    info!("  Test rows: {}", report.test_rows);
    info!(
        "  Unclassified: {} ({:.2}%)",
        report.failed.len(),
        report.failure_rate() * 100.0
    );
    info!("  Imputed: {}", report.imputed_rows);
    info!("  Problematic segments: {}", report.problematic_count());
    info!("  Mean share difference: {:.3}%", report.share_difference_mean());
    info!(
        "  Mean band deviation: {:.5}",
        report.distribution_difference_mean()
    );
}
