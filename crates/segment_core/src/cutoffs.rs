//! Quantile cutoffs over the continuous target
//!
//! Boundaries are computed at cumulative probabilities 0, .2, .4, .6, .8, 1
//! with linear interpolation between order statistics. Coinciding
//! boundaries collapse, so sparse or duplicate-heavy leaves can yield fewer
//! than six values; [`impute_cutoffs`] restores the full count by repeatedly
//! bisecting the widest gap.

use serde::{Deserialize, Serialize};

/// Cumulative probabilities of the band edges
pub const QUANTILES: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

/// Boundary count of a complete cutoff vector (five bands)
pub const CUTOFF_COUNT: usize = QUANTILES.len();

/// Linear-interpolated quantile of an ascending slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = position - lower as f64;
    (sorted[lower] + (sorted[upper] - sorted[lower]) * fraction).clamp(sorted[lower], sorted[upper])
}

/// Distinct quantile boundaries of `values`, ascending
///
/// Returns an empty vector for empty input.
pub fn natural_cutoffs(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let mut boundaries: Vec<f64> = QUANTILES.iter().map(|&q| quantile(&sorted, q)).collect();
    boundaries.dedup();
    boundaries
}

/// Grow `boundaries` to `target_len` by inserting midpoints of the widest gap
///
/// Ties between equally wide gaps go to the first one. Returns `None` when
/// fewer than two boundaries exist, since a single point cannot be bisected.
pub fn impute_cutoffs(boundaries: &[f64], target_len: usize) -> Option<Vec<f64>> {
    if boundaries.len() < 2 {
        return None;
    }

    let mut filled = boundaries.to_vec();
    while filled.len() < target_len {
        let mut widest = 0;
        let mut widest_gap = f64::NEG_INFINITY;
        for (i, pair) in filled.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            if gap > widest_gap {
                widest = i;
                widest_gap = gap;
            }
        }
        let midpoint = (filled[widest] + filled[widest + 1]) / 2.0;
        filled.insert(widest + 1, midpoint);
    }

    Some(filled)
}

/// Cutoff vector of one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cutoffs {
    /// Usable boundaries, ascending
    values: Vec<f64>,
    /// Boundary count before imputation
    natural_len: usize,
}

impl Cutoffs {
    /// Cutoffs exactly as the data produced them
    pub fn natural(values: Vec<f64>) -> Self {
        let natural_len = values.len();
        Self { values, natural_len }
    }

    /// Imputed cutoffs remembering how many boundaries were natural
    pub fn imputed(values: Vec<f64>, natural_len: usize) -> Self {
        Self { values, natural_len }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn natural_len(&self) -> usize {
        self.natural_len
    }

    /// True when natural quantiles collapsed below a full vector
    pub fn collapsed(&self) -> bool {
        self.natural_len < CUTOFF_COUNT
    }

    pub fn is_monotonic(&self) -> bool {
        self.values.windows(2).all(|w| w[0] <= w[1])
    }

    /// Number of price bands
    pub fn band_count(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    /// Band holding `value`: bands are `[c_i, c_{i+1})`, the last one closed
    pub fn band_of(&self, value: f64) -> Option<usize> {
        let bands = self.band_count();
        if bands == 0 {
            return None;
        }
        let first = self.values[0];
        let last = self.values[bands];
        if !(first..=last).contains(&value) {
            return None;
        }
        let band = self.values[1..]
            .iter()
            .position(|&edge| value < edge)
            .unwrap_or(bands - 1);
        Some(band)
    }

    /// `(lower, upper)` bounds of band `band`
    pub fn band_bounds(&self, band: usize) -> Option<(f64, f64)> {
        if band < self.band_count() {
            Some((self.values[band], self.values[band + 1]))
        } else {
            None
        }
    }

    /// Boundaries formatted to three decimals
    pub fn format(&self) -> String {
        self.values
            .iter()
            .map(|v| format!("{v:.3}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
