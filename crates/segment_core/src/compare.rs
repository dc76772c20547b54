//! Cutoff-vector distance between segments
//!
//! Offline diagnostic for spotting segments whose price bands are close
//! enough to merge.

use crate::segment::{Segment, SegmentId};

/// Distance between two cutoff vectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CutoffDistance {
    /// Sum of squared element-wise differences
    Compatible(f64),
    /// Vectors of different lengths cannot be compared
    Incompatible { left: usize, right: usize },
}

impl CutoffDistance {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Compatible(d) => Some(*d),
            Self::Incompatible { .. } => None,
        }
    }

    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }
}

/// Distance between two raw cutoff vectors
pub fn cutoff_distance(a: &[f64], b: &[f64]) -> CutoffDistance {
    if a.len() != b.len() {
        return CutoffDistance::Incompatible {
            left: a.len(),
            right: b.len(),
        };
    }
    CutoffDistance::Compatible(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// Distance between the cutoff vectors of two segments
pub fn distance(a: &Segment, b: &Segment) -> CutoffDistance {
    cutoff_distance(a.cutoffs().values(), b.cutoffs().values())
}

/// One unordered pair of segments and their distance
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPair {
    pub left: SegmentId,
    pub right: SegmentId,
    pub distance: CutoffDistance,
}

/// All unordered segment pairs split into compatible and incompatible ones
///
/// Compatible pairs are sorted by descending distance; both lists otherwise
/// keep the input order.
pub fn pairwise_distances<'a, I>(segments: I) -> (Vec<SegmentPair>, Vec<SegmentPair>)
where
    I: IntoIterator<Item = &'a Segment>,
{
    let segments: Vec<&Segment> = segments.into_iter().collect();
    let mut compatible = Vec::new();
    let mut incompatible = Vec::new();

    for (i, left) in segments.iter().enumerate() {
        for right in &segments[i + 1..] {
            let pair = SegmentPair {
                left: left.id(),
                right: right.id(),
                distance: distance(left, right),
            };
            if pair.distance.is_compatible() {
                compatible.push(pair);
            } else {
                incompatible.push(pair);
            }
        }
    }

    compatible.sort_by(|a, b| {
        let da = a.distance.value().unwrap_or(0.0);
        let db = b.distance.value().unwrap_or(0.0);
        db.total_cmp(&da)
    });

    (compatible, incompatible)
}
