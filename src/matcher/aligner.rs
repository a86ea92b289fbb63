use serde::{Deserialize, Serialize};

use super::FeatureSequence;
use crate::{Error, Result};

/// Extra per-frame cost for windows that hide an abrupt discontinuity.
///
/// The penalty applies to scalar modalities only and is evaluated for every query frame
/// after the first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum JumpPenalty {
    /// Adds `max(0, |q[j] - q[j-1]| - |r[j] - r[j-1]|)`: the amount by which the query
    /// changes faster than the reference between two consecutive frames.
    #[default]
    Slope,
    /// Adds `max(0, d[j] - d[j-1])` where `d[j] = |q[j] - r[j]|`: the amount by which
    /// the frame deviation grew since the previous frame.
    Deviation,
    /// Plain sum of absolute differences.
    None,
}

/// Distance between two histogram frames.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum HistogramMetric {
    /// `sum((a - b)^2 / (a + b))` over bins, skipping bins that are empty in both frames.
    #[default]
    ChiSquare,
    /// `sqrt(sum((a - b)^2))`.
    Euclidean,
}

impl HistogramMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            HistogramMetric::ChiSquare => a
                .iter()
                .zip(b)
                .filter(|(x, y)| *x + *y != 0.0)
                .map(|(x, y)| (x - y).powi(2) / (x + y))
                .sum(),
            HistogramMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
        }
    }

    /// Maps a distance onto `(0, 1]`, where 1 is an exact match.
    #[inline]
    pub fn similarity(distance: f64) -> f64 {
        1.0 / (1.0 + distance)
    }
}

/// Accumulated distance of the query placed at one offset of a reference.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Alignment {
    /// Position of the window start within the reference.
    pub position: usize,
    /// Time index of the reference frame at the window start.
    pub offset: u32,
    pub distance: f64,
}

/// Slides a query sequence across a reference sequence and scores every valid offset.
///
/// The search is exhaustive: for a query of length `m` and a reference of length `n`,
/// every one of the `n - m + 1` offsets is scored in `O(m)`.
#[derive(Clone, Debug)]
pub struct Aligner {
    jump_penalty: JumpPenalty,
    metric: HistogramMetric,
    temporal_window: usize,
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            jump_penalty: JumpPenalty::default(),
            metric: HistogramMetric::default(),
            temporal_window: super::DEFAULT_TEMPORAL_WINDOW,
        }
    }
}

impl Aligner {
    /// Returns a new [Aligner] with the provided `jump_penalty`.
    pub fn with_jump_penalty(mut self, jump_penalty: JumpPenalty) -> Self {
        self.jump_penalty = jump_penalty;
        self
    }

    /// Returns a new [Aligner] with the provided histogram `metric`.
    pub fn with_metric(mut self, metric: HistogramMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Returns a new [Aligner] with the provided `temporal_window`.
    pub fn with_temporal_window(mut self, temporal_window: usize) -> Self {
        self.temporal_window = temporal_window.max(1);
        self
    }

    pub fn metric(&self) -> HistogramMetric {
        self.metric
    }

    /// Scores every valid offset of `query` within `reference`.
    ///
    /// A reference shorter than the query has no valid offset and yields an empty list.
    pub fn align(
        &self,
        query: &FeatureSequence,
        reference: &FeatureSequence,
    ) -> Result<Vec<Alignment>> {
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }

        if let (Some(q), Some(r)) = (query.as_scalar(), reference.as_scalar()) {
            return Ok(self.slide(reference, q.len(), r.len(), |start| {
                self.scalar_distance(q, &r[start..start + q.len()])
            }));
        }

        if let (Some(q), Some(r)) = (query.as_histogram(), reference.as_histogram()) {
            if !r.is_empty() && query.dimension() != reference.dimension() {
                return Err(Error::InvalidFeatureShape {
                    expected: query.dimension(),
                    found: reference.dimension(),
                });
            }
            return Ok(self.slide(reference, q.len(), r.len(), |start| {
                self.histogram_distance(q, &r[start..start + q.len()])
            }));
        }

        Err(Error::FeatureKindMismatch {
            query: query.kind(),
            reference: reference.kind(),
        })
    }

    fn slide(
        &self,
        reference: &FeatureSequence,
        query_len: usize,
        reference_len: usize,
        distance_at: impl Fn(usize) -> f64,
    ) -> Vec<Alignment> {
        if reference_len < query_len {
            return Vec::new();
        }
        (0..=reference_len - query_len)
            .map(|position| Alignment {
                position,
                offset: reference.time_index(position),
                distance: distance_at(position),
            })
            .collect()
    }

    fn scalar_distance(&self, q: &[f64], r: &[f64]) -> f64 {
        let mut total = 0.0;
        for j in 0..q.len() {
            let mut d = (q[j] - r[j]).abs();
            if j > 0 {
                d += match self.jump_penalty {
                    JumpPenalty::Slope => {
                        ((q[j] - q[j - 1]).abs() - (r[j] - r[j - 1]).abs()).max(0.0)
                    }
                    JumpPenalty::Deviation => (d - (q[j - 1] - r[j - 1]).abs()).max(0.0),
                    JumpPenalty::None => 0.0,
                };
            }
            total += d;
        }
        total
    }

    fn histogram_distance(&self, q: &[Vec<f64>], r: &[Vec<f64>]) -> f64 {
        let total: f64 = q
            .iter()
            .zip(r)
            .map(|(a, b)| self.metric.distance(a, b))
            .sum();
        total / q.len() as f64
    }

    /// Coarse similarity of two histogram sequences aligned at their first frames.
    ///
    /// A sub-window of `min(temporal_window, overlap)` frames slides across the overlap; the
    /// mean frame similarity of each window is averaged over all window positions. Returns
    /// 0 if the sequences do not overlap.
    pub fn temporal_similarity(&self, query: &[Vec<f64>], reference: &[Vec<f64>]) -> f64 {
        let overlap = query.len().min(reference.len());
        if overlap == 0 {
            return 0.0;
        }
        let window = self.temporal_window.min(overlap);
        let positions = overlap - window + 1;

        let total: f64 = (0..positions)
            .map(|i| {
                let sum: f64 = query[i..i + window]
                    .iter()
                    .zip(&reference[i..i + window])
                    .map(|(a, b)| HistogramMetric::similarity(self.metric.distance(a, b)))
                    .sum();
                sum / window as f64
            })
            .sum();

        total / positions as f64
    }
}
