use serde::{Deserialize, Serialize};

use super::search::map_references;
use super::{Aligner, FeatureSequence, HistogramMetric, Reference};
use crate::{Error, Result};

/// Best alignment of a query against one reference on the histogram scoring path.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HistogramMatch {
    pub video_id: String,
    pub offset: u32,
    /// Mean per-frame histogram distance at `offset`.
    pub distance: f64,
    /// `1 / (1 + distance)`.
    pub frame_similarity: f64,
    /// Sub-window similarity over the aligned overlap.
    pub temporal_similarity: f64,
    /// Product of the frame and temporal similarities. Higher is better.
    pub similarity: f64,
}

/// Scores references by color histogram similarity.
///
/// This path runs next to the fused audio/motion decision and reports its own ranking; it
/// never feeds the final match.
#[derive(Clone, Debug)]
pub struct HistogramSearch {
    aligner: Aligner,
    limit: usize,
    threading: bool,
}

impl Default for HistogramSearch {
    fn default() -> Self {
        Self {
            aligner: Aligner::default(),
            limit: super::DEFAULT_HISTOGRAM_RESULTS,
            threading: false,
        }
    }
}

impl HistogramSearch {
    pub fn new(aligner: Aligner) -> Self {
        Self {
            aligner,
            ..Default::default()
        }
    }

    /// Returns a new [HistogramSearch] reporting at most `limit` references.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Returns a new [HistogramSearch] with `threading` set to the provided value.
    pub fn with_threading(mut self, threading: bool) -> Self {
        self.threading = threading;
        self
    }

    /// Finds the best offset of `query` in `reference`. Returns `None` if the reference is
    /// shorter than the query.
    pub fn score(
        &self,
        query: &FeatureSequence,
        reference: &Reference,
    ) -> Result<Option<HistogramMatch>> {
        let alignments = self.aligner.align(query, &reference.features)?;

        let mut best = match alignments.first() {
            Some(a) => *a,
            None => return Ok(None),
        };
        for a in &alignments[1..] {
            if a.distance < best.distance {
                best = *a;
            }
        }

        let (q, r) = match (query.as_histogram(), reference.features.as_histogram()) {
            (Some(q), Some(r)) => (q, r),
            _ => {
                return Err(Error::FeatureKindMismatch {
                    query: query.kind(),
                    reference: reference.features.kind(),
                })
            }
        };
        let frame_similarity = HistogramMetric::similarity(best.distance);
        let temporal_similarity = self.aligner.temporal_similarity(q, &r[best.position..]);

        Ok(Some(HistogramMatch {
            video_id: reference.video_id.clone(),
            offset: best.offset,
            distance: best.distance,
            frame_similarity,
            temporal_similarity,
            similarity: frame_similarity * temporal_similarity,
        }))
    }

    /// Scores every reference and returns the best ones, most similar first.
    pub fn run(
        &self,
        query: &FeatureSequence,
        references: &[Reference],
    ) -> Result<Vec<HistogramMatch>> {
        let span = tracing::span!(tracing::Level::TRACE, "histogram_search");
        let _enter = span.enter();

        let scored = map_references(references, self.threading, |r| self.score(query, r));

        let mut matches = Vec::new();
        for m in scored {
            if let Some(m) = m? {
                matches.push(m);
            }
        }

        // Stable sort: on equal similarity the earlier reference stays ahead.
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(self.limit);

        tracing::debug!(
            references = references.len(),
            num_matches = matches.len(),
            "finished histogram search"
        );

        Ok(matches)
    }
}
