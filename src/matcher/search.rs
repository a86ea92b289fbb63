#[cfg(feature = "rayon")]
extern crate rayon;

use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    check_confidence, Aligner, Candidate, FeatureLibrary, FeatureSequence, FinalMatch,
    FusionStrategy, HistogramMatch, HistogramMetric, HistogramSearch, JumpPenalty, Modality,
    QueryFeatures, RankedResults, Reference, TopK,
};
use crate::{Error, Result};

/// Modalities whose rankings are combined into the final match.
const FUSED_MODALITIES: [Modality; 2] = [Modality::Audio, Modality::Motion];

/// Applies `f` to every reference, in parallel if `threading` is set and the `rayon` feature
/// is enabled. Results are returned in reference order either way.
pub(crate) fn map_references<T, F>(references: &[Reference], threading: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&Reference) -> T + Send + Sync,
{
    let mut data = Vec::new();

    if cfg!(feature = "rayon") && threading {
        #[cfg(feature = "rayon")]
        {
            data = references.par_iter().map(&f).collect::<Vec<_>>();
        }
    } else {
        data.extend(references.iter().map(&f));
    }

    data
}

/// Everything a query produced: the fused answer plus the rankings behind it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MatchReport {
    /// Fused answer. `None` if only the histogram path produced results.
    pub final_match: Option<FinalMatch>,
    /// Confidence-checked rankings of the fused modalities.
    pub rankings: BTreeMap<Modality, RankedResults>,
    /// Histogram scoring path results, most similar first. Empty if the query carried no
    /// histogram features.
    pub histogram: Vec<HistogramMatch>,
}

/// Finds the best-matching segment of a [FeatureLibrary] for a query clip.
///
/// For each fused modality present in the query, every reference is aligned against the
/// query and the best `top_k` candidates are kept. Each ranking goes through the confidence
/// check, then the [FusionStrategy] picks the final match. Histogram features, if present,
/// are scored separately by a [HistogramSearch].
///
/// # Example
///
/// ```
/// use haystack::matcher::{FeatureLibrary, FeatureSequence, Matcher, Modality, QueryFeatures};
///
/// let mut library = FeatureLibrary::new();
/// library
///     .insert(
///         Modality::Audio,
///         "a.mp4",
///         FeatureSequence::scalar(vec![0.5, 0.1, 0.2, 0.1, 0.9]).unwrap(),
///     )
///     .unwrap();
/// let query = QueryFeatures::new()
///     .with(Modality::Audio, FeatureSequence::scalar(vec![0.1, 0.2, 0.1]).unwrap())
///     .unwrap();
///
/// let report = Matcher::default().run(&query, &library).unwrap();
/// let final_match = report.final_match.unwrap();
/// assert_eq!(final_match.video_id, "a.mp4");
/// assert_eq!(final_match.start_offset, 1);
/// ```
#[derive(Clone, Debug)]
pub struct Matcher {
    top_k: usize,
    aligner: Aligner,
    fusion: FusionStrategy,
    histogram_results: usize,
    threading: bool,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            top_k: super::DEFAULT_TOP_K,
            aligner: Aligner::default(),
            fusion: FusionStrategy::default(),
            histogram_results: super::DEFAULT_HISTOGRAM_RESULTS,
            threading: false,
        }
    }
}

impl Matcher {
    /// Returns a new [Matcher] with the provided `top_k`.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Returns a new [Matcher] with the provided `aligner`.
    pub fn with_aligner(mut self, aligner: Aligner) -> Self {
        self.aligner = aligner;
        self
    }

    /// Returns a new [Matcher] with the provided `jump_penalty`.
    pub fn with_jump_penalty(mut self, jump_penalty: JumpPenalty) -> Self {
        self.aligner = self.aligner.with_jump_penalty(jump_penalty);
        self
    }

    /// Returns a new [Matcher] with the provided histogram `metric`.
    pub fn with_metric(mut self, metric: HistogramMetric) -> Self {
        self.aligner = self.aligner.with_metric(metric);
        self
    }

    /// Returns a new [Matcher] with the provided `fusion` strategy.
    pub fn with_fusion(mut self, fusion: FusionStrategy) -> Self {
        self.fusion = fusion;
        self
    }

    /// Returns a new [Matcher] with the provided `histogram_results`.
    pub fn with_histogram_results(mut self, histogram_results: usize) -> Self {
        self.histogram_results = histogram_results;
        self
    }

    /// Returns a new [Matcher] with `threading` set to the provided value.
    ///
    /// When set (and the `rayon` feature is enabled), references are scanned in parallel.
    /// The result is identical to a sequential scan.
    pub fn with_threading(mut self, threading: bool) -> Self {
        self.threading = threading;
        self
    }

    /// Aligns `query` against a single reference and keeps its best `top_k` offsets.
    fn scan_reference(
        &self,
        modality: Modality,
        query: &FeatureSequence,
        reference: &Reference,
    ) -> Result<TopK> {
        let alignments = self.aligner.align(query, &reference.features)?;

        let mut top = TopK::new(self.top_k);
        for a in alignments {
            top.offer(Candidate::new(
                reference.video_id.as_str(),
                a.offset,
                a.distance,
                modality,
            ));
        }
        Ok(top)
    }

    /// Ranks the best `top_k` candidates for `query` across all `references`.
    ///
    /// Each reference is scanned into its own [TopK]; the per-reference sets are merged in
    /// reference order, so ties go to the earlier reference regardless of threading.
    pub fn rank_references(
        &self,
        modality: Modality,
        query: &FeatureSequence,
        references: &[Reference],
    ) -> Result<RankedResults> {
        let span = tracing::span!(tracing::Level::TRACE, "rank_references");
        let _enter = span.enter();

        tracing::debug!(
            %modality,
            references = references.len(),
            query_len = query.len(),
            "starting sliding window scan"
        );

        let local = map_references(references, self.threading, |r| {
            self.scan_reference(modality, query, r)
        });

        let mut top = TopK::new(self.top_k);
        for l in local {
            top.merge(l?);
        }

        tracing::debug!(
            %modality,
            num_candidates = top.len(),
            "finished sliding window scan"
        );

        Ok(top.into_results(modality))
    }

    /// Ranks and confidence-checks a single modality of the query against the library.
    pub fn rank(
        &self,
        modality: Modality,
        query: &QueryFeatures,
        library: &FeatureLibrary,
    ) -> Result<RankedResults> {
        let features = query.get(modality).ok_or(Error::MissingQuery(modality))?;
        let mut ranked = self.rank_references(modality, features, library.references(modality))?;
        check_confidence(&mut ranked);
        Ok(ranked)
    }

    /// Runs the full match for a query.
    ///
    /// Fails with [Error::InsufficientData] if none of the fused modalities produced a
    /// candidate and the histogram path found nothing either.
    pub fn run(&self, query: &QueryFeatures, library: &FeatureLibrary) -> Result<MatchReport> {
        let span = tracing::span!(tracing::Level::TRACE, "run");
        let _enter = span.enter();

        let mut rankings = BTreeMap::new();
        for modality in FUSED_MODALITIES {
            if query.get(modality).is_none() {
                continue;
            }
            let ranked = self.rank(modality, query, library)?;
            rankings.insert(modality, ranked);
        }

        let histogram = match query.get(Modality::Histogram) {
            Some(features) => HistogramSearch::new(self.aligner.clone())
                .with_limit(self.histogram_results)
                .with_threading(self.threading)
                .run(features, library.references(Modality::Histogram))?,
            None => Vec::new(),
        };

        let final_match = match self.fusion.fuse(&rankings) {
            Ok(m) => Some(m),
            Err(Error::InsufficientData) if !histogram.is_empty() => {
                tracing::debug!(
                    matches = histogram.len(),
                    "no fused candidates, reporting histogram matches only"
                );
                None
            }
            Err(e) => return Err(e),
        };

        Ok(MatchReport {
            final_match,
            rankings,
            histogram,
        })
    }
}
