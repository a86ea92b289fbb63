use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{Candidate, Modality, RankedResults, FUSION_PREFERENCE};
use crate::{Error, Result};

/// The single answer to a query: the clip starts `start_offset` seconds into `video_id`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FinalMatch {
    pub video_id: String,
    pub start_offset: u32,
    /// Modality whose ranking supplied the match.
    pub modality: Modality,
}

impl From<&Candidate> for FinalMatch {
    fn from(c: &Candidate) -> Self {
        Self {
            video_id: c.video_id.clone(),
            start_offset: c.offset,
            modality: c.modality,
        }
    }
}

impl Display for FinalMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video: {}, start: {}, modality: {}",
            self.video_id,
            crate::util::format_offset(self.start_offset),
            self.modality,
        )
    }
}

/// Per-modality priority used by [FusionStrategy::WeightedConfidence].
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FusionWeights {
    pub audio: f64,
    pub motion: f64,
    pub histogram: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            audio: super::DEFAULT_AUDIO_WEIGHT,
            motion: super::DEFAULT_MOTION_WEIGHT,
            histogram: super::DEFAULT_HISTOGRAM_WEIGHT,
        }
    }
}

impl FusionWeights {
    pub fn weight(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Audio => self.audio,
            Modality::Motion => self.motion,
            Modality::Histogram => self.histogram,
        }
    }
}

/// Combines the rankings of several modalities into one [FinalMatch].
///
/// Modalities with an empty ranking do not take part. Ties always go to the modality that
/// comes first in [FUSION_PREFERENCE] (audio, then motion, then histogram).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum FusionStrategy {
    /// Each modality scores 1 if its top candidate is confident and 0 otherwise, multiplied
    /// by its weight; the highest weighted score wins. If no modality with a non-zero weight
    /// is confident, motion (or, without motion, audio) is given a score of 0.5 so that a
    /// decision is still made.
    WeightedConfidence(FusionWeights),
    /// Picks a candidate that two modalities agree on (same reference and offset anywhere in
    /// their rankings). Without agreement, falls back to the first confident modality, then
    /// to motion.
    Agreement,
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::WeightedConfidence(FusionWeights::default())
    }
}

impl FusionStrategy {
    /// Decides the final match from the sealed, confidence-checked rankings.
    ///
    /// Fails with [Error::InsufficientData] if no modality has a candidate.
    pub fn fuse(&self, rankings: &BTreeMap<Modality, RankedResults>) -> Result<FinalMatch> {
        let span = tracing::span!(tracing::Level::TRACE, "fuse");
        let _enter = span.enter();

        let participants: Vec<&RankedResults> = FUSION_PREFERENCE
            .iter()
            .filter_map(|m| rankings.get(m))
            .filter(|r| !r.is_empty())
            .collect();
        if participants.is_empty() {
            return Err(Error::InsufficientData);
        }

        let winner = match self {
            FusionStrategy::WeightedConfidence(weights) => Self::weighted(weights, &participants),
            FusionStrategy::Agreement => Self::agreement(&participants),
        }
        .ok_or(Error::InsufficientData)?;

        let final_match = FinalMatch::from(winner);
        tracing::debug!(
            video = %final_match.video_id,
            offset = final_match.start_offset,
            modality = %final_match.modality,
            "fusion selected final match"
        );
        Ok(final_match)
    }

    fn weighted<'a>(
        weights: &FusionWeights,
        participants: &[&'a RankedResults],
    ) -> Option<&'a Candidate> {
        let mut scores: Vec<f64> = participants
            .iter()
            .map(|r| if r.is_confident() { 1.0 } else { 0.0 })
            .collect();

        let weighted_unconfident = participants
            .iter()
            .filter(|r| weights.weight(r.modality()) > 0.0)
            .all(|r| !r.is_confident());
        if weighted_unconfident {
            let fallback = participants
                .iter()
                .position(|r| r.modality() == Modality::Motion)
                .or_else(|| {
                    participants
                        .iter()
                        .position(|r| r.modality() == Modality::Audio)
                })
                .unwrap_or(0);
            scores[fallback] = super::DEFAULT_UNCONFIDENT_SCORE;
        }

        let mut best: Option<(f64, &RankedResults)> = None;
        for (r, score) in participants.iter().zip(scores) {
            let weighted = score * weights.weight(r.modality());
            tracing::trace!(modality = %r.modality(), weighted, "weighted fusion score");
            match best {
                Some((best_score, _)) if weighted <= best_score => (),
                _ => best = Some((weighted, *r)),
            }
        }

        best.and_then(|(_, r)| r.top())
    }

    fn agreement<'a>(participants: &[&'a RankedResults]) -> Option<&'a Candidate> {
        for (i, a) in participants.iter().enumerate() {
            for b in &participants[i + 1..] {
                for ca in a.entries() {
                    let agreed = b
                        .entries()
                        .iter()
                        .any(|cb| cb.video_id == ca.video_id && cb.offset == ca.offset);
                    if agreed {
                        tracing::debug!(
                            first = %a.modality(),
                            second = %b.modality(),
                            "modalities agree on a candidate"
                        );
                        return Some(ca);
                    }
                }
            }
        }

        if let Some(r) = participants.iter().find(|r| r.is_confident()) {
            return r.top();
        }

        participants
            .iter()
            .find(|r| r.modality() == Modality::Motion)
            .or_else(|| participants.first())
            .and_then(|r| r.top())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matcher::{check_confidence, rank};
    use crate::util::SpanRecorder;

    fn ranking(modality: Modality, entries: &[(&str, u32)]) -> RankedResults {
        let mut results = rank(
            entries
                .iter()
                .enumerate()
                .map(|(i, (video, offset))| Candidate::new(*video, *offset, i as f64, modality)),
            3,
            modality,
        );
        check_confidence(&mut results);
        results
    }

    fn confident(modality: Modality, video: &str) -> RankedResults {
        ranking(modality, &[(video, 10), (video, 11), ("other.mp4", 40)])
    }

    fn unconfident(modality: Modality, video: &str) -> RankedResults {
        ranking(modality, &[(video, 20), ("other.mp4", 5), ("third.mp4", 8)])
    }

    fn rankings(entries: Vec<RankedResults>) -> BTreeMap<Modality, RankedResults> {
        entries.into_iter().map(|r| (r.modality(), r)).collect()
    }

    #[test]
    fn test_confident_audio_wins() {
        let input = rankings(vec![
            confident(Modality::Audio, "audio.mp4"),
            unconfident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(
            m,
            FinalMatch {
                video_id: "audio.mp4".to_string(),
                start_offset: 10,
                modality: Modality::Audio,
            }
        );
    }

    #[test]
    fn test_confident_motion_beats_unconfident_audio() {
        let input = rankings(vec![
            unconfident(Modality::Audio, "audio.mp4"),
            confident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Motion);
        assert_eq!(m.video_id, "motion.mp4");
    }

    #[test]
    fn test_both_confident_prefers_heavier_weight() {
        let input = rankings(vec![
            confident(Modality::Audio, "audio.mp4"),
            confident(Modality::Motion, "motion.mp4"),
        ]);
        assert_eq!(
            FusionStrategy::default().fuse(&input).unwrap().modality,
            Modality::Audio
        );

        let weights = FusionWeights {
            audio: 0.2,
            motion: 0.8,
            histogram: 0.0,
        };
        let m = FusionStrategy::WeightedConfidence(weights)
            .fuse(&input)
            .unwrap();
        assert_eq!(m.modality, Modality::Motion);
    }

    #[test]
    fn test_exact_tie_prefers_audio() {
        let weights = FusionWeights {
            audio: 0.5,
            motion: 0.5,
            histogram: 0.0,
        };
        let input = rankings(vec![
            confident(Modality::Audio, "audio.mp4"),
            confident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::WeightedConfidence(weights)
            .fuse(&input)
            .unwrap();
        assert_eq!(m.modality, Modality::Audio);
    }

    #[test]
    fn test_unconfident_falls_back_to_motion() {
        let input = rankings(vec![
            unconfident(Modality::Audio, "audio.mp4"),
            unconfident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Motion);
        assert_eq!(m.start_offset, 20);

        let input = rankings(vec![
            ranking(Modality::Audio, &[]),
            unconfident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Motion);
    }

    #[test]
    fn test_weightless_confidence_keeps_motion_fallback() {
        let input = rankings(vec![
            unconfident(Modality::Audio, "audio.mp4"),
            unconfident(Modality::Motion, "motion.mp4"),
            confident(Modality::Histogram, "histogram.mp4"),
        ]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(
            m,
            FinalMatch {
                video_id: "motion.mp4".to_string(),
                start_offset: 20,
                modality: Modality::Motion,
            }
        );

        // Once the histogram carries weight its confidence counts.
        let weights = FusionWeights {
            histogram: 0.1,
            ..Default::default()
        };
        let m = FusionStrategy::WeightedConfidence(weights)
            .fuse(&input)
            .unwrap();
        assert_eq!(m.modality, Modality::Histogram);
    }

    #[test]
    fn test_unconfident_audio_only() {
        let input = rankings(vec![unconfident(Modality::Audio, "audio.mp4")]);
        let m = FusionStrategy::default().fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Audio);
        assert_eq!(m.video_id, "audio.mp4");
    }

    #[test]
    fn test_no_candidates() {
        let input = rankings(vec![
            ranking(Modality::Audio, &[]),
            ranking(Modality::Motion, &[]),
        ]);
        for strategy in [FusionStrategy::default(), FusionStrategy::Agreement] {
            assert!(matches!(
                strategy.fuse(&input),
                Err(Error::InsufficientData)
            ));
            assert!(matches!(
                strategy.fuse(&BTreeMap::new()),
                Err(Error::InsufficientData)
            ));
        }
    }

    #[test]
    fn test_agreement_on_shared_candidate() {
        let input = rankings(vec![
            ranking(
                Modality::Audio,
                &[("a.mp4", 3), ("shared.mp4", 42), ("b.mp4", 9)],
            ),
            ranking(
                Modality::Motion,
                &[("c.mp4", 1), ("d.mp4", 2), ("shared.mp4", 42)],
            ),
        ]);
        let m = FusionStrategy::Agreement.fuse(&input).unwrap();
        assert_eq!(
            m,
            FinalMatch {
                video_id: "shared.mp4".to_string(),
                start_offset: 42,
                modality: Modality::Audio,
            }
        );
    }

    #[test]
    fn test_agreement_fallbacks() {
        // No agreement, audio confident.
        let input = rankings(vec![
            confident(Modality::Audio, "audio.mp4"),
            unconfident(Modality::Motion, "motion.mp4"),
        ]);
        let m = FusionStrategy::Agreement.fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Audio);

        // No agreement, nobody confident.
        let input = rankings(vec![
            ranking(Modality::Audio, &[("a.mp4", 1), ("b.mp4", 2)]),
            ranking(Modality::Motion, &[("c.mp4", 3), ("d.mp4", 4)]),
        ]);
        let m = FusionStrategy::Agreement.fuse(&input).unwrap();
        assert_eq!(m.modality, Modality::Motion);
        assert_eq!(m.video_id, "c.mp4");
    }

    #[test]
    fn test_fuse_runs_inside_span() {
        let input = rankings(vec![confident(Modality::Audio, "audio.mp4")]);
        let recorder = SpanRecorder::default();
        let m = tracing::subscriber::with_default(recorder.clone(), || {
            FusionStrategy::default().fuse(&input)
        });
        assert_eq!(m.unwrap().video_id, "audio.mp4");
        assert_eq!(recorder.entered(), vec!["fuse"]);
    }
}
