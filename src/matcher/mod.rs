mod aligner;
mod confidence;
mod data;
mod fusion;
mod histogram;
mod ranker;
mod search;
pub mod text;

pub use aligner::{Aligner, Alignment, HistogramMetric, JumpPenalty};
pub use confidence::check_confidence;
pub use data::{FeatureLibrary, FeatureSequence, Modality, QueryFeatures, Reference};
pub use fusion::{FinalMatch, FusionStrategy, FusionWeights};
pub use histogram::{HistogramMatch, HistogramSearch};
pub use ranker::{rank, Candidate, RankedResults, TopK};
pub use search::{MatchReport, Matcher};

/// Default number of candidates kept per modality.
///
/// The confidence check compares the top candidate against ranks 1 and 2, so anything
/// below 3 weakens it.
pub const DEFAULT_TOP_K: usize = 3;

/// Default fusion weight of the audio modality.
pub const DEFAULT_AUDIO_WEIGHT: f64 = 0.7;

/// Default fusion weight of the motion modality.
pub const DEFAULT_MOTION_WEIGHT: f64 = 0.3;

/// Default fusion weight of the histogram modality.
///
/// Histograms are scored on their own path and do not take part in fusion unless a
/// caller hands a histogram ranking to [FusionStrategy::fuse] directly.
pub const DEFAULT_HISTOGRAM_WEIGHT: f64 = 0.0;

/// Score given to one modality when no modality is confident, so that fusion can still
/// pick a winner.
pub const DEFAULT_UNCONFIDENT_SCORE: f64 = 0.5;

/// Maximum length (in frames) of the sub-window used for temporal histogram similarity.
pub const DEFAULT_TEMPORAL_WINDOW: usize = 10;

/// Number of references reported by the histogram scoring path.
pub const DEFAULT_HISTOGRAM_RESULTS: usize = 10;

/// Order in which modalities win ties during fusion.
pub const FUSION_PREFERENCE: [Modality; 3] = [Modality::Audio, Modality::Motion, Modality::Histogram];
