use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One independent descriptor channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Per-second audio amplitude.
    Audio,
    /// Per-second percentage of moving pixels.
    Motion,
    /// Per-second color histogram.
    Histogram,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Motion => "motion",
            Modality::Histogram => "histogram",
        }
    }

    /// Returns true if sequences of this modality hold one vector per frame.
    pub fn is_vector(&self) -> bool {
        matches!(self, Modality::Histogram)
    }
}

impl Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
enum Frames {
    Scalar(Vec<f64>),
    Vector { dim: usize, data: Vec<Vec<f64>> },
}

/// An ordered, per-second descriptor sequence for one media item and one modality.
///
/// Sequences are immutable once built. Every frame carries the time index it was
/// extracted at; for sequences built from a plain list of values, the time index is
/// simply the position.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FeatureSequence {
    time_indices: Vec<u32>,
    frames: Frames,
}

impl FeatureSequence {
    /// Builds a scalar sequence indexed from 0.
    pub fn scalar(values: impl Into<Vec<f64>>) -> Result<Self> {
        let values = values.into();
        let seq = Self {
            time_indices: (0..values.len() as u32).collect(),
            frames: Frames::Scalar(values),
        };
        seq.validate()?;
        Ok(seq)
    }

    /// Builds a scalar sequence from `(time_index, value)` samples.
    pub fn from_samples(samples: impl IntoIterator<Item = (u32, f64)>) -> Result<Self> {
        let (time_indices, values): (Vec<u32>, Vec<f64>) = samples.into_iter().unzip();
        let seq = Self {
            time_indices,
            frames: Frames::Scalar(values),
        };
        seq.validate()?;
        Ok(seq)
    }

    /// Builds a histogram sequence indexed from 0. Every frame must have the same number of bins.
    pub fn histogram(rows: impl Into<Vec<Vec<f64>>>) -> Result<Self> {
        let rows = rows.into();
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let seq = Self {
            time_indices: (0..rows.len() as u32).collect(),
            frames: Frames::Vector { dim, data: rows },
        };
        seq.validate()?;
        Ok(seq)
    }

    /// Checks that every value is finite and that all histogram frames share one shape.
    ///
    /// Deserialized sequences skip the constructors, so loaders call this explicitly.
    pub fn validate(&self) -> Result<()> {
        if self.time_indices.len() != self.len() {
            return Err(Error::MalformedFeatureData {
                line: 0,
                reason: format!(
                    "{} time indices for {} frames",
                    self.time_indices.len(),
                    self.len()
                ),
            });
        }
        match &self.frames {
            Frames::Scalar(values) => {
                if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                    return Err(Error::NonFiniteFeature { index });
                }
            }
            Frames::Vector { dim, data } => {
                for (index, row) in data.iter().enumerate() {
                    if row.len() != *dim {
                        return Err(Error::InvalidFeatureShape {
                            expected: *dim,
                            found: row.len(),
                        });
                    }
                    if row.iter().any(|v| !v.is_finite()) {
                        return Err(Error::NonFiniteFeature { index });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match &self.frames {
            Frames::Scalar(values) => values.len(),
            Frames::Vector { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values per frame: 1 for scalar sequences, the bin count for histograms.
    pub fn dimension(&self) -> usize {
        match &self.frames {
            Frames::Scalar(_) => 1,
            Frames::Vector { dim, .. } => *dim,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match &self.frames {
            Frames::Scalar(_) => "scalar",
            Frames::Vector { .. } => "histogram",
        }
    }

    /// Returns the time index of the frame at `position`.
    pub fn time_index(&self, position: usize) -> u32 {
        self.time_indices[position]
    }

    pub fn time_indices(&self) -> &[u32] {
        &self.time_indices
    }

    pub fn as_scalar(&self) -> Option<&[f64]> {
        match &self.frames {
            Frames::Scalar(values) => Some(values),
            Frames::Vector { .. } => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&[Vec<f64>]> {
        match &self.frames {
            Frames::Scalar(_) => None,
            Frames::Vector { data, .. } => Some(data),
        }
    }

    /// Iterates over `(time_index, value)` pairs of a scalar sequence.
    pub fn samples(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        let values = self.as_scalar().unwrap_or(&[]);
        self.time_indices.iter().copied().zip(values.iter().copied())
    }

    fn check_modality(&self, modality: Modality) -> Result<()> {
        let matches = match &self.frames {
            Frames::Scalar(_) => !modality.is_vector(),
            Frames::Vector { .. } => modality.is_vector(),
        };
        if !matches {
            return Err(Error::FeatureKindMismatch {
                query: modality.as_str(),
                reference: self.kind(),
            });
        }
        Ok(())
    }
}

/// A reference recording's features for one modality.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Reference {
    pub video_id: String,
    pub features: FeatureSequence,
}

impl Reference {
    pub fn new(video_id: impl Into<String>, features: FeatureSequence) -> Self {
        Self {
            video_id: video_id.into(),
            features,
        }
    }
}

/// Reference features for every modality, in the order they were added.
///
/// Reference order matters: when two candidates tie on distance, the one from the
/// earlier reference wins.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FeatureLibrary {
    references: BTreeMap<Modality, Vec<Reference>>,
}

impl FeatureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reference sequence for `modality`.
    pub fn insert(
        &mut self,
        modality: Modality,
        video_id: impl Into<String>,
        features: FeatureSequence,
    ) -> Result<()> {
        features.check_modality(modality)?;
        self.references
            .entry(modality)
            .or_default()
            .push(Reference::new(video_id, features));
        Ok(())
    }

    /// Returns a new [FeatureLibrary] with the provided references appended for `modality`.
    pub fn with_references(
        mut self,
        modality: Modality,
        references: impl IntoIterator<Item = Reference>,
    ) -> Result<Self> {
        for r in references {
            self.insert(modality, r.video_id, r.features)?;
        }
        Ok(self)
    }

    /// Returns the references stored for `modality`, in insertion order.
    pub fn references(&self, modality: Modality) -> &[Reference] {
        self.references
            .get(&modality)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.references.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.references.values().all(|r| r.is_empty())
    }

    fn validate(&self) -> Result<()> {
        for (modality, references) in &self.references {
            for r in references {
                r.features.validate()?;
                r.features.check_modality(*modality)?;
            }
        }
        Ok(())
    }

    /// Loads a library written by [FeatureLibrary::save].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let library: Self = load_bincode(path)?;
        library.validate()?;
        Ok(library)
    }

    /// Loads a library from a JSON document.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let library: Self = load_json(path)?;
        library.validate()?;
        Ok(library)
    }

    /// Writes this library to disk using bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut f = std::fs::File::create(path.as_ref())?;
        bincode::serialize_into(&mut f, self)?;
        Ok(())
    }
}

/// Query clip features, at most one sequence per modality.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QueryFeatures {
    sequences: BTreeMap<Modality, FeatureSequence>,
}

impl QueryFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new [QueryFeatures] with `features` set for `modality`.
    pub fn with(mut self, modality: Modality, features: FeatureSequence) -> Result<Self> {
        features.check_modality(modality)?;
        self.sequences.insert(modality, features);
        Ok(self)
    }

    pub fn get(&self, modality: Modality) -> Option<&FeatureSequence> {
        self.sequences.get(&modality)
    }

    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.sequences.keys().copied()
    }

    /// Loads query features from a JSON document.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let query: Self = load_json(path)?;
        for (modality, features) in &query.sequences {
            features.validate()?;
            features.check_modality(*modality)?;
        }
        Ok(query)
    }
}

fn load_bincode<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FeatureDataNotFound(path.to_owned()));
    }
    let f = std::fs::File::open(path)?;
    Ok(bincode::deserialize_from(std::io::BufReader::new(f))?)
}

fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FeatureDataNotFound(path.to_owned()));
    }
    let f = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(f))?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scalar_sequence_is_indexed_from_zero() {
        let seq = FeatureSequence::scalar(vec![0.5, 0.1, 0.2]).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.dimension(), 1);
        assert_eq!(seq.time_indices(), &[0, 1, 2]);
        assert_eq!(
            seq.samples().collect::<Vec<_>>(),
            vec![(0, 0.5), (1, 0.1), (2, 0.2)]
        );
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let err = FeatureSequence::scalar(vec![0.1, f64::NAN]).unwrap_err();
        assert!(matches!(err, Error::NonFiniteFeature { index: 1 }));
    }

    #[test]
    fn test_histogram_rows_must_share_shape() {
        let err = FeatureSequence::histogram(vec![vec![0.5, 0.5], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFeatureShape {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_library_rejects_wrong_kind() {
        let mut library = FeatureLibrary::new();
        let scalar = FeatureSequence::scalar(vec![0.1]).unwrap();
        assert!(library
            .insert(Modality::Histogram, "a.mp4", scalar.clone())
            .is_err());
        library.insert(Modality::Audio, "a.mp4", scalar).unwrap();
        assert_eq!(library.references(Modality::Audio).len(), 1);
        assert!(library.references(Modality::Motion).is_empty());
    }

    #[test]
    fn test_library_persistence() {
        let mut library = FeatureLibrary::new();
        library
            .insert(
                Modality::Motion,
                "video1.mp4",
                FeatureSequence::from_samples(vec![(0, 0.25), (1, 0.5)]).unwrap(),
            )
            .unwrap();
        library
            .insert(
                Modality::Histogram,
                "video1.mp4",
                FeatureSequence::histogram(vec![vec![0.5, 0.5]]).unwrap(),
            )
            .unwrap();

        let path = std::env::temp_dir().join(format!("haystack-lib-{}.bin", std::process::id()));
        library.save(&path).unwrap();
        let loaded = FeatureLibrary::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            loaded.references(Modality::Motion),
            library.references(Modality::Motion)
        );
        assert_eq!(
            loaded.references(Modality::Histogram),
            library.references(Modality::Histogram)
        );
    }

    #[test]
    fn test_missing_library_file() {
        let err = FeatureLibrary::from_path("/nonexistent/haystack.bin").unwrap_err();
        assert!(matches!(err, Error::FeatureDataNotFound(_)));
    }
}
