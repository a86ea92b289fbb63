use std::path::PathBuf;

pub mod matcher;
pub mod util;

pub use matcher::Modality;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("insufficient data: no modality produced a candidate")]
    InsufficientData,
    #[error("invalid feature shape: expected {expected} values per frame, found {found}")]
    InvalidFeatureShape { expected: usize, found: usize },
    #[error("cannot align {query} features against {reference} features")]
    FeatureKindMismatch {
        query: &'static str,
        reference: &'static str,
    },
    #[error("query feature sequence is empty")]
    EmptyQuery,
    #[error("non-finite feature value at frame {index}")]
    NonFiniteFeature { index: usize },
    #[error("no query features provided for modality: {0}")]
    MissingQuery(Modality),
    #[error("malformed feature data at line {line}: {reason}")]
    MalformedFeatureData { line: usize, reason: String },
    #[error("feature data not found at: {0:?}")]
    FeatureDataNotFound(PathBuf),
    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
