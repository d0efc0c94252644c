use std::io;

use thiserror::Error;

use crate::score_kind::ScoreKind;

/// An error that might occur while building, scoring, iterating over or
/// (de)serializing a collection of matches
#[derive(Debug, Error)]
pub enum MatchCollectionError {
    #[error("The collection cannot hold more than {capacity} matches")]
    CapacityExceeded { capacity: usize },
    #[error("Block claims {found} matches but at most {limit} are allowed")]
    CapacityMismatch { found: usize, limit: usize },
    #[error("Header declares {declared} spectra but the file holds at least {found}")]
    SpectrumCountMismatch { declared: usize, found: usize },
    #[error("Distribution fit did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error("Unexpected end of input while reading {field}")]
    ShortRead { field: &'static str },
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
    #[error("Peptide sequence is not valid UTF-8")]
    InvalidSequence,
    #[error("The collection is already being iterated over")]
    IteratorLocked,
    #[error("The collection has not been scored with {0}")]
    NotScored(ScoreKind),
    #[error("The collection must be empty before preliminary scoring")]
    NotEmpty,
    #[error("The collections were not scored with the same kinds, differing at {0}")]
    ScoredTypeMismatch(ScoreKind),
}

impl MatchCollectionError {
    /// Convert an IO error raised while reading `field`, treating a premature
    /// end of input as a short read
    pub(crate) fn from_read(err: io::Error, field: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::ShortRead { field }
        } else {
            Self::IOError(err)
        }
    }
}
