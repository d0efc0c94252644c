pub mod score_kind;
pub mod error;
pub mod peptide;
pub mod spectrum;
pub mod psm;
pub mod array;
pub mod iter;
pub mod collection;
pub mod scoring;

pub mod distribution;
pub mod pvalue;
pub mod serialize;
pub mod post_process;
pub mod qvalue;

pub use crate::array::{MatchArray, DEFAULT_MAX_MATCHES};
pub use crate::collection::{MatchCollection, DELTA_CN_EPSILON};
pub use crate::error::MatchCollectionError;
pub use crate::iter::MatchIterator;
pub use crate::peptide::{CandidateGenerator, Peptide, PeptideList};
pub use crate::post_process::{PostProcessCollection, SetType};
pub use crate::psm::Match;
pub use crate::score_kind::{ScoreInterpretation, ScoreKind, ScoreValue, NUM_SCORE_KINDS};
pub use crate::scoring::SearchParams;
pub use crate::spectrum::{IonConstraint, IonMatchScore, IonSeriesScorer, Spectrum, SpectrumLike};
