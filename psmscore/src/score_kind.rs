//! Score kinds a peptide-spectrum match may be evaluated with
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// The numeric type every score is stored as
pub type ScoreValue = f32;

/// The value stored for a kind a match has not been scored with
pub const NOT_SCORED: ScoreValue = ScoreValue::NAN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScoreInterpretation {
    HigherIsBetter,
    LowerIsBetter,
}

/// The kinds of score a [`Match`](crate::psm::Match) can carry.
///
/// The declaration order is the on-disk order of the per-kind flags and
/// per-kind score/rank pairs, so new kinds must be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
pub enum ScoreKind {
    /// SEQUEST preliminary score
    Sp,
    /// SEQUEST primary score
    XCorr,
    /// -ln p-value of an exponential fit to the top SP scores
    LogPExpSp,
    /// [`ScoreKind::LogPExpSp`] with a Bonferroni correction
    LogPBonfExpSp,
    /// -ln p-value of an extreme value fit to sampled XCorr scores
    LogPEvdXCorr,
    /// [`ScoreKind::LogPEvdXCorr`] with a Bonferroni correction
    LogPBonfEvdXCorr,
    /// -ln p-value of a Weibull fit to SP scores
    LogPWeibullSp,
    /// [`ScoreKind::LogPWeibullSp`] with a Bonferroni correction
    LogPBonfWeibullSp,
    /// -ln p-value of a Weibull fit to XCorr scores
    LogPWeibullXCorr,
    /// [`ScoreKind::LogPWeibullXCorr`] with a Bonferroni correction
    LogPBonfWeibullXCorr,
    /// q-value derived from Weibull p-values
    LogPQValueWeibullXCorr,
    /// q-value derived from the empirical decoy null
    QValue,
    /// Score assigned by an external re-scoring step
    PercolatorScore,
}

pub const NUM_SCORE_KINDS: usize = 13;

impl ScoreKind {
    pub const ALL: [ScoreKind; NUM_SCORE_KINDS] = [
        ScoreKind::Sp,
        ScoreKind::XCorr,
        ScoreKind::LogPExpSp,
        ScoreKind::LogPBonfExpSp,
        ScoreKind::LogPEvdXCorr,
        ScoreKind::LogPBonfEvdXCorr,
        ScoreKind::LogPWeibullSp,
        ScoreKind::LogPBonfWeibullSp,
        ScoreKind::LogPWeibullXCorr,
        ScoreKind::LogPBonfWeibullXCorr,
        ScoreKind::LogPQValueWeibullXCorr,
        ScoreKind::QValue,
        ScoreKind::PercolatorScore,
    ];

    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<ScoreKind> {
        Self::ALL.get(index).copied()
    }

    /// The kind whose ordering this kind shares.
    ///
    /// Log-probabilities are monotone transforms of the raw score they were
    /// computed from, so a collection sorted by [`ScoreKind::Sp`] is already
    /// sorted by every SP-derived kind, and likewise for [`ScoreKind::XCorr`].
    pub const fn sort_kind(&self) -> ScoreKind {
        match self {
            ScoreKind::Sp
            | ScoreKind::LogPExpSp
            | ScoreKind::LogPBonfExpSp
            | ScoreKind::LogPWeibullSp
            | ScoreKind::LogPBonfWeibullSp => ScoreKind::Sp,
            ScoreKind::XCorr
            | ScoreKind::LogPEvdXCorr
            | ScoreKind::LogPBonfEvdXCorr
            | ScoreKind::LogPWeibullXCorr
            | ScoreKind::LogPBonfWeibullXCorr
            | ScoreKind::LogPQValueWeibullXCorr
            | ScoreKind::QValue => ScoreKind::XCorr,
            ScoreKind::PercolatorScore => ScoreKind::PercolatorScore,
        }
    }

    /// Whether two kinds order a collection identically
    #[inline]
    pub const fn same_order(&self, other: &ScoreKind) -> bool {
        self.sort_kind().index() == other.sort_kind().index()
    }

    /// Whether this kind is computed from a fitted null distribution of its
    /// base score
    pub const fn is_log_probability(&self) -> bool {
        matches!(
            self,
            ScoreKind::LogPExpSp
                | ScoreKind::LogPBonfExpSp
                | ScoreKind::LogPEvdXCorr
                | ScoreKind::LogPBonfEvdXCorr
                | ScoreKind::LogPWeibullSp
                | ScoreKind::LogPBonfWeibullSp
                | ScoreKind::LogPWeibullXCorr
                | ScoreKind::LogPBonfWeibullXCorr
        )
    }

    pub const fn interpretation(&self) -> ScoreInterpretation {
        match self {
            ScoreKind::QValue | ScoreKind::LogPQValueWeibullXCorr => {
                ScoreInterpretation::LowerIsBetter
            }
            _ => ScoreInterpretation::HigherIsBetter,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ScoreKind::Sp => "sp",
            ScoreKind::XCorr => "xcorr",
            ScoreKind::LogPExpSp => "logp_exp_sp",
            ScoreKind::LogPBonfExpSp => "logp_bonf_exp_sp",
            ScoreKind::LogPEvdXCorr => "logp_evd_xcorr",
            ScoreKind::LogPBonfEvdXCorr => "logp_bonf_evd_xcorr",
            ScoreKind::LogPWeibullSp => "logp_weibull_sp",
            ScoreKind::LogPBonfWeibullSp => "logp_bonf_weibull_sp",
            ScoreKind::LogPWeibullXCorr => "logp_weibull_xcorr",
            ScoreKind::LogPBonfWeibullXCorr => "logp_bonf_weibull_xcorr",
            ScoreKind::LogPQValueWeibullXCorr => "logp_qvalue_weibull_xcorr",
            ScoreKind::QValue => "q_value",
            ScoreKind::PercolatorScore => "percolator_score",
        }
    }
}

impl Display for ScoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown score kind `{0}`")]
pub struct ScoreKindParseError(String);

impl FromStr for ScoreKind {
    type Err = ScoreKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .find(|k| k.name() == normalized)
            .copied()
            .ok_or_else(|| ScoreKindParseError(s.to_string()))
    }
}

impl From<ScoreKind> for String {
    fn from(value: ScoreKind) -> Self {
        value.name().to_string()
    }
}

impl TryFrom<String> for ScoreKind {
    type Error = ScoreKindParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for (i, kind) in ScoreKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ScoreKind::from_index(i), Some(*kind));
        }
        assert_eq!(ScoreKind::from_index(NUM_SCORE_KINDS), None);
    }

    #[test]
    fn test_same_order() {
        assert!(ScoreKind::LogPBonfWeibullXCorr.same_order(&ScoreKind::XCorr));
        assert!(ScoreKind::LogPExpSp.same_order(&ScoreKind::Sp));
        assert!(!ScoreKind::Sp.same_order(&ScoreKind::XCorr));
        assert_eq!(ScoreKind::QValue.sort_kind(), ScoreKind::XCorr);
        assert!(!ScoreKind::QValue.is_log_probability());
        assert!(ScoreKind::LogPBonfExpSp.is_log_probability());
    }

    #[test]
    fn test_parse() {
        assert_eq!("xcorr".parse::<ScoreKind>().unwrap(), ScoreKind::XCorr);
        assert_eq!(
            "logp-bonf-weibull-xcorr".parse::<ScoreKind>().unwrap(),
            ScoreKind::LogPBonfWeibullXCorr
        );
        assert!("dotp".parse::<ScoreKind>().is_err());
    }
}
