//! The peptide-spectrum match record
use std::sync::Arc;

use crate::peptide::Peptide;
use crate::score_kind::{ScoreKind, ScoreValue, NOT_SCORED, NUM_SCORE_KINDS};

/// One candidate peptide paired with one spectrum at one charge state.
///
/// Each [`ScoreKind`] has a score slot and a rank slot. A slot is only
/// meaningful when the owning collection has marked that kind as scored.
#[derive(Debug, Clone)]
pub struct Match {
    pub peptide: Arc<Peptide>,
    pub scores: [ScoreValue; NUM_SCORE_KINDS],
    pub ranks: [u32; NUM_SCORE_KINDS],
    /// Whether the peptide came from a decoy database
    pub null_peptide: bool,
    pub first_scan: u32,
    pub charge: i32,
    pub delta_cn: ScoreValue,
    pub ln_delta_cn: ScoreValue,
    pub ln_experiment_size: ScoreValue,
    pub b_y_ions_matched: u32,
    pub b_y_ions_possible: u32,
}

impl Match {
    pub fn new(peptide: Arc<Peptide>, first_scan: u32, charge: i32, null_peptide: bool) -> Self {
        Self {
            peptide,
            scores: [NOT_SCORED; NUM_SCORE_KINDS],
            ranks: [0; NUM_SCORE_KINDS],
            null_peptide,
            first_scan,
            charge,
            delta_cn: 0.0,
            ln_delta_cn: 0.0,
            ln_experiment_size: 0.0,
            b_y_ions_matched: 0,
            b_y_ions_possible: 0,
        }
    }

    #[inline]
    pub fn score(&self, kind: ScoreKind) -> ScoreValue {
        self.scores[kind.index()]
    }

    #[inline]
    pub fn set_score(&mut self, kind: ScoreKind, value: ScoreValue) {
        self.scores[kind.index()] = value;
    }

    #[inline]
    pub fn rank(&self, kind: ScoreKind) -> u32 {
        self.ranks[kind.index()]
    }

    #[inline]
    pub fn set_rank(&mut self, kind: ScoreKind, rank: u32) {
        self.ranks[kind.index()] = rank;
    }

    /// The score used to order matches by `kind`'s ordering, with unscored
    /// values ordered last.
    #[inline]
    pub(crate) fn sort_key(&self, kind: ScoreKind) -> ScoreValue {
        let s = self.score(kind.sort_kind());
        if s.is_nan() {
            ScoreValue::NEG_INFINITY
        } else {
            s
        }
    }

    /// The fraction of predicted b and y ions that matched a peak
    pub fn b_y_ion_fraction_matched(&self) -> ScoreValue {
        if self.b_y_ions_possible == 0 {
            0.0
        } else {
            self.b_y_ions_matched as ScoreValue / self.b_y_ions_possible as ScoreValue
        }
    }

    pub fn sequence(&self) -> &str {
        &self.peptide.sequence
    }

    pub fn is_decoy(&self) -> bool {
        self.null_peptide
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unscored() {
        let pep = Arc::new(Peptide::new("PEPTIDE".into(), 799.36, vec![0]));
        let mut m = Match::new(pep, 5, 2, false);
        assert!(m.score(ScoreKind::XCorr).is_nan());
        assert_eq!(m.sort_key(ScoreKind::LogPWeibullXCorr), ScoreValue::NEG_INFINITY);
        m.set_score(ScoreKind::XCorr, 2.5);
        assert_eq!(m.sort_key(ScoreKind::LogPWeibullXCorr), 2.5);
        assert_eq!(m.b_y_ion_fraction_matched(), 0.0);
        m.b_y_ions_matched = 3;
        m.b_y_ions_possible = 12;
        assert_eq!(m.b_y_ion_fraction_matched(), 0.25);
    }
}
