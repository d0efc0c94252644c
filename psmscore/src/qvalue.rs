//! Target-decoy q-value estimation
use std::iter;

use itertools::Itertools;
use tracing::debug;

use crate::array::MatchArray;
use crate::error::MatchCollectionError;
use crate::score_kind::{ScoreKind, ScoreValue};

/// The estimated false discovery rate among `num_targets` targets given
/// `num_decoys` decoys pooled from `num_decoy_sets` decoy searches
fn decoy_fdr(num_targets: usize, num_decoys: usize, num_decoy_sets: usize) -> ScoreValue {
    if num_targets == 0 {
        return 1.0;
    }
    let decoys_per_set = num_decoys as f64 / num_decoy_sets.max(1) as f64;
    ((decoys_per_set + 1.0) / num_targets as f64).min(1.0) as ScoreValue
}

/// Assign each match the q-value implied by the decoys ranked at or above it
/// by XCorr.
///
/// Walking down the XCorr order, the false discovery rate at each score is
/// `(decoys / num_decoy_sets + 1) / targets`, counting every match scoring at
/// least as well, capped at 1. Matches with equal XCorr share one rate. The
/// q-value of a match is the smallest false discovery rate at that match or
/// any below it. The result is stored as [`ScoreKind::QValue`].
pub fn compute_decoy_q_values(
    array: &mut MatchArray,
    num_decoy_sets: usize,
) -> Result<(), MatchCollectionError> {
    array.sort(ScoreKind::XCorr)?;
    let matches = array.matches_mut()?;

    let mut num_targets = 0usize;
    let mut num_decoys = 0usize;
    let mut fdrs: Vec<ScoreValue> = Vec::with_capacity(matches.len());
    {
        let ties = matches
            .iter()
            .group_by(|m| m.score(ScoreKind::XCorr).to_bits());
        for (_, group) in &ties {
            let mut size = 0;
            for m in group {
                size += 1;
                if m.null_peptide {
                    num_decoys += 1;
                } else {
                    num_targets += 1;
                }
            }
            let fdr = decoy_fdr(num_targets, num_decoys, num_decoy_sets);
            fdrs.extend(iter::repeat(fdr).take(size));
        }
    }

    let mut running_min: ScoreValue = 1.0;
    for (m, fdr) in matches.iter_mut().zip(fdrs).rev() {
        running_min = running_min.min(fdr);
        m.set_score(ScoreKind::QValue, running_min);
    }

    array.mark_scored(ScoreKind::QValue);
    // Only the QValue slot changed, so the XCorr order still holds
    array.sort(ScoreKind::XCorr)?;
    debug!(
        "Computed q-values from {num_targets} targets and {num_decoys} decoys in {num_decoy_sets} sets"
    );
    Ok(())
}
