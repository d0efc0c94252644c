/*! The per-spectrum match collection and its calibration state.

A [`MatchCollection`] holds every candidate match for one spectrum at one
charge state. It is filled by preliminary scoring, calibrated by fitting a null
distribution to its scores, truncated to the best matches, re-scored with the
primary score and finally converted to log-probabilities.
*/
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use itertools::Itertools;
use rand::seq::index::sample;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::array::MatchArray;
use crate::distribution::{
    fit_evd, fit_three_parameter_weibull, EvdParameters, FitFraction, ShiftSearch,
    WeibullParameters, MIN_WEIBULL_MATCHES,
};
use crate::error::MatchCollectionError;
use crate::peptide::Peptide;
use crate::psm::Match;
use crate::pvalue;
use crate::score_kind::{ScoreKind, ScoreValue, NOT_SCORED};
use crate::spectrum::{IonConstraint, IonSeriesScorer, SpectrumLike};

/// The `delta_cn` assigned when there is no second-best match to compare to
pub const DELTA_CN_EPSILON: ScoreValue = 1e-6;

const PROGRESS_INTERVAL: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct MatchCollection {
    array: MatchArray,
    pub charge: i32,
    /// The number of candidates scored before any truncation
    pub experiment_size: usize,
    /// Whether every candidate in this collection is a decoy
    pub null_peptide_collection: bool,
    pub evd: EvdParameters,
    pub weibull: WeibullParameters,
    pub sp_scores_mean: f64,
    pub base_score_sp: f64,
    pub top_fit_sp: usize,
    pub delta_cn: ScoreValue,
    stored_scores: Vec<ScoreValue>,
    top_scoring_sp: Option<Match>,
}

impl Deref for MatchCollection {
    type Target = MatchArray;

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl DerefMut for MatchCollection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

impl MatchCollection {
    pub fn new(null_peptide_collection: bool) -> Self {
        Self {
            null_peptide_collection,
            ..Default::default()
        }
    }

    pub fn with_capacity_limit(null_peptide_collection: bool, capacity: usize) -> Self {
        Self {
            array: MatchArray::with_capacity_limit(capacity),
            null_peptide_collection,
            ..Default::default()
        }
    }

    pub fn array(&self) -> &MatchArray {
        &self.array
    }

    pub fn into_array(self) -> MatchArray {
        self.array
    }

    pub fn mu(&self) -> f64 {
        self.evd.mu
    }

    pub fn lambda(&self) -> f64 {
        self.evd.lambda
    }

    pub fn eta(&self) -> f64 {
        self.weibull.eta
    }

    pub fn beta(&self) -> f64 {
        self.weibull.beta
    }

    pub fn shift(&self) -> f64 {
        self.weibull.shift
    }

    pub fn correlation(&self) -> f64 {
        self.weibull.correlation
    }

    pub fn ln_delta_cn(&self) -> ScoreValue {
        self.delta_cn.ln()
    }

    pub fn ln_experiment_size(&self) -> ScoreValue {
        (self.experiment_size as ScoreValue).ln()
    }

    pub fn top_scoring_sp(&self) -> Option<&Match> {
        self.top_scoring_sp.as_ref()
    }

    pub fn stored_scores(&self) -> &[ScoreValue] {
        &self.stored_scores
    }

    pub fn has_enough_weibull_points(&self) -> bool {
        self.experiment_size >= MIN_WEIBULL_MATCHES
    }

    /// Create a match for every candidate and score it with `kind`.
    ///
    /// The collection must be empty. Afterwards `experiment_size` is the number
    /// of candidates scored and the matches are ranked by `kind`.
    #[tracing::instrument(skip_all, level = "debug", fields(scan = spectrum.first_scan(), charge = charge))]
    pub fn score_preliminary<S, I, Sc>(
        &mut self,
        spectrum: &S,
        charge: i32,
        candidates: I,
        scorer: &mut Sc,
        kind: ScoreKind,
    ) -> Result<usize, MatchCollectionError>
    where
        S: SpectrumLike,
        I: IntoIterator<Item = Arc<Peptide>>,
        Sc: IonSeriesScorer<S>,
    {
        if !self.array.is_empty() {
            return Err(MatchCollectionError::NotEmpty);
        }
        self.charge = charge;
        let constraint = IonConstraint::for_kind(kind, charge);
        let first_scan = spectrum.first_scan();

        let mut count = 0usize;
        let mut running_mean = 0.0f64;
        for peptide in candidates {
            let result = scorer.score(spectrum, &peptide, &constraint);
            let mut m = Match::new(peptide, first_scan, charge, self.null_peptide_collection);
            m.set_score(kind, result.score);
            if kind == ScoreKind::Sp {
                m.b_y_ions_matched = result.b_y_ions_matched;
                m.b_y_ions_possible = result.b_y_ions_possible;
            }
            self.array.push(m)?;

            count += 1;
            running_mean += (result.score as f64 - running_mean) / count as f64;
            if count % PROGRESS_INTERVAL == 0 {
                info!("Scored {count} candidates for scan {first_scan} at charge {charge}");
            }
        }

        self.experiment_size = count;
        if kind == ScoreKind::Sp {
            self.sp_scores_mean = running_mean;
        }
        self.array.mark_scored(kind);
        self.array.populate_rank(kind)?;
        debug!("Scored {count} candidates by {kind}, mean {running_mean:.3}");
        Ok(count)
    }

    fn score_all<S: SpectrumLike, Sc: IonSeriesScorer<S>>(
        &mut self,
        spectrum: &S,
        charge: i32,
        scorer: &mut Sc,
        kind: ScoreKind,
    ) -> Result<(), MatchCollectionError> {
        let constraint = IonConstraint::for_kind(kind, charge);
        for m in self.array.matches_mut()?.iter_mut() {
            let result = scorer.score(spectrum, &m.peptide, &constraint);
            m.set_score(kind, result.score);
        }
        self.array.mark_scored(kind);
        Ok(())
    }

    /// Score every remaining match with XCorr, rank them and compute
    /// `delta_cn`, the difference between the best and second best scores.
    #[tracing::instrument(skip_all, level = "debug", fields(scan = spectrum.first_scan(), charge = charge))]
    pub fn score_primary<S: SpectrumLike, Sc: IonSeriesScorer<S>>(
        &mut self,
        spectrum: &S,
        charge: i32,
        scorer: &mut Sc,
    ) -> Result<(), MatchCollectionError> {
        self.charge = charge;
        self.score_all(spectrum, charge, scorer, ScoreKind::XCorr)?;
        self.array.populate_rank(ScoreKind::XCorr)?;

        self.delta_cn = match (self.array.get(0), self.array.get(1)) {
            (Some(top), Some(second)) => {
                let delta = top.score(ScoreKind::XCorr) - second.score(ScoreKind::XCorr);
                if delta > 0.0 {
                    delta
                } else {
                    DELTA_CN_EPSILON
                }
            }
            _ => DELTA_CN_EPSILON,
        };

        let (delta_cn, ln_delta_cn, ln_experiment_size) =
            (self.delta_cn, self.ln_delta_cn(), self.ln_experiment_size());
        for m in self.array.matches_mut()?.iter_mut() {
            m.delta_cn = delta_cn;
            m.ln_delta_cn = ln_delta_cn;
            m.ln_experiment_size = ln_experiment_size;
        }
        // The per-match fields above do not change the XCorr order
        self.array.sort(ScoreKind::XCorr)?;
        Ok(())
    }

    /// Merge matches to the same peptide sequence that tie on the current
    /// ordering's score, unioning their protein sources.
    ///
    /// Returns the number of matches removed, which is also deducted from
    /// `experiment_size`.
    pub fn collapse_redundant_matches(&mut self) -> Result<usize, MatchCollectionError> {
        let kind = match self.array.last_sorted() {
            Some(kind) => kind,
            None if self.array.is_scored(ScoreKind::XCorr) => ScoreKind::XCorr,
            None => ScoreKind::Sp,
        };
        self.array.sort(kind)?;

        let matches = self.array.split_off(0)?;
        let before = matches.len();
        let mut kept: Vec<Match> = Vec::with_capacity(before);
        let runs = matches.into_iter().group_by(|m| m.score(kind).to_bits());
        for (_, run) in &runs {
            let run_start = kept.len();
            for m in run {
                match kept[run_start..]
                    .iter()
                    .position(|k| k.peptide.sequence == m.peptide.sequence)
                {
                    Some(j) => {
                        Arc::make_mut(&mut kept[run_start + j].peptide).merge_sources(&m.peptide)
                    }
                    None => kept.push(m),
                }
            }
        }

        let removed = before - kept.len();
        for m in kept {
            self.array.push(m)?;
        }
        self.experiment_size = self.experiment_size.saturating_sub(removed);
        self.array.populate_rank(kind)?;
        if removed > 0 {
            debug!("Collapsed {removed} redundant matches");
        }
        Ok(removed)
    }

    /// Remember the best SP match so it can be reported even if it is
    /// truncated away
    pub fn save_top_sp_match(&mut self) -> Result<(), MatchCollectionError> {
        self.array.sort(ScoreKind::Sp)?;
        self.top_scoring_sp = self.array.first().cloned();
        Ok(())
    }

    fn sample_indices<R: Rng>(&self, sample_count: usize, rng: &mut R) -> Vec<usize> {
        let n = self.array.len();
        if sample_count == 0 || sample_count >= n {
            (0..n).collect()
        } else {
            sample(rng, n, sample_count).into_vec()
        }
    }

    /// Fit an extreme value distribution to the `kind` scores of a random
    /// sample of `sample_count` matches drawn without replacement.
    ///
    /// This should be called before truncation so the sample is drawn from
    /// every candidate.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn estimate_evd_parameters<S, Sc, R>(
        &mut self,
        sample_count: usize,
        kind: ScoreKind,
        spectrum: &S,
        charge: i32,
        scorer: &mut Sc,
        rng: &mut R,
    ) -> Result<EvdParameters, MatchCollectionError>
    where
        S: SpectrumLike,
        Sc: IonSeriesScorer<S>,
        R: Rng,
    {
        let indices = self.sample_indices(sample_count, rng);
        let constraint = IonConstraint::for_kind(kind, charge);
        let scores: Vec<ScoreValue> = indices
            .into_iter()
            .map(|i| scorer.score(spectrum, &self.array[i].peptide, &constraint).score)
            .collect();
        let params = fit_evd(&scores)?;
        debug!(
            "EVD parameters from {} sampled matches: mu={}, lambda={}",
            scores.len(),
            params.mu,
            params.lambda
        );
        self.evd = params;
        Ok(params)
    }

    /// Fit a three-parameter Weibull distribution to the `kind` scores of a
    /// random sample of `sample_count` matches, or every match if
    /// `sample_count` is zero.
    ///
    /// Scores already computed for `kind` are reused, otherwise the sample is
    /// scored with `scorer`.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn estimate_weibull_parameters<S, Sc, R>(
        &mut self,
        kind: ScoreKind,
        sample_count: usize,
        spectrum: &S,
        charge: i32,
        scorer: &mut Sc,
        rng: &mut R,
        fit_fraction: FitFraction,
    ) -> Result<WeibullParameters, MatchCollectionError>
    where
        S: SpectrumLike,
        Sc: IonSeriesScorer<S>,
        R: Rng,
    {
        let indices = self.sample_indices(sample_count, rng);
        let mut scores: Vec<ScoreValue> = if self.array.is_scored(kind) {
            indices.into_iter().map(|i| self.array[i].score(kind)).collect()
        } else {
            let constraint = IonConstraint::for_kind(kind, charge);
            indices
                .into_iter()
                .map(|i| scorer.score(spectrum, &self.array[i].peptide, &constraint).score)
                .collect()
        };
        scores.retain(|s| !s.is_nan());
        if scores.len() < MIN_WEIBULL_MATCHES {
            warn!(
                "Fitting a Weibull distribution to only {} {kind} scores",
                scores.len()
            );
        }
        let params = fit_weibull_to(scores, kind, fit_fraction);
        self.weibull = params;
        Ok(params)
    }

    /// Estimate the exponential tail of the top `top_count` SP scores
    pub fn estimate_exp_sp_parameters(&mut self, top_count: usize) -> Result<(), MatchCollectionError> {
        self.array.sort(ScoreKind::Sp)?;
        let top = top_count.min(self.array.len());
        if top == 0 {
            return Ok(());
        }
        let scores: Vec<f64> = self.array.as_slice()[..top]
            .iter()
            .map(|m| m.score(ScoreKind::Sp) as f64)
            .collect();
        self.base_score_sp = scores[top - 1];
        self.sp_scores_mean = scores.iter().sum::<f64>() / top as f64 - self.base_score_sp;
        self.top_fit_sp = top;
        debug!(
            "Exponential SP tail over {top} scores: base={}, mean={}",
            self.base_score_sp, self.sp_scores_mean
        );
        Ok(())
    }

    /// Add the XCorr scores of every match from `start_index` onward to the
    /// stored score pool.
    ///
    /// When `keep_matches` is false those matches are removed afterwards and
    /// no longer count towards `experiment_size`. Returns the number of
    /// scores stored.
    pub fn store_scores(
        &mut self,
        start_index: usize,
        keep_matches: bool,
    ) -> Result<usize, MatchCollectionError> {
        if !self.array.is_scored(ScoreKind::XCorr) {
            return Err(MatchCollectionError::NotScored(ScoreKind::XCorr));
        }
        let start = start_index.min(self.array.len());
        let before = self.stored_scores.len();
        self.stored_scores.extend(
            self.array.as_slice()[start..]
                .iter()
                .map(|m| m.score(ScoreKind::XCorr)),
        );
        let stored = self.stored_scores.len() - before;
        if !keep_matches {
            let removed = self.array.split_off(start)?;
            self.experiment_size = self.experiment_size.saturating_sub(removed.len());
        }
        Ok(stored)
    }

    /// Fit XCorr Weibull parameters from the stored score pool.
    ///
    /// Returns `false` and leaves the parameters untouched when the pool holds
    /// fewer than [`MIN_WEIBULL_MATCHES`] scores.
    pub fn estimate_weibull_parameters_from_stored_scores(&mut self, fit_fraction: FitFraction) -> bool {
        if self.stored_scores.len() < MIN_WEIBULL_MATCHES {
            debug!(
                "Only {} stored scores, not fitting Weibull parameters",
                self.stored_scores.len()
            );
            return false;
        }
        let scores: Vec<ScoreValue> = self
            .stored_scores
            .iter()
            .copied()
            .filter(|s| !s.is_nan())
            .collect();
        self.weibull = fit_weibull_to(scores, ScoreKind::XCorr, fit_fraction);
        true
    }

    pub fn transfer_weibull(&mut self, from: &MatchCollection) {
        self.weibull = from.weibull;
    }

    /// Convert the base score of the `top_n` best matches into the
    /// log-probability `kind`.
    ///
    /// Matches past `top_n` are left unscored for `kind`. No ranks are assigned
    /// since `kind` shares its base score's ordering.
    pub fn score_primary_logp(&mut self, kind: ScoreKind, top_n: usize) -> Result<(), MatchCollectionError> {
        let base = kind.sort_kind();
        if !self.array.is_scored(base) {
            return Err(MatchCollectionError::NotScored(base));
        }
        self.array.sort(base)?;

        let num_tests = self.experiment_size;
        let evd = self.evd;
        let weibull = self.weibull;
        let (base_sp, sp_mean) = (self.base_score_sp, self.sp_scores_mean);

        let logp: Box<dyn Fn(ScoreValue) -> ScoreValue> = match kind {
            ScoreKind::LogPEvdXCorr => Box::new(move |s| pvalue::score_logp_evd(s, evd.mu, evd.lambda)),
            ScoreKind::LogPBonfEvdXCorr => Box::new(move |s| {
                pvalue::score_logp_bonf_evd(s, evd.mu, evd.lambda, num_tests)
            }),
            ScoreKind::LogPWeibullXCorr | ScoreKind::LogPWeibullSp => Box::new(move |s| {
                pvalue::score_logp_weibull(s, weibull.eta, weibull.beta, weibull.shift)
            }),
            ScoreKind::LogPBonfWeibullXCorr | ScoreKind::LogPBonfWeibullSp => Box::new(move |s| {
                pvalue::score_logp_bonf_weibull(
                    s,
                    weibull.eta,
                    weibull.beta,
                    weibull.shift,
                    num_tests,
                )
            }),
            ScoreKind::LogPExpSp => Box::new(move |s| {
                pvalue::score_logp_exp_sp(s - base_sp as ScoreValue, sp_mean)
            }),
            ScoreKind::LogPBonfExpSp => Box::new(move |s| {
                pvalue::score_logp_bonf_exp_sp(s - base_sp as ScoreValue, sp_mean, num_tests)
            }),
            _ => {
                warn!("{kind} is not a log-probability score, nothing to compute");
                return Ok(());
            }
        };

        let matches = self.array.matches_mut()?;
        for (i, m) in matches.iter_mut().enumerate() {
            let value = if i < top_n {
                logp(m.score(base))
            } else {
                NOT_SCORED
            };
            m.set_score(kind, value);
        }
        self.array.mark_scored(kind);
        self.array.sort(base)?;
        Ok(())
    }
}

fn fit_weibull_to(mut scores: Vec<ScoreValue>, kind: ScoreKind, fit_fraction: FitFraction) -> WeibullParameters {
    scores.sort_by(|a, b| b.total_cmp(a));
    let n = scores.len();
    let fit_n = fit_fraction.fit_count(n);
    fit_three_parameter_weibull(&scores, fit_n, n, ShiftSearch::for_kind(kind))
}
