//! The search protocol that turns one spectrum and a candidate source into a
//! scored, calibrated and truncated [`MatchCollection`].
use rand::Rng;
use tracing::{debug, warn};

use crate::collection::MatchCollection;
use crate::distribution::FitFraction;
use crate::error::MatchCollectionError;
use crate::peptide::CandidateGenerator;
use crate::score_kind::ScoreKind;
use crate::spectrum::{IonSeriesScorer, SpectrumLike};

/// Parameters controlling [`MatchCollection::search`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchParams {
    /// The number of matches kept after preliminary scoring
    pub max_rank: usize,
    pub prelim_kind: ScoreKind,
    /// The score to report matches by
    pub main_kind: ScoreKind,
    /// A mass added to the precursor's neutral mass before looking up
    /// candidates
    pub mass_offset: f64,
    /// Whether the candidates are decoys
    pub is_decoy: bool,
    /// How many of the top matches receive a log-probability score
    pub top_rank_for_p_value: usize,
    /// How many matches to sample when fitting a null distribution. Zero uses
    /// every match for Weibull fits.
    pub sample_count: usize,
    /// How many of the top SP scores the exponential tail is fit to
    pub top_fit_sp: usize,
    pub fit_fraction: FitFraction,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_rank: 500,
            prelim_kind: ScoreKind::Sp,
            main_kind: ScoreKind::XCorr,
            mass_offset: 0.0,
            is_decoy: false,
            top_rank_for_p_value: 5,
            sample_count: 500,
            top_fit_sp: 1000,
            fit_fraction: FitFraction::default(),
        }
    }
}

impl MatchCollection {
    /// Build the match collection for `spectrum` at `charge`.
    ///
    /// Candidates are scored with `params.prelim_kind`, the null distribution
    /// needed by `params.main_kind` is estimated from every candidate, then
    /// all but the `params.max_rank` best are dropped and the survivors are
    /// scored with XCorr and, if `params.main_kind` is a log-probability,
    /// converted.
    ///
    /// Returns `Ok(None)` when there are no candidates for the spectrum.
    #[tracing::instrument(skip_all, level = "debug", fields(scan = spectrum.first_scan(), charge = charge))]
    pub fn search<S, G, Sc, R>(
        spectrum: &S,
        charge: i32,
        generator: &G,
        scorer: &mut Sc,
        params: &SearchParams,
        rng: &mut R,
    ) -> Result<Option<MatchCollection>, MatchCollectionError>
    where
        S: SpectrumLike,
        G: CandidateGenerator + ?Sized,
        Sc: IonSeriesScorer<S>,
        R: Rng,
    {
        let mut collection = MatchCollection::new(params.is_decoy);
        let mass = spectrum.neutral_mass(charge) + params.mass_offset;
        collection.score_preliminary(
            spectrum,
            charge,
            generator.candidates(mass),
            scorer,
            params.prelim_kind,
        )?;

        if collection.is_empty() {
            warn!(
                "No candidates for scan {} at charge {charge} (mass {mass:.4})",
                spectrum.first_scan()
            );
            return Ok(None);
        }

        match params.main_kind {
            ScoreKind::LogPEvdXCorr | ScoreKind::LogPBonfEvdXCorr => {
                collection.estimate_evd_parameters(
                    params.sample_count,
                    ScoreKind::XCorr,
                    spectrum,
                    charge,
                    scorer,
                    rng,
                )?;
            }
            ScoreKind::LogPWeibullXCorr | ScoreKind::LogPBonfWeibullXCorr => {
                collection.estimate_weibull_parameters(
                    ScoreKind::XCorr,
                    params.sample_count,
                    spectrum,
                    charge,
                    scorer,
                    rng,
                    params.fit_fraction,
                )?;
            }
            ScoreKind::LogPWeibullSp | ScoreKind::LogPBonfWeibullSp => {
                collection.estimate_weibull_parameters(
                    ScoreKind::Sp,
                    0,
                    spectrum,
                    charge,
                    scorer,
                    rng,
                    params.fit_fraction,
                )?;
            }
            ScoreKind::LogPExpSp | ScoreKind::LogPBonfExpSp => {
                collection.estimate_exp_sp_parameters(params.top_fit_sp)?;
            }
            _ => {}
        }

        if collection.is_scored(ScoreKind::Sp) {
            collection.save_top_sp_match()?;
        }
        collection.truncate(params.max_rank, params.prelim_kind)?;
        collection.score_primary(spectrum, charge, scorer)?;

        if params.main_kind.is_log_probability() {
            collection.score_primary_logp(params.main_kind, params.top_rank_for_p_value)?;
        }
        debug!(
            "Kept {} of {} candidates, delta_cn={}",
            collection.len(),
            collection.experiment_size,
            collection.delta_cn
        );
        Ok(Some(collection))
    }
}
