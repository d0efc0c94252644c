/*! Interfaces to the spectrum and the fragment-ion scoring machinery a match
collection is scored against */
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, PeakSet, Tolerance};

use crate::peptide::Peptide;
use crate::score_kind::{ScoreKind, ScoreValue};

pub const PROTON: f64 = 1.00727646677;

/// The minimal view of an observed tandem mass spectrum a match needs
pub trait SpectrumLike {
    fn first_scan(&self) -> u32;
    fn precursor_mz(&self) -> f64;

    /// The neutral mass of the precursor assuming `charge`
    fn neutral_mass(&self, charge: i32) -> f64 {
        (self.precursor_mz() - PROTON) * charge as f64
    }
}

/// A centroided spectrum held in memory
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub first_scan: u32,
    pub precursor_mz: f64,
    pub peaks: PeakSet,
}

impl Spectrum {
    pub fn new(first_scan: u32, precursor_mz: f64, peaks: PeakSet) -> Self {
        Self {
            first_scan,
            precursor_mz,
            peaks,
        }
    }

    pub fn from_pairs(first_scan: u32, precursor_mz: f64, pairs: &[(f64, f32)]) -> Self {
        let peaks = PeakSet::new(
            pairs
                .iter()
                .enumerate()
                .map(|(i, (mz, inten))| CentroidPeak::new(*mz, *inten, i as u32))
                .collect(),
        );
        Self::new(first_scan, precursor_mz, peaks)
    }

    pub fn has_peak(&self, mz: f64, error_tolerance: Tolerance) -> Option<&CentroidPeak> {
        self.peaks.has_peak(mz, error_tolerance)
    }
}

impl SpectrumLike for Spectrum {
    fn first_scan(&self) -> u32 {
        self.first_scan
    }

    fn precursor_mz(&self) -> f64 {
        self.precursor_mz
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonSeries {
    B,
    Y,
}

/// Which fragment ions to predict and how to compare them to a spectrum.
///
/// A constraint depends only on the precursor charge, so it is built once per
/// charge and reused for every candidate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IonConstraint {
    pub series: Vec<IonSeries>,
    pub max_fragment_charge: i32,
    pub use_neutral_losses: bool,
    pub use_flanking_peaks: bool,
    pub error_tolerance: Tolerance,
}

impl IonConstraint {
    /// The constraint used for the preliminary SP score
    pub fn sequest_sp(charge: i32) -> Self {
        Self {
            series: vec![IonSeries::B, IonSeries::Y],
            max_fragment_charge: (charge - 1).max(1),
            use_neutral_losses: false,
            use_flanking_peaks: false,
            error_tolerance: Tolerance::Da(0.5),
        }
    }

    /// The constraint used for the primary XCorr score
    pub fn sequest_xcorr(charge: i32) -> Self {
        Self {
            series: vec![IonSeries::B, IonSeries::Y],
            max_fragment_charge: (charge - 1).max(1),
            use_neutral_losses: true,
            use_flanking_peaks: true,
            error_tolerance: Tolerance::Da(0.5),
        }
    }

    pub fn for_kind(kind: ScoreKind, charge: i32) -> Self {
        match kind.sort_kind() {
            ScoreKind::Sp => Self::sequest_sp(charge),
            _ => Self::sequest_xcorr(charge),
        }
    }
}

/// The outcome of comparing one peptide's predicted ions to a spectrum
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IonMatchScore {
    pub score: ScoreValue,
    pub b_y_ions_matched: u32,
    pub b_y_ions_possible: u32,
}

impl IonMatchScore {
    pub fn new(score: ScoreValue, b_y_ions_matched: u32, b_y_ions_possible: u32) -> Self {
        Self {
            score,
            b_y_ions_matched,
            b_y_ions_possible,
        }
    }
}

/// Predicts the fragment ions of a peptide and scores them against a spectrum.
///
/// Implementations may cache per-spectrum state, so scoring takes `&mut self`.
pub trait IonSeriesScorer<S: SpectrumLike> {
    fn score(
        &mut self,
        spectrum: &S,
        peptide: &Peptide,
        constraint: &IonConstraint,
    ) -> IonMatchScore;
}

impl<S: SpectrumLike, T: IonSeriesScorer<S>> IonSeriesScorer<S> for &mut T {
    fn score(
        &mut self,
        spectrum: &S,
        peptide: &Peptide,
        constraint: &IonConstraint,
    ) -> IonMatchScore {
        (**self).score(spectrum, peptide, constraint)
    }
}
