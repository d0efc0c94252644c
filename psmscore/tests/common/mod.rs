#![allow(dead_code)]
use std::sync::Arc;

use mzpeaks::Tolerance;
use rand::prelude::*;

use psmscore::spectrum::PROTON;
use psmscore::{IonConstraint, IonMatchScore, IonSeriesScorer, Peptide, PeptideList, Spectrum};

pub const PRECURSOR_MASS: f64 = 1000.0;

/// A charge 2 spectrum whose precursor neutral mass is [`PRECURSOR_MASS`]
pub fn spectrum(first_scan: u32) -> Spectrum {
    Spectrum::from_pairs(
        first_scan,
        PRECURSOR_MASS / 2.0 + PROTON,
        &[(175.119, 100.0), (276.155, 50.0), (389.239, 20.0)],
    )
}

/// Scores a peptide named `P{i}` with the `i`-th entry of a score table.
/// SP is requested without neutral losses, XCorr with them.
pub struct TableScorer {
    pub sp: Vec<f32>,
    pub xcorr: Vec<f32>,
    pub calls: usize,
}

impl TableScorer {
    pub fn new(sp: Vec<f32>, xcorr: Vec<f32>) -> Self {
        Self { sp, xcorr, calls: 0 }
    }

    pub fn peptides(&self, prefix: &str, proteins_per_peptide: u32) -> PeptideList {
        let peptides = (0..self.sp.len().max(self.xcorr.len()))
            .map(|i| {
                let proteins = (0..proteins_per_peptide).map(|j| i as u32 + j).collect();
                Arc::new(Peptide::new(format!("{prefix}{i}"), PRECURSOR_MASS, proteins))
            })
            .collect();
        PeptideList::new(peptides, Tolerance::Da(1.0))
    }

    fn index_of(peptide: &Peptide) -> usize {
        peptide
            .sequence
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .unwrap()
    }
}

impl IonSeriesScorer<Spectrum> for TableScorer {
    fn score(
        &mut self,
        _spectrum: &Spectrum,
        peptide: &Peptide,
        constraint: &IonConstraint,
    ) -> IonMatchScore {
        self.calls += 1;
        let i = Self::index_of(peptide);
        if constraint.use_neutral_losses {
            IonMatchScore::new(self.xcorr.get(i).copied().unwrap_or(0.0), 0, 0)
        } else {
            IonMatchScore::new(self.sp.get(i).copied().unwrap_or(0.0), (i % 7) as u32, 14)
        }
    }
}

pub fn gumbel_sample<R: Rng>(rng: &mut R, n: usize, mu: f64, lambda: f64) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let u: f64 = rng.gen_range(f64::EPSILON..1.0);
            (mu - (-u.ln()).ln() / lambda) as f32
        })
        .collect()
}

/// Draw from a Weibull distribution located at `-shift`
pub fn weibull_sample<R: Rng>(rng: &mut R, n: usize, eta: f64, beta: f64, shift: f64) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let u: f64 = rng.gen_range(f64::EPSILON..1.0);
            (eta * (-u.ln()).powf(1.0 / beta) - shift) as f32
        })
        .collect()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
