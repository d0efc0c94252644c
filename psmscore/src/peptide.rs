//! Candidate peptides and the sources that produce them for a precursor mass
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use mzpeaks::Tolerance;

/// A candidate peptide.
///
/// The same peptide may be a candidate for many spectra, so it is shared
/// between matches through an [`Arc`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peptide {
    pub sequence: String,
    /// The neutral monoisotopic mass
    pub mass: f64,
    /// Indices of the proteins this peptide was digested from
    pub protein_indices: Vec<u32>,
}

impl Peptide {
    pub fn new(sequence: String, mass: f64, protein_indices: Vec<u32>) -> Self {
        Self {
            sequence,
            mass,
            protein_indices,
        }
    }

    /// A key identifying this peptide's sequence, stable within a process
    /// and across processes built from the same toolchain
    pub fn identity_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.sequence.hash(&mut hasher);
        hasher.finish()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Add the protein sources of `other` not already present on `self`
    pub fn merge_sources(&mut self, other: &Peptide) {
        for idx in other.protein_indices.iter() {
            if !self.protein_indices.contains(idx) {
                self.protein_indices.push(*idx);
            }
        }
    }
}

/// Produces the candidate peptides for a precursor mass.
///
/// The iterator is finite and is consumed once.
pub trait CandidateGenerator {
    fn candidates<'a>(&'a self, mass: f64) -> Box<dyn Iterator<Item = Arc<Peptide>> + 'a>;
}

/// An in-memory [`CandidateGenerator`] that selects peptides by mass
#[derive(Debug, Clone)]
pub struct PeptideList {
    peptides: Vec<Arc<Peptide>>,
    pub error_tolerance: Tolerance,
}

impl PeptideList {
    pub fn new(mut peptides: Vec<Arc<Peptide>>, error_tolerance: Tolerance) -> Self {
        peptides.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        Self {
            peptides,
            error_tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Peptide>> {
        self.peptides.iter()
    }
}

impl FromIterator<Peptide> for PeptideList {
    fn from_iter<T: IntoIterator<Item = Peptide>>(iter: T) -> Self {
        Self::new(
            iter.into_iter().map(Arc::new).collect(),
            Tolerance::Da(3.0),
        )
    }
}

impl CandidateGenerator for PeptideList {
    fn candidates<'a>(&'a self, mass: f64) -> Box<dyn Iterator<Item = Arc<Peptide>> + 'a> {
        let (lo, _) = self.error_tolerance.bounds(mass);
        let start = self.peptides.partition_point(|p| p.mass < lo);
        let tol = self.error_tolerance;
        Box::new(
            self.peptides[start..]
                .iter()
                .take_while(move |p| p.mass <= tol.bounds(mass).1)
                .filter(move |p| tol.test(p.mass, mass))
                .cloned(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mass_window() {
        let peptides: PeptideList = vec![
            Peptide::new("PEPTIDE".into(), 799.36, vec![0]),
            Peptide::new("PEPTIDER".into(), 955.46, vec![1]),
            Peptide::new("PEPTLDE".into(), 799.40, vec![2]),
        ]
        .into_iter()
        .collect();

        let hits: Vec<_> = peptides.candidates(799.0).collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|p| p.mass < 800.0));

        let hits: Vec<_> = peptides.candidates(500.0).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_merge_sources() {
        let mut a = Peptide::new("PEPTIDE".into(), 799.36, vec![0, 3]);
        let b = Peptide::new("PEPTIDE".into(), 799.36, vec![3, 5]);
        a.merge_sources(&b);
        assert_eq!(a.protein_indices, vec![0, 3, 5]);
        assert_eq!(a.identity_hash(), b.identity_hash());
    }
}
