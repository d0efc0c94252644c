/*! An owning, score-aware container of [`Match`] records.

[`MatchArray`] is the storage shared by the per-spectrum
[`MatchCollection`](crate::collection::MatchCollection) and the cross-run
[`PostProcessCollection`](crate::post_process::PostProcessCollection). It
tracks which score kinds have been computed, which ordering it is currently in,
and whether a [`MatchIterator`] is currently reading from it.
*/
use std::cell::Cell;
use std::ops::Index;

use tracing::debug;

use crate::error::MatchCollectionError;
use crate::iter::MatchIterator;
use crate::psm::Match;
use crate::score_kind::{ScoreKind, NUM_SCORE_KINDS};

/// The default upper bound on the number of matches one array may hold
pub const DEFAULT_MAX_MATCHES: usize = 10_000_000;

#[derive(Debug, Clone)]
pub struct MatchArray {
    matches: Vec<Match>,
    capacity: usize,
    scored_type: [bool; NUM_SCORE_KINDS],
    last_sorted: Option<ScoreKind>,
    pub(crate) iterator_lock: Cell<bool>,
}

impl Default for MatchArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for MatchArray {
    type Output = Match;

    fn index(&self, index: usize) -> &Self::Output {
        &self.matches[index]
    }
}

impl MatchArray {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_MATCHES)
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            matches: Vec::new(),
            capacity,
            scored_type: [false; NUM_SCORE_KINDS],
            last_sorted: None,
            iterator_lock: Cell::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&Match> {
        self.matches.get(index)
    }

    pub fn first(&self) -> Option<&Match> {
        self.matches.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn as_slice(&self) -> &[Match] {
        &self.matches
    }

    pub fn is_locked(&self) -> bool {
        self.iterator_lock.get()
    }

    pub fn is_scored(&self, kind: ScoreKind) -> bool {
        self.scored_type[kind.index()]
    }

    pub fn scored_types(&self) -> &[bool; NUM_SCORE_KINDS] {
        &self.scored_type
    }

    pub fn mark_scored(&mut self, kind: ScoreKind) {
        self.scored_type[kind.index()] = true;
    }

    pub fn set_scored_types(&mut self, scored_type: [bool; NUM_SCORE_KINDS]) {
        self.scored_type = scored_type;
    }

    pub fn last_sorted(&self) -> Option<ScoreKind> {
        self.last_sorted
    }

    fn check_unlocked(&self) -> Result<(), MatchCollectionError> {
        if self.iterator_lock.get() {
            Err(MatchCollectionError::IteratorLocked)
        } else {
            Ok(())
        }
    }

    fn check_scored(&self, kind: ScoreKind) -> Result<(), MatchCollectionError> {
        if self.is_scored(kind) {
            Ok(())
        } else {
            Err(MatchCollectionError::NotScored(kind))
        }
    }

    /// Append a match, failing if the array is full or being iterated over
    pub fn push(&mut self, m: Match) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        if self.matches.len() >= self.capacity {
            return Err(MatchCollectionError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.matches.push(m);
        self.last_sorted = None;
        Ok(())
    }

    /// Mutable access to the matches. The current ordering is forgotten.
    pub(crate) fn matches_mut(&mut self) -> Result<&mut [Match], MatchCollectionError> {
        self.check_unlocked()?;
        self.last_sorted = None;
        Ok(&mut self.matches)
    }

    /// Remove and return every match from `start` onward
    pub(crate) fn split_off(&mut self, start: usize) -> Result<Vec<Match>, MatchCollectionError> {
        self.check_unlocked()?;
        if start >= self.matches.len() {
            return Ok(Vec::new());
        }
        Ok(self.matches.split_off(start))
    }

    pub(crate) fn retain<F: FnMut(&Match) -> bool>(
        &mut self,
        f: F,
    ) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        self.matches.retain(f);
        Ok(())
    }

    /// Sort the matches in descending order of `kind`'s score.
    ///
    /// The sort is stable, and unscored values order after every scored one.
    /// If the array is already ordered by a kind sharing `kind`'s ordering
    /// this does nothing.
    pub fn sort(&mut self, kind: ScoreKind) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        let sort_kind = kind.sort_kind();
        self.check_scored(sort_kind)?;
        if self
            .last_sorted
            .is_some_and(|last| last.same_order(&sort_kind))
        {
            return Ok(());
        }
        debug!("Sorting {} matches by {}", self.len(), sort_kind);
        self.matches
            .sort_by(|a, b| b.sort_key(sort_kind).total_cmp(&a.sort_key(sort_kind)));
        self.last_sorted = Some(sort_kind);
        Ok(())
    }

    /// Order the matches by spectrum, then by charge, then by descending
    /// `kind` score.
    pub fn spectrum_sort(&mut self, kind: ScoreKind) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        let sort_kind = kind.sort_kind();
        self.check_scored(sort_kind)?;
        self.matches.sort_by(|a, b| {
            a.first_scan
                .cmp(&b.first_scan)
                .then(a.charge.cmp(&b.charge))
                .then_with(|| b.sort_key(sort_kind).total_cmp(&a.sort_key(sort_kind)))
        });
        self.last_sorted = None;
        Ok(())
    }

    /// Assign ranks for `kind`, sorting first if needed.
    ///
    /// Ranks are distinct and follow the sorted order, so tied scores are
    /// ranked in the order they were inserted.
    pub fn populate_rank(&mut self, kind: ScoreKind) -> Result<(), MatchCollectionError> {
        self.check_scored(kind)?;
        self.sort(kind)?;
        for (i, m) in self.matches.iter_mut().enumerate() {
            m.set_rank(kind, (i + 1) as u32);
        }
        Ok(())
    }

    /// Keep only the `max_rank` best matches by `kind`
    pub fn truncate(&mut self, max_rank: usize, kind: ScoreKind) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        if self.matches.len() <= max_rank {
            return Ok(());
        }
        self.sort(kind)?;
        debug!(
            "Truncating {} matches to the top {max_rank} by {kind}",
            self.len()
        );
        self.matches.truncate(max_rank);
        Ok(())
    }

    /// Move every match out of `other` and into `self`.
    ///
    /// Unless `self` is empty, both arrays must have been scored with the
    /// same kinds.
    pub fn merge_from(&mut self, other: &mut MatchArray) -> Result<(), MatchCollectionError> {
        self.check_unlocked()?;
        other.check_unlocked()?;
        if self.is_empty() {
            self.scored_type = other.scored_type;
        } else if let Some(kind) = ScoreKind::ALL
            .iter()
            .find(|k| self.is_scored(**k) != other.is_scored(**k))
        {
            return Err(MatchCollectionError::ScoredTypeMismatch(*kind));
        }
        if self.matches.len() + other.matches.len() > self.capacity {
            return Err(MatchCollectionError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.matches.append(&mut other.matches);
        other.last_sorted = None;
        self.last_sorted = None;
        Ok(())
    }

    /// Sort by `kind` and then begin iterating over the matches in that order
    pub fn iter_sorted(&mut self, kind: ScoreKind) -> Result<MatchIterator<'_>, MatchCollectionError> {
        self.check_scored(kind)?;
        self.sort(kind)?;
        MatchIterator::new(self, kind)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::peptide::Peptide;

    fn make_array(sp: &[f32]) -> MatchArray {
        let mut arr = MatchArray::new();
        for (i, s) in sp.iter().enumerate() {
            let pep = Arc::new(Peptide::new(format!("PEP{i}"), 500.0 + i as f64, vec![i as u32]));
            let mut m = Match::new(pep, 1, 2, false);
            m.set_score(ScoreKind::Sp, *s);
            arr.push(m).unwrap();
        }
        arr.mark_scored(ScoreKind::Sp);
        arr
    }

    #[test]
    fn test_rank_and_truncate() {
        let mut arr = make_array(&[8.0, 1.0, 10.0, 8.0, 3.0]);
        arr.populate_rank(ScoreKind::Sp).unwrap();
        let scores: Vec<_> = arr.iter().map(|m| m.score(ScoreKind::Sp)).collect();
        let ranks: Vec<_> = arr.iter().map(|m| m.rank(ScoreKind::Sp)).collect();
        assert_eq!(scores, vec![10.0, 8.0, 8.0, 3.0, 1.0]);
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        // stable: PEP0 was inserted before PEP3
        assert_eq!(arr[1].sequence(), "PEP0");
        assert_eq!(arr[2].sequence(), "PEP3");

        arr.truncate(3, ScoreKind::Sp).unwrap();
        let scores: Vec<_> = arr.iter().map(|m| m.score(ScoreKind::Sp)).collect();
        assert_eq!(scores, vec![10.0, 8.0, 8.0]);
        assert_eq!(arr.last_sorted(), Some(ScoreKind::Sp));
    }

    #[test]
    fn test_unscored_sort() {
        let mut arr = make_array(&[1.0, 2.0]);
        assert!(matches!(
            arr.sort(ScoreKind::XCorr),
            Err(MatchCollectionError::NotScored(ScoreKind::XCorr))
        ));
        assert!(matches!(
            arr.populate_rank(ScoreKind::LogPExpSp),
            Err(MatchCollectionError::NotScored(ScoreKind::LogPExpSp))
        ));
    }

    #[test]
    fn test_nan_orders_last() {
        let mut arr = make_array(&[1.0, f32::NAN, 3.0]);
        arr.sort(ScoreKind::Sp).unwrap();
        assert_eq!(arr[0].score(ScoreKind::Sp), 3.0);
        assert!(arr[2].score(ScoreKind::Sp).is_nan());
    }

    #[test]
    fn test_capacity() {
        let mut arr = MatchArray::with_capacity_limit(1);
        let pep = Arc::new(Peptide::new("PEPTIDE".into(), 799.36, vec![0]));
        arr.push(Match::new(pep.clone(), 1, 2, false)).unwrap();
        assert!(matches!(
            arr.push(Match::new(pep, 1, 2, false)),
            Err(MatchCollectionError::CapacityExceeded { capacity: 1 })
        ));
    }

    #[test]
    fn test_iterator_lock() {
        let mut arr = make_array(&[3.0, 5.0, 4.0]);
        {
            let it = arr.iter_sorted(ScoreKind::Sp).unwrap();
            assert!(matches!(
                MatchIterator::new(it.array(), ScoreKind::Sp),
                Err(MatchCollectionError::IteratorLocked)
            ));
            let scores: Vec<_> = it.map(|m| m.score(ScoreKind::Sp)).collect();
            assert_eq!(scores, vec![5.0, 4.0, 3.0]);
        }
        assert!(!arr.is_locked());

        let it = MatchIterator::new(&arr, ScoreKind::Sp).unwrap();
        std::mem::forget(it);
        assert!(arr.is_locked());
        assert!(matches!(
            arr.truncate(1, ScoreKind::Sp),
            Err(MatchCollectionError::IteratorLocked)
        ));
    }

    #[test]
    fn test_merge_from() {
        let mut a = make_array(&[3.0, 5.0]);
        let mut b = make_array(&[4.0]);
        a.merge_from(&mut b).unwrap();
        assert_eq!(a.len(), 3);
        assert!(b.is_empty());

        let mut c = make_array(&[1.0]);
        c.mark_scored(ScoreKind::XCorr);
        assert!(matches!(
            a.merge_from(&mut c),
            Err(MatchCollectionError::ScoredTypeMismatch(ScoreKind::XCorr))
        ));

        let mut empty = MatchArray::new();
        empty.merge_from(&mut c).unwrap();
        assert!(empty.is_scored(ScoreKind::XCorr));
    }

    #[test]
    fn test_spectrum_sort() {
        let mut arr = make_array(&[1.0, 2.0, 3.0]);
        arr.matches_mut().unwrap()[2].first_scan = 0;
        arr.matches_mut().unwrap()[0].charge = 3;
        arr.spectrum_sort(ScoreKind::Sp).unwrap();
        let order: Vec<_> = arr.iter().map(|m| (m.first_scan, m.charge)).collect();
        assert_eq!(order, vec![(0, 2), (1, 2), (1, 3)]);
        assert_eq!(arr.last_sorted(), None);
    }
}
