use std::iter::FusedIterator;

use crate::array::MatchArray;
use crate::error::MatchCollectionError;
use crate::psm::Match;
use crate::score_kind::ScoreKind;

/// A cursor over a [`MatchArray`] fixed to one score kind.
///
/// At most one iterator may be alive per array. Constructing one takes the
/// array's lock, and dropping it releases the lock. Matches are yielded in
/// the array's current order, so use [`MatchArray::iter_sorted`] to sort
/// first.
#[derive(Debug)]
pub struct MatchIterator<'a> {
    array: &'a MatchArray,
    kind: ScoreKind,
    index: usize,
}

impl<'a> MatchIterator<'a> {
    pub fn new(array: &'a MatchArray, kind: ScoreKind) -> Result<Self, MatchCollectionError> {
        if !array.is_scored(kind) {
            return Err(MatchCollectionError::NotScored(kind));
        }
        if array.iterator_lock.replace(true) {
            return Err(MatchCollectionError::IteratorLocked);
        }
        Ok(Self {
            array,
            kind,
            index: 0,
        })
    }

    pub fn kind(&self) -> ScoreKind {
        self.kind
    }

    pub fn array(&self) -> &'a MatchArray {
        self.array
    }

    pub fn has_next(&self) -> bool {
        self.index < self.array.len()
    }

    pub fn remaining(&self) -> usize {
        self.array.len().saturating_sub(self.index)
    }
}

impl<'a> Iterator for MatchIterator<'a> {
    type Item = &'a Match;

    fn next(&mut self) -> Option<Self::Item> {
        let m = self.array.get(self.index)?;
        self.index += 1;
        Some(m)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for MatchIterator<'_> {}

impl FusedIterator for MatchIterator<'_> {}

impl Drop for MatchIterator<'_> {
    fn drop(&mut self) {
        self.array.iterator_lock.set(false);
    }
}
