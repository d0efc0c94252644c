use std::ops::{Add, AddAssign};

/// Counts gathered while reading and aggregating match collection files
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AggregationRecord {
    pub files_read: usize,
    pub spectra_read: usize,
    pub matches_read: usize,
    pub matches_kept: usize,
}

impl AggregationRecord {
    pub fn sum(self, rhs: Self) -> Self {
        self + rhs
    }

    pub fn duplicate_matches(&self) -> usize {
        self.matches_read.saturating_sub(self.matches_kept)
    }
}

impl Add for AggregationRecord {
    type Output = AggregationRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for AggregationRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.files_read += rhs.files_read;
        self.spectra_read += rhs.spectra_read;
        self.matches_read += rhs.matches_read;
        self.matches_kept += rhs.matches_kept;
    }
}
