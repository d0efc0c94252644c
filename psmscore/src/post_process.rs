/*! Aggregation of serialized match collections across spectra and runs.

A [`PostProcessCollection`] gathers the matches of many spectra, typically
every `.csm` file of one target or decoy set, and keeps per-protein counts of
the PSMs and distinct peptides assigned to each protein.
*/
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::{self, BufReader, Read};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::bufread::GzDecoder;
use identity_hash::BuildIdentityHasher;
use tracing::{debug, warn};

use crate::array::MatchArray;
use crate::error::MatchCollectionError;
use crate::peptide::Peptide;
use crate::psm::Match;
use crate::serialize::{PsmFileReader, SpectrumBlock, CSM_EXTENSION};

pub type ProteinCounter = HashMap<u32, u32, BuildIdentityHasher<u32>>;
/// Peptides seen so far, keyed by [`Peptide::identity_hash`]
pub type PeptideIndex = HashMap<u64, Vec<Arc<Peptide>>, BuildIdentityHasher<u64>>;

/// Which search a set of match collection files came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SetType {
    Target,
    /// The n-th decoy search, counting from 1
    Decoy(u32),
}

impl Display for SetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetType::Target => write!(f, "target"),
            SetType::Decoy(n) => write!(f, "decoy-{n}"),
        }
    }
}

impl SetType {
    /// The file name suffix of this set's files
    pub fn suffix(&self) -> String {
        match self {
            SetType::Target => format!(".{CSM_EXTENSION}"),
            SetType::Decoy(n) => format!("-decoy-{n}.{CSM_EXTENSION}"),
        }
    }

    pub fn is_decoy(&self) -> bool {
        matches!(self, SetType::Decoy(_))
    }

    /// Work out which set a file belongs to from its name, ignoring a trailing
    /// `.gz`
    pub fn classify(file_name: &str) -> Option<SetType> {
        let name = file_name.strip_suffix(".gz").unwrap_or(file_name);
        let stem = name
            .strip_suffix(CSM_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))?;
        match stem.rsplit_once("-decoy-") {
            Some((_, n)) => n.parse().ok().map(SetType::Decoy),
            None => Some(SetType::Target),
        }
    }
}

/// List the files in `dir` belonging to `set_type`, in name order
pub fn csm_files_in(dir: &Path, set_type: SetType) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let belongs = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(SetType::classify)
            .is_some_and(|t| t == set_type);
        if belongs {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Open a match collection file, decompressing it if its name ends in `.gz`
pub fn open_csm(path: &Path) -> Result<PsmFileReader<Box<dyn Read + Send>>, MatchCollectionError> {
    let handle = BufReader::new(fs::File::open(path)?);
    let stream: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(handle))
    } else {
        Box::new(handle)
    };
    PsmFileReader::new(stream)
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessCollection {
    array: MatchArray,
    protein_counter: ProteinCounter,
    protein_peptide_counter: ProteinCounter,
    peptides_seen: PeptideIndex,
    scored_type_set: bool,
    pub num_spectra: usize,
}

impl Deref for PostProcessCollection {
    type Target = MatchArray;

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl DerefMut for PostProcessCollection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

impl PostProcessCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            array: MatchArray::with_capacity_limit(capacity),
            ..Default::default()
        }
    }

    pub fn array(&self) -> &MatchArray {
        &self.array
    }

    pub fn into_array(self) -> MatchArray {
        self.array
    }

    /// The number of PSMs assigned to protein `idx`
    pub fn protein_counter(&self, idx: u32) -> u32 {
        self.protein_counter.get(&idx).copied().unwrap_or_default()
    }

    /// The number of distinct peptides assigned to protein `idx`
    pub fn protein_peptide_counter(&self, idx: u32) -> u32 {
        self.protein_peptide_counter
            .get(&idx)
            .copied()
            .unwrap_or_default()
    }

    pub fn num_proteins_seen(&self) -> usize {
        self.protein_counter.len()
    }

    pub fn proteins(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.protein_counter
            .iter()
            .map(|(idx, psms)| (*idx, *psms, self.protein_peptide_counter(*idx)))
    }

    pub fn contains_peptide(&self, m: &Match) -> bool {
        self.peptides_seen
            .get(&m.peptide.identity_hash())
            .is_some_and(|seen| seen.iter().any(|p| p.sequence == m.peptide.sequence))
    }

    /// Record `peptide` under `hash`, returning whether its sequence was new
    fn record_peptide(&mut self, hash: u64, peptide: &Arc<Peptide>) -> bool {
        let seen = self.peptides_seen.entry(hash).or_default();
        if seen.iter().any(|p| p.sequence == peptide.sequence) {
            false
        } else {
            seen.push(peptide.clone());
            true
        }
    }

    /// Count `m` towards its proteins and keep it if its peptide has not been
    /// seen before.
    ///
    /// Returns whether the match was kept.
    pub fn add_match(&mut self, m: Match) -> Result<bool, MatchCollectionError> {
        if self.array.len() >= self.array.capacity() {
            return Err(MatchCollectionError::CapacityExceeded {
                capacity: self.array.capacity(),
            });
        }
        let first_seen = self.record_peptide(m.peptide.identity_hash(), &m.peptide);
        for idx in m.peptide.protein_indices.iter() {
            *self.protein_counter.entry(*idx).or_default() += 1;
            if first_seen {
                *self.protein_peptide_counter.entry(*idx).or_default() += 1;
            }
        }
        if first_seen {
            self.array.push(m)?;
        }
        Ok(first_seen)
    }

    /// Add every match of one spectrum block. The first block added decides
    /// which score kinds the collection holds.
    pub fn add_block(&mut self, block: SpectrumBlock) -> Result<usize, MatchCollectionError> {
        if !self.scored_type_set {
            self.array.set_scored_types(block.scored_type);
            self.scored_type_set = true;
        } else if self.array.scored_types() != &block.scored_type {
            warn!(
                "Spectrum block at charge {} was scored with different score kinds than the first block",
                block.charge
            );
        }
        self.num_spectra += 1;
        let mut kept = 0;
        for m in block.matches {
            if self.add_match(m)? {
                kept += 1;
            }
        }
        Ok(kept)
    }

    /// Read every spectrum block of a serialized match collection.
    ///
    /// Returns the number of blocks read. A file holding a different number
    /// of blocks than its header declares is an error.
    pub fn extend_from_reader<R: Read>(&mut self, reader: R) -> Result<usize, MatchCollectionError> {
        let mut reader = PsmFileReader::new(reader)?;
        while let Some(block) = reader.next_block()? {
            self.add_block(block)?;
        }
        Ok(reader.blocks_read())
    }

    pub fn extend_from_path(&mut self, path: &Path) -> Result<usize, MatchCollectionError> {
        let handle = BufReader::new(fs::File::open(path)?);
        let n = if path.extension().is_some_and(|ext| ext == "gz") {
            self.extend_from_reader(GzDecoder::new(handle))?
        } else {
            self.extend_from_reader(handle)?
        };
        debug!("Read {n} spectra from {}", path.display());
        Ok(n)
    }

    /// Read every file of `set_type` in `dir`
    pub fn from_directory(dir: &Path, set_type: SetType) -> Result<Self, MatchCollectionError> {
        let mut this = Self::new();
        for path in csm_files_in(dir, set_type)? {
            this.extend_from_path(&path)?;
        }
        Ok(this)
    }
}
