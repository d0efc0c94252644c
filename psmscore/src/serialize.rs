/*! Reading and writing serialized match collections.

A file starts with a header of three little-endian `i32`s:

| field | meaning |
|-------|---------|
| `total_spectra` | the number of spectrum blocks that follow |
| `num_spectrum_features` | always zero |
| `num_top_match` | the most matches any block may hold |

Each spectrum block is `i32 charge`, `i32 count`, `f32 delta_cn`,
`f32 ln(delta_cn)`, `f32 ln(experiment_size)`, one byte per [`ScoreKind`]
flagging whether it was scored, then `count` match records. A file must hold
exactly `total_spectra` blocks. A match record is
the peptide (`u32` length-prefixed UTF-8 sequence, `f64` mass, `u32`
length-prefixed `u32` protein indices), an (`f32` score, `i32` rank) pair per
[`ScoreKind`], `u32 first_scan`, `f32` b/y ion fraction matched, `u32` b/y ions
matched, `u32` b/y ions possible and a one byte decoy flag.
*/
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::debug;

use crate::collection::MatchCollection;
use crate::error::MatchCollectionError;
use crate::peptide::Peptide;
use crate::psm::Match;
use crate::score_kind::{ScoreKind, ScoreValue, NUM_SCORE_KINDS};

/// The extension of a serialized match collection file
pub const CSM_EXTENSION: &str = "csm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub total_spectra: i32,
    pub num_spectrum_features: i32,
    pub num_top_match: i32,
}

impl FileHeader {
    pub fn new(total_spectra: i32, num_top_match: i32) -> Self {
        Self {
            total_spectra,
            num_spectrum_features: 0,
            num_top_match,
        }
    }
}

/// The matches for one spectrum at one charge state as read from a file
#[derive(Debug, Clone)]
pub struct SpectrumBlock {
    pub charge: i32,
    pub delta_cn: ScoreValue,
    pub ln_delta_cn: ScoreValue,
    pub ln_experiment_size: ScoreValue,
    pub scored_type: [bool; NUM_SCORE_KINDS],
    pub matches: Vec<Match>,
}

macro_rules! read_le {
    ($reader:expr, $t:ty, $field:literal) => {{
        let mut buf = [0u8; std::mem::size_of::<$t>()];
        $reader
            .read_exact(&mut buf)
            .map_err(|e| MatchCollectionError::from_read(e, $field))?;
        <$t>::from_le_bytes(buf)
    }};
}

fn read_bool<R: Read>(reader: &mut R, field: &'static str) -> Result<bool, MatchCollectionError> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|e| MatchCollectionError::from_read(e, field))?;
    Ok(buf[0] != 0)
}

pub fn write_header<W: Write>(writer: &mut W, header: &FileHeader) -> io::Result<()> {
    writer.write_all(&header.total_spectra.to_le_bytes())?;
    writer.write_all(&header.num_spectrum_features.to_le_bytes())?;
    writer.write_all(&header.num_top_match.to_le_bytes())?;
    Ok(())
}

pub fn read_header<R: Read>(reader: &mut R) -> Result<FileHeader, MatchCollectionError> {
    let total_spectra = read_le!(reader, i32, "total_spectra");
    let num_spectrum_features = read_le!(reader, i32, "num_spectrum_features");
    let num_top_match = read_le!(reader, i32, "num_top_match");
    Ok(FileHeader {
        total_spectra,
        num_spectrum_features,
        num_top_match,
    })
}

pub fn write_match<W: Write>(writer: &mut W, m: &Match) -> io::Result<()> {
    let peptide = &m.peptide;
    writer.write_all(&(peptide.sequence.len() as u32).to_le_bytes())?;
    writer.write_all(peptide.sequence.as_bytes())?;
    writer.write_all(&peptide.mass.to_le_bytes())?;
    writer.write_all(&(peptide.protein_indices.len() as u32).to_le_bytes())?;
    for idx in peptide.protein_indices.iter() {
        writer.write_all(&idx.to_le_bytes())?;
    }
    for (score, rank) in m.scores.iter().zip(m.ranks.iter()) {
        writer.write_all(&score.to_le_bytes())?;
        writer.write_all(&(*rank as i32).to_le_bytes())?;
    }
    writer.write_all(&m.first_scan.to_le_bytes())?;
    writer.write_all(&m.b_y_ion_fraction_matched().to_le_bytes())?;
    writer.write_all(&m.b_y_ions_matched.to_le_bytes())?;
    writer.write_all(&m.b_y_ions_possible.to_le_bytes())?;
    writer.write_all(&[m.null_peptide as u8])?;
    Ok(())
}

/// Read one match record. The charge and the per-spectrum fields are left
/// for the caller to fill in.
pub fn read_match<R: Read>(reader: &mut R) -> Result<Match, MatchCollectionError> {
    let seq_len = read_le!(reader, u32, "sequence length") as usize;
    let mut seq_buf = Vec::with_capacity(seq_len.min(1 << 16));
    reader
        .by_ref()
        .take(seq_len as u64)
        .read_to_end(&mut seq_buf)
        .map_err(|e| MatchCollectionError::from_read(e, "sequence"))?;
    if seq_buf.len() < seq_len {
        return Err(MatchCollectionError::ShortRead { field: "sequence" });
    }
    let sequence = String::from_utf8(seq_buf).map_err(|_| MatchCollectionError::InvalidSequence)?;
    let mass = read_le!(reader, f64, "peptide mass");

    let n_proteins = read_le!(reader, u32, "protein count") as usize;
    let mut protein_indices = Vec::with_capacity(n_proteins.min(1 << 12));
    for _ in 0..n_proteins {
        protein_indices.push(read_le!(reader, u32, "protein index"));
    }

    let peptide = Arc::new(Peptide::new(sequence, mass, protein_indices));
    let mut m = Match::new(peptide, 0, 0, false);
    for i in 0..NUM_SCORE_KINDS {
        m.scores[i] = read_le!(reader, f32, "score");
        m.ranks[i] = read_le!(reader, i32, "rank").max(0) as u32;
    }
    m.first_scan = read_le!(reader, u32, "first_scan");
    let _fraction = read_le!(reader, f32, "b/y ion fraction");
    m.b_y_ions_matched = read_le!(reader, u32, "b/y ions matched");
    m.b_y_ions_possible = read_le!(reader, u32, "b/y ions possible");
    m.null_peptide = read_bool(reader, "null_peptide")?;
    Ok(m)
}

/// Fill `buf` from `reader`, returning `false` if the input was already at
/// its end and failing if it ended part way through
fn read_exact_or_eof<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> Result<bool, MatchCollectionError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(MatchCollectionError::ShortRead { field }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Read the next spectrum block, or `None` at the end of the input.
///
/// # Errors
/// [`MatchCollectionError::CapacityMismatch`] if the block holds more than
/// `num_top_match` matches, and [`MatchCollectionError::ShortRead`] if the
/// input ends inside the block.
pub fn read_block<R: Read>(
    reader: &mut R,
    num_top_match: usize,
) -> Result<Option<SpectrumBlock>, MatchCollectionError> {
    let mut buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut buf, "charge")? {
        return Ok(None);
    }
    let charge = i32::from_le_bytes(buf);
    let count = read_le!(reader, i32, "match count").max(0) as usize;
    if count > num_top_match {
        return Err(MatchCollectionError::CapacityMismatch {
            found: count,
            limit: num_top_match,
        });
    }
    let delta_cn = read_le!(reader, f32, "delta_cn");
    let ln_delta_cn = read_le!(reader, f32, "ln_delta_cn");
    let ln_experiment_size = read_le!(reader, f32, "ln_experiment_size");
    let mut scored_type = [false; NUM_SCORE_KINDS];
    for flag in scored_type.iter_mut() {
        *flag = read_bool(reader, "scored_type")?;
    }

    let mut matches = Vec::with_capacity(count);
    for _ in 0..count {
        let mut m = read_match(reader)?;
        m.charge = charge;
        m.delta_cn = delta_cn;
        m.ln_delta_cn = ln_delta_cn;
        m.ln_experiment_size = ln_experiment_size;
        matches.push(m);
    }
    Ok(Some(SpectrumBlock {
        charge,
        delta_cn,
        ln_delta_cn,
        ln_experiment_size,
        scored_type,
        matches,
    }))
}

/// Writes match collections to a seekable stream, filling in the header's
/// spectrum count when finished
#[derive(Debug)]
pub struct PsmFileWriter<W: Write + Seek> {
    writer: W,
    start: u64,
    num_top_match: usize,
    main_kind: ScoreKind,
    total_spectra: i32,
}

impl<W: Write + Seek> PsmFileWriter<W> {
    /// Write a header for up to `num_top_match` matches per spectrum, reported
    /// in `main_kind` order
    pub fn new(
        mut writer: W,
        num_top_match: usize,
        main_kind: ScoreKind,
    ) -> Result<Self, MatchCollectionError> {
        let start = writer.stream_position()?;
        write_header(&mut writer, &FileHeader::new(0, num_top_match as i32))?;
        Ok(Self {
            writer,
            start,
            num_top_match,
            main_kind,
            total_spectra: 0,
        })
    }

    pub fn total_spectra(&self) -> i32 {
        self.total_spectra
    }

    /// Write the best `num_top_match` matches of `collection` as one block.
    ///
    /// Returns the number of matches written.
    pub fn write_collection(
        &mut self,
        collection: &mut MatchCollection,
    ) -> Result<usize, MatchCollectionError> {
        let count = collection.len().min(self.num_top_match);
        let charge = collection.charge;
        let delta_cn = collection.delta_cn;
        let ln_delta_cn = collection.ln_delta_cn();
        let ln_experiment_size = collection.ln_experiment_size();
        let scored_type = *collection.scored_types();

        let iter = collection.iter_sorted(self.main_kind)?;
        let writer = &mut self.writer;
        writer.write_all(&charge.to_le_bytes())?;
        writer.write_all(&(count as i32).to_le_bytes())?;
        writer.write_all(&delta_cn.to_le_bytes())?;
        writer.write_all(&ln_delta_cn.to_le_bytes())?;
        writer.write_all(&ln_experiment_size.to_le_bytes())?;
        for flag in scored_type.iter() {
            writer.write_all(&[*flag as u8])?;
        }
        for m in iter.take(count) {
            write_match(writer, m)?;
        }
        self.total_spectra += 1;
        Ok(count)
    }

    /// Record the number of spectra written in the header and return the
    /// underlying stream
    pub fn finish(mut self) -> Result<W, MatchCollectionError> {
        let end = self.writer.seek(SeekFrom::Current(0))?;
        self.writer.seek(SeekFrom::Start(self.start))?;
        self.writer.write_all(&self.total_spectra.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        debug!("Wrote {} spectra", self.total_spectra);
        Ok(self.writer)
    }
}

/// Reads the spectrum blocks of a serialized match collection
#[derive(Debug)]
pub struct PsmFileReader<R: Read> {
    reader: R,
    header: FileHeader,
    blocks_read: usize,
    done: bool,
}

impl<R: Read> PsmFileReader<R> {
    pub fn new(mut reader: R) -> Result<Self, MatchCollectionError> {
        let header = read_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            blocks_read: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// Read the next spectrum block, or `None` once every block the header
    /// declares has been read.
    ///
    /// # Errors
    /// [`MatchCollectionError::ShortRead`] if the input ends before the
    /// declared number of blocks, and
    /// [`MatchCollectionError::SpectrumCountMismatch`] if blocks follow the
    /// last declared one.
    pub fn next_block(&mut self) -> Result<Option<SpectrumBlock>, MatchCollectionError> {
        if self.done {
            return Ok(None);
        }
        let declared = self.header.total_spectra.max(0) as usize;
        let result = match read_block(&mut self.reader, self.header.num_top_match.max(0) as usize) {
            Ok(Some(_)) if self.blocks_read >= declared => {
                Err(MatchCollectionError::SpectrumCountMismatch {
                    declared,
                    found: self.blocks_read + 1,
                })
            }
            Ok(Some(block)) => {
                self.blocks_read += 1;
                return Ok(Some(block));
            }
            Ok(None) if self.blocks_read < declared => Err(MatchCollectionError::ShortRead {
                field: "spectrum block",
            }),
            other => other,
        };
        self.done = true;
        result
    }
}

impl<R: Read> Iterator for PsmFileReader<R> {
    type Item = Result<SpectrumBlock, MatchCollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn make_match(seq: &str, xcorr: f32) -> Match {
        let pep = Arc::new(Peptide::new(seq.to_string(), 1024.5, vec![3, 7]));
        let mut m = Match::new(pep, 42, 2, true);
        m.set_score(ScoreKind::XCorr, xcorr);
        m.set_rank(ScoreKind::XCorr, 1);
        m.b_y_ions_matched = 5;
        m.b_y_ions_possible = 20;
        m
    }

    #[test]
    fn test_match_record() {
        let mut buf = Vec::new();
        write_match(&mut buf, &make_match("PEPTIDE", 3.25)).unwrap();
        let m = read_match(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(m.sequence(), "PEPTIDE");
        assert_eq!(m.peptide.protein_indices, vec![3, 7]);
        assert_eq!(m.score(ScoreKind::XCorr), 3.25);
        assert!(m.score(ScoreKind::Sp).is_nan());
        assert_eq!(m.rank(ScoreKind::XCorr), 1);
        assert_eq!(m.first_scan, 42);
        assert_eq!(m.b_y_ions_possible, 20);
        assert!(m.null_peptide);

        let truncated = &buf[..buf.len() - 3];
        assert!(matches!(
            read_match(&mut Cursor::new(truncated)),
            Err(MatchCollectionError::ShortRead { field: "b/y ions possible" })
        ));
    }

    #[test]
    fn test_invalid_sequence() {
        let mut buf = Vec::new();
        buf.extend(2u32.to_le_bytes());
        buf.extend([0xff, 0xfe]);
        assert!(matches!(
            read_match(&mut Cursor::new(&buf)),
            Err(MatchCollectionError::InvalidSequence)
        ));
    }

    #[test]
    fn test_block_over_capacity() {
        let mut buf = Vec::new();
        write_header(&mut buf, &FileHeader::new(1, 2)).unwrap();
        buf.extend(2i32.to_le_bytes());
        buf.extend(5i32.to_le_bytes());
        let mut reader = PsmFileReader::new(Cursor::new(buf)).unwrap();
        assert!(matches!(
            reader.next_block(),
            Err(MatchCollectionError::CapacityMismatch { found: 5, limit: 2 })
        ));
        assert!(reader.next().is_none());
    }

    fn write_empty_block(buf: &mut Vec<u8>) {
        buf.extend(2i32.to_le_bytes());
        buf.extend(0i32.to_le_bytes());
        for v in [0.5f32, 0.5f32.ln(), 2.0] {
            buf.extend(v.to_le_bytes());
        }
        buf.extend([0u8; NUM_SCORE_KINDS]);
    }

    #[test]
    fn test_fewer_blocks_than_declared() {
        let mut buf = Vec::new();
        write_header(&mut buf, &FileHeader::new(2, 2)).unwrap();
        write_empty_block(&mut buf);
        let mut reader = PsmFileReader::new(Cursor::new(buf)).unwrap();
        let block = reader.next_block().unwrap().unwrap();
        assert_eq!(block.charge, 2);
        assert!(block.matches.is_empty());
        assert!(matches!(
            reader.next_block(),
            Err(MatchCollectionError::ShortRead { field: "spectrum block" })
        ));
        assert!(reader.next().is_none());
        assert_eq!(reader.blocks_read(), 1);
    }

    #[test]
    fn test_more_blocks_than_declared() {
        let mut buf = Vec::new();
        write_header(&mut buf, &FileHeader::new(1, 2)).unwrap();
        write_empty_block(&mut buf);
        write_empty_block(&mut buf);
        let mut reader = PsmFileReader::new(Cursor::new(buf)).unwrap();
        assert!(reader.next_block().unwrap().is_some());
        assert!(matches!(
            reader.next_block(),
            Err(MatchCollectionError::SpectrumCountMismatch { declared: 1, found: 2 })
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_file() {
        let mut buf = Vec::new();
        write_header(&mut buf, &FileHeader::new(0, 5)).unwrap();
        let mut reader = PsmFileReader::new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.header().num_top_match, 5);
        assert!(reader.next().is_none());

        assert!(matches!(
            PsmFileReader::new(Cursor::new(vec![0u8; 10])),
            Err(MatchCollectionError::ShortRead { field: "num_top_match" })
        ));
    }
}
