#![allow(dead_code)]
use std::error::Error;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use psmscore::serialize::PsmFileWriter;
use psmscore::{Match, MatchCollection, Peptide, ScoreKind};

pub const SPECTRA_PER_FILE: u32 = 4;
pub const MATCHES_PER_SPECTRUM: usize = 5;
pub const MATCHES_WRITTEN: usize = 3;

pub fn scratch_dir(name: &str) -> io::Result<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Every target outscores every decoy by XCorr
fn make_collection(scan: u32, is_decoy: bool) -> Result<MatchCollection, Box<dyn Error>> {
    let (tag, base) = if is_decoy { ("DEC", 1.0) } else { ("TAR", 3.0) };
    let mut collection = MatchCollection::new(is_decoy);
    collection.charge = 2;
    collection.experiment_size = 100;
    for i in 0..MATCHES_PER_SPECTRUM {
        let peptide = Arc::new(Peptide::new(
            format!("{tag}{scan}PEPK{i}"),
            1000.0 + i as f64,
            vec![scan % 3, 10 + i as u32],
        ));
        let mut m = Match::new(peptide, scan, 2, is_decoy);
        m.set_score(ScoreKind::Sp, 100.0 - i as f32);
        m.set_score(ScoreKind::XCorr, base - 0.1 * i as f32 + 0.01 * scan as f32);
        collection.push(m)?;
    }
    collection.mark_scored(ScoreKind::Sp);
    collection.mark_scored(ScoreKind::XCorr);
    collection.populate_rank(ScoreKind::XCorr)?;
    Ok(collection)
}

/// Write [`SPECTRA_PER_FILE`] spectra to `dir/file_name`, gzipped when the
/// name ends in `.gz`
pub fn write_run(dir: &Path, file_name: &str, is_decoy: bool) -> Result<PathBuf, Box<dyn Error>> {
    let mut writer = PsmFileWriter::new(Cursor::new(Vec::new()), MATCHES_WRITTEN, ScoreKind::XCorr)?;
    for scan in 1..=SPECTRA_PER_FILE {
        writer.write_collection(&mut make_collection(scan, is_decoy)?)?;
    }
    let buf = writer.finish()?.into_inner();

    let path = dir.join(file_name);
    if file_name.ends_with(".gz") {
        let mut encoder = GzEncoder::new(fs::File::create(&path)?, Compression::default());
        encoder.write_all(&buf)?;
        encoder.finish()?;
    } else {
        fs::write(&path, buf)?;
    }
    Ok(path)
}

/// A directory with one target file, one gzipped decoy file and a stray file
pub fn populate_dataset(name: &str) -> Result<PathBuf, Box<dyn Error>> {
    let dir = scratch_dir(name)?;
    write_run(&dir, "run.csm", false)?;
    write_run(&dir, "run-decoy-1.csm.gz", true)?;
    fs::write(dir.join("notes.txt"), "not a match file")?;
    Ok(dir)
}

/// The header and the data rows of a report
pub fn split_report(text: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut lines = text.lines();
    let header = lines
        .next()
        .map(|l| l.split('\t').map(str::to_string).collect())
        .unwrap_or_default();
    let rows = lines
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect();
    (header, rows)
}
