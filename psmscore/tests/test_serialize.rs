mod common;

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::PathBuf;

use flate2::write::GzEncoder;
use flate2::Compression;

use psmscore::post_process::csm_files_in;
use psmscore::qvalue::compute_decoy_q_values;
use psmscore::serialize::{read_header, PsmFileReader, PsmFileWriter};
use psmscore::{
    MatchCollection, MatchCollectionError, PostProcessCollection, ScoreKind, SearchParams, SetType,
};

use common::{rng, spectrum, TableScorer};

fn search_collections(prefix: &str, is_decoy: bool, n_spectra: u32) -> Vec<MatchCollection> {
    let mut rng = rng(9);
    (0..n_spectra)
        .map(|scan| {
            let sp: Vec<f32> = (0..30).map(|i| ((i * 7 + scan as usize) % 30) as f32).collect();
            let xcorr: Vec<f32> = (0..30)
                .map(|i| ((i * 13 + scan as usize * 3) % 30) as f32 / 10.0)
                .collect();
            let mut scorer = TableScorer::new(sp, xcorr);
            let tag = char::from(b'A' + scan as u8);
            let peptides = scorer.peptides(&format!("{prefix}S{tag}X"), 2);
            let params = SearchParams {
                max_rank: 10,
                is_decoy,
                ..Default::default()
            };
            MatchCollection::search(&spectrum(scan), 2, &peptides, &mut scorer, &params, &mut rng)
                .unwrap()
                .unwrap()
        })
        .collect()
}

fn write_collections(collections: &mut [MatchCollection], top_match: usize) -> Vec<u8> {
    let mut writer = PsmFileWriter::new(Cursor::new(Vec::new()), top_match, ScoreKind::XCorr).unwrap();
    for coll in collections.iter_mut() {
        writer.write_collection(coll).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test_log::test]
fn test_round_trip() {
    let mut collections = search_collections("T", false, 4);
    let buf = write_collections(&mut collections, 5);

    let header = read_header(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(header.total_spectra, 4);
    assert_eq!(header.num_spectrum_features, 0);
    assert_eq!(header.num_top_match, 5);

    let mut reader = PsmFileReader::new(Cursor::new(&buf)).unwrap();
    for coll in collections.iter() {
        let block = reader.next_block().unwrap().unwrap();
        assert_eq!(block.charge, coll.charge);
        assert_eq!(block.delta_cn, coll.delta_cn);
        assert_eq!(block.ln_delta_cn, coll.ln_delta_cn());
        assert_eq!(block.ln_experiment_size, coll.ln_experiment_size());
        assert_eq!(&block.scored_type, coll.scored_types());
        assert_eq!(block.matches.len(), 5);
        for m in block.matches.iter() {
            assert_eq!(m.ln_delta_cn, coll.ln_delta_cn());
            assert_eq!(m.ln_experiment_size, coll.ln_experiment_size());
        }
    }
    assert!(reader.next_block().unwrap().is_none());
    assert_eq!(reader.blocks_read(), 4);

    let mut aggregate = PostProcessCollection::new();
    let n = aggregate.extend_from_reader(Cursor::new(&buf)).unwrap();
    assert_eq!(n, 4);
    assert_eq!(aggregate.num_spectra, 4);
    assert_eq!(aggregate.len(), 20);
    assert!(aggregate.is_scored(ScoreKind::XCorr));
    assert!(aggregate.is_scored(ScoreKind::Sp));
    assert!(!aggregate.is_scored(ScoreKind::QValue));

    let originals: Vec<_> = collections
        .iter()
        .flat_map(|c| c.iter().take(5).cloned().collect::<Vec<_>>())
        .collect();
    for (original, read) in originals.iter().zip(aggregate.iter()) {
        assert_eq!(original.sequence(), read.sequence());
        assert_eq!(original.peptide.protein_indices, read.peptide.protein_indices);
        assert_eq!(original.score(ScoreKind::XCorr), read.score(ScoreKind::XCorr));
        assert_eq!(original.rank(ScoreKind::XCorr), read.rank(ScoreKind::XCorr));
        assert_eq!(original.score(ScoreKind::Sp), read.score(ScoreKind::Sp));
        assert_eq!(original.first_scan, read.first_scan);
        assert_eq!(original.charge, read.charge);
        assert_eq!(original.delta_cn, read.delta_cn);
        assert_eq!(original.b_y_ions_matched, read.b_y_ions_matched);
        assert_eq!(original.null_peptide, read.null_peptide);
    }
    assert!(aggregate.num_proteins_seen() > 0);
}

#[test]
fn test_truncated_file() {
    let mut collections = search_collections("T", false, 2);
    let buf = write_collections(&mut collections, 3);
    let cut = &buf[..buf.len() - 10];

    let mut aggregate = PostProcessCollection::new();
    let err = aggregate.extend_from_reader(Cursor::new(cut)).unwrap_err();
    assert!(matches!(err, MatchCollectionError::ShortRead { .. }), "{err}");
}

#[test]
fn test_file_cut_between_blocks() {
    let mut collections = search_collections("T", false, 3);
    let whole = write_collections(&mut collections, 3);
    let first_only = write_collections(&mut collections[..1], 3);
    assert_eq!(whole[12..first_only.len()], first_only[12..]);

    // The header still declares three spectra
    let cut = &whole[..first_only.len()];
    let mut aggregate = PostProcessCollection::new();
    let err = aggregate.extend_from_reader(Cursor::new(cut)).unwrap_err();
    assert!(
        matches!(err, MatchCollectionError::ShortRead { field: "spectrum block" }),
        "{err}"
    );

    let mut extra = whole.clone();
    extra[..4].copy_from_slice(&2i32.to_le_bytes());
    let err = PostProcessCollection::new()
        .extend_from_reader(Cursor::new(&extra))
        .unwrap_err();
    assert!(
        matches!(err, MatchCollectionError::SpectrumCountMismatch { declared: 2, found: 3 }),
        "{err}"
    );
}

fn scratch_dir(name: &str) -> io::Result<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[test]
fn test_directory_sets_with_q_values() -> io::Result<()> {
    let dir = scratch_dir("psmscore_directory_sets")?;

    let mut targets = search_collections("T", false, 3);
    fs::write(dir.join("run.csm"), write_collections(&mut targets, 4))?;

    let mut decoys = search_collections("D", true, 3);
    let mut encoder = GzEncoder::new(fs::File::create(dir.join("run-decoy-1.csm.gz"))?, Compression::default());
    encoder.write_all(&write_collections(&mut decoys, 4))?;
    encoder.finish()?;
    fs::write(dir.join("notes.txt"), "not a match file")?;

    assert_eq!(csm_files_in(&dir, SetType::Target)?.len(), 1);
    assert_eq!(csm_files_in(&dir, SetType::Decoy(1))?.len(), 1);
    assert!(csm_files_in(&dir, SetType::Decoy(2))?.is_empty());

    let mut target = PostProcessCollection::from_directory(&dir, SetType::Target).unwrap();
    let mut decoy = PostProcessCollection::from_directory(&dir, SetType::Decoy(1)).unwrap();
    assert_eq!(target.len(), 12);
    assert_eq!(decoy.len(), 12);
    assert!(decoy.iter().all(|m| m.null_peptide));

    target.merge_from(&mut decoy).unwrap();
    assert_eq!(target.len(), 24);
    compute_decoy_q_values(&mut target, 1).unwrap();
    let it = target.iter_sorted(ScoreKind::QValue).unwrap();
    let q: Vec<f32> = it.map(|m| m.score(ScoreKind::QValue)).collect();
    assert!(q.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(q.windows(2).all(|w| w[0] <= w[1]));
    Ok(())
}
