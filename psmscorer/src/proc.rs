use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use psmscore::post_process::open_csm;
use psmscore::serialize::SpectrumBlock;
use psmscore::{MatchCollectionError, PostProcessCollection, SetType};

use crate::progress::AggregationRecord;

/// The number of read files allowed to queue up ahead of the aggregator
pub const BUFFER_SIZE: usize = 64;

/// A match collection file and the set it belongs to
#[derive(Debug, Clone)]
pub struct InputFile {
    pub index: usize,
    pub set_index: usize,
    pub set_type: SetType,
    pub path: PathBuf,
}

/// Every spectrum block of one [`InputFile`]
#[derive(Debug)]
pub struct FileBatch {
    pub index: usize,
    pub set_index: usize,
    pub blocks: Vec<SpectrumBlock>,
    pub record: AggregationRecord,
}

#[instrument(level = "debug", skip_all, fields(path = %input.path.display()))]
pub fn read_file(input: &InputFile) -> Result<FileBatch, MatchCollectionError> {
    let mut reader = open_csm(&input.path)?;
    let mut record = AggregationRecord {
        files_read: 1,
        ..Default::default()
    };
    let mut blocks = Vec::new();
    while let Some(block) = reader.next_block()? {
        record.spectra_read += 1;
        record.matches_read += block.matches.len();
        blocks.push(block);
    }

    debug!(
        "Read {} spectra for {} from {}",
        blocks.len(),
        input.set_type,
        input.path.display()
    );
    Ok(FileBatch {
        index: input.index,
        set_index: input.set_index,
        blocks,
        record,
    })
}

/// Read `inputs` on the current thread pool, handing each file to `sender`
/// as soon as it has been read. The channel closes when this returns.
pub fn read_files(
    inputs: &[InputFile],
    sender: Sender<FileBatch>,
) -> Result<AggregationRecord, MatchCollectionError> {
    let started = Instant::now();
    let records: Vec<AggregationRecord> = inputs
        .par_iter()
        .map(|input| -> Result<AggregationRecord, MatchCollectionError> {
            let batch = read_file(input).map_err(|e| {
                error!("Failed to read {}: {e}", input.path.display());
                e
            })?;
            let record = batch.record;
            if let Err(e) = sender.send(batch) {
                warn!("Failed to send {} for aggregation: {e}", input.path.display());
            }
            Ok(record)
        })
        .collect::<Result<_, _>>()?;
    let record = records
        .into_iter()
        .fold(AggregationRecord::default(), AggregationRecord::sum);
    info!("Read {} files in {:0.3?}", record.files_read, started.elapsed());
    Ok(record)
}

fn add_batch(
    sets: &mut [PostProcessCollection],
    batch: FileBatch,
) -> Result<usize, MatchCollectionError> {
    let collection = &mut sets[batch.set_index];
    let mut kept = 0;
    for block in batch.blocks {
        kept += collection.add_block(block)?;
    }
    Ok(kept)
}

/// Fold every received file into one [`PostProcessCollection`] per set.
///
/// Files are added in [`InputFile::index`] order no matter the order they
/// arrive in, so which copy of a repeated peptide is kept does not depend on
/// thread scheduling. Returns the collections and the number of matches kept.
pub fn aggregate_files(
    receiver: Receiver<FileBatch>,
    num_sets: usize,
) -> Result<(Vec<PostProcessCollection>, usize), MatchCollectionError> {
    let mut sets: Vec<PostProcessCollection> =
        (0..num_sets).map(|_| PostProcessCollection::new()).collect();
    let mut waiting: HashMap<usize, FileBatch> = HashMap::new();
    let mut next_key = 0usize;
    let mut kept = 0usize;

    for batch in receiver.iter() {
        waiting.insert(batch.index, batch);
        while let Some(batch) = waiting.remove(&next_key) {
            kept += add_batch(&mut sets, batch)?;
            next_key += 1;
        }
        if waiting.len() > BUFFER_SIZE {
            debug!(
                "Aggregator holding {} files waiting on file {next_key}",
                waiting.len()
            );
        }
    }

    // A file that failed to read leaves a gap in the sequence
    if !waiting.is_empty() {
        debug!("Draining {} files after file {next_key}", waiting.len());
        let mut rest: Vec<_> = waiting.into_values().collect();
        rest.sort_by_key(|b| b.index);
        for batch in rest {
            kept += add_batch(&mut sets, batch)?;
        }
    }
    debug!("Aggregator done");
    Ok((sets, kept))
}
