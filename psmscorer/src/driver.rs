use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use clap::Parser;
use serde::{Deserialize, Serialize};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;

use flate2::write::GzEncoder;
use flate2::Compression;

use thiserror::Error;

use tracing::{debug, info, warn};

use psmscore::post_process::csm_files_in;
use psmscore::qvalue::compute_decoy_q_values;
use psmscore::{MatchArray, MatchCollectionError, PostProcessCollection, ScoreKind, SetType};

use crate::proc::{aggregate_files, read_files, InputFile, BUFFER_SIZE};
use crate::write::{write_protein_summary, ReportWriter};

/// The most decoy sets a single run may aggregate
pub const MAX_DECOY_SETS: u32 = 3;

/// Read from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "psmscorer.toml";

/// The q-value used when reporting how many target PSMs were accepted
const REPORTED_FDR: f32 = 0.01;

#[derive(Debug, Error)]
pub enum PSMScorerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to process match collections: {0}")]
    MatchCollectionError(
        #[source]
        #[from]
        MatchCollectionError,
    ),
    #[error("Failed to read the configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Between 0 and {MAX_DECOY_SETS} decoy sets are supported, but {0} were requested")]
    InvalidDecoySetCount(u32),
    #[error("The input directory {} does not exist or is not a directory", .0.display())]
    InputDirectoryNotFound(PathBuf),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
    #[error("The aggregation thread stopped unexpectedly")]
    AggregationFailed,
}

/// Aggregate and report serialized peptide-spectrum match collections.
///
/// Read the target `.csm` files and up to three sets of `-decoy-N.csm` files
/// from a directory, merge them, optionally assign decoy q-values, and write
/// a tab-separated PSM report.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct PSMScorer {
    /// The directory holding the match collection files
    #[arg()]
    pub input_dir: PathBuf,

    /// The path to write the PSM report to, or if '-' is passed, write to STDOUT.
    ///
    /// A path ending in `.gz` is gzip compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `psmscorer.toml` in the working directory.
    /// Environment variables prefixed with `PSMSCORER_` will be read too. Both take
    /// precedence over the command line.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of decoy sets to read alongside the targets
    #[arg(
        short = 'd',
        long = "decoy-sets",
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(0..=(MAX_DECOY_SETS as i64)),
    )]
    pub decoy_sets: u32,

    /// The score to order the report by
    #[arg(short = 'k', long = "report-kind", default_value_t = ScoreKind::XCorr)]
    pub report_kind: ScoreKind,

    /// The number of top XCorr-ranked matches per spectrum to report, 0 to report all
    #[arg(short = 'n', long = "top-match", default_value_t = 5)]
    pub top_match: u32,

    /// Compute q-values from the decoy sets
    #[arg(short = 'q', long = "q-values")]
    pub q_values: bool,

    /// The path to write per-protein PSM and peptide counts to as JSON
    #[arg(short = 'p', long = "protein-summary")]
    pub protein_summary: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,
}

impl Default for PSMScorer {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_file: PathBuf::from("-"),
            log_file: None,
            config_file: None,
            decoy_sets: 0,
            report_kind: ScoreKind::XCorr,
            top_match: 5,
            q_values: false,
            protein_summary: None,
            threads: -1,
        }
    }
}

impl PSMScorer {
    /// Layer the configuration file, `psmscorer.toml` and `PSMSCORER_`
    /// environment variables over these options
    pub fn configure(self) -> Result<Self, PSMScorerError> {
        let mut config =
            Figment::from(Serialized::defaults(&self)).merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = self.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config = config.merge(Env::prefixed("PSMSCORER_"));
        Ok(config.extract()?)
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, PSMScorerError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()?.into()
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    fn set_types(&self) -> Vec<SetType> {
        std::iter::once(SetType::Target)
            .chain((1..=self.decoy_sets).map(SetType::Decoy))
            .collect()
    }

    pub fn main(&self) -> Result<(), PSMScorerError> {
        info!(
            "psmscorer v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        if self.decoy_sets > MAX_DECOY_SETS {
            return Err(PSMScorerError::InvalidDecoySetCount(self.decoy_sets));
        }
        if !self.input_dir.is_dir() {
            return Err(PSMScorerError::InputDirectoryNotFound(
                self.input_dir.clone(),
            ));
        }
        info!("Input: {}", self.input_dir.display());
        info!("Output: {}", self.output_file.display());
        self.create_threadpool()?.install(|| self.run_workflow())
    }

    fn find_inputs(&self, set_types: &[SetType]) -> Result<Vec<InputFile>, PSMScorerError> {
        let mut inputs = Vec::new();
        for (set_index, set_type) in set_types.iter().enumerate() {
            let paths = csm_files_in(&self.input_dir, *set_type)?;
            if paths.is_empty() {
                warn!("No {set_type} files found in {}", self.input_dir.display());
            } else {
                info!("Found {} {set_type} files", paths.len());
            }
            for path in paths {
                inputs.push(InputFile {
                    index: inputs.len(),
                    set_index,
                    set_type: *set_type,
                    path,
                });
            }
        }
        Ok(inputs)
    }

    fn run_workflow(&self) -> Result<(), PSMScorerError> {
        let start = Instant::now();
        let set_types = self.set_types();
        let inputs = self.find_inputs(&set_types)?;

        let (sender, receiver) = crossbeam_channel::bounded(BUFFER_SIZE);
        let num_sets = set_types.len();
        let aggregate_task = thread::spawn(move || aggregate_files(receiver, num_sets));

        let read_result = read_files(&inputs, sender);
        let aggregated = match aggregate_task.join() {
            Ok(o) => o,
            Err(e) => {
                warn!("Failed to join aggregator task: {e:?}");
                return Err(PSMScorerError::AggregationFailed);
            }
        };
        let mut record = read_result?;
        let (sets, kept) = aggregated?;
        record.matches_kept = kept;

        info!(
            "Files: {} | Spectra: {}",
            record.files_read, record.spectra_read
        );
        info!(
            "Matches Read: {} | Kept: {} | Duplicate Peptides: {}",
            record.matches_read,
            record.matches_kept,
            record.duplicate_matches()
        );
        let mut sets = sets.into_iter();
        let mut target = sets.next().unwrap_or_default();
        info!(
            "{}: {} spectra, {} matches, {} proteins",
            SetType::Target,
            target.num_spectra,
            target.len(),
            target.num_proteins_seen()
        );

        if let Some(path) = self.protein_summary.as_ref() {
            let mut handle = io::BufWriter::new(fs::File::create(path)?);
            let n = write_protein_summary(&mut handle, &target)?;
            handle.flush()?;
            info!("Wrote {n} protein summaries to {}", path.display());
        }

        let decoy_sets_merged = self.merge_decoys(&mut target, sets, &set_types[1..])?;

        if self.q_values {
            if decoy_sets_merged == 0 {
                warn!("Decoy q-values were requested without any decoy matches, skipping");
            } else if target.is_empty() {
                warn!("No matches to compute q-values for");
            } else {
                compute_decoy_q_values(&mut target, decoy_sets_merged)?;
                let accepted = target
                    .iter()
                    .filter(|m| !m.null_peptide && m.score(ScoreKind::QValue) <= REPORTED_FDR)
                    .count();
                info!("Target PSMs at q <= {REPORTED_FDR}: {accepted}");
            }
        }

        let n_written = self.write_output(&mut target)?;
        info!("Wrote {n_written} PSMs");
        info!("Total Elapsed Time: {:0.3?}", start.elapsed());
        Ok(())
    }

    fn merge_decoys(
        &self,
        target: &mut PostProcessCollection,
        decoys: impl Iterator<Item = PostProcessCollection>,
        set_types: &[SetType],
    ) -> Result<usize, PSMScorerError> {
        let mut merged = 0;
        for (mut decoy, set_type) in decoys.zip(set_types) {
            if decoy.is_empty() {
                warn!("{set_type} holds no matches");
                continue;
            }
            info!(
                "{set_type}: {} spectra, {} matches",
                decoy.num_spectra,
                decoy.len()
            );
            target.merge_from(&mut decoy)?;
            merged += 1;
        }
        Ok(merged)
    }

    fn write_report<W: Write>(
        &self,
        target: &mut MatchArray,
        writer: W,
    ) -> Result<(W, usize), PSMScorerError> {
        let include_q_value = target.is_scored(ScoreKind::QValue);
        let mut report = ReportWriter::new(writer, self.report_kind, include_q_value)?;
        if !target.is_empty() {
            let top_match = self.top_match;
            for m in target
                .iter_sorted(self.report_kind)?
                .filter(|m| top_match == 0 || m.rank(ScoreKind::XCorr) <= top_match)
            {
                report.write_match(m)?;
            }
        }
        let n = report.rows_written();
        Ok((report.into_inner()?, n))
    }

    fn write_output(&self, target: &mut MatchArray) -> Result<usize, PSMScorerError> {
        if self.output_file == PathBuf::from("-") {
            let (_, n) = self.write_report(target, io::BufWriter::new(io::stdout().lock()))?;
            return Ok(n);
        }
        let handle = io::BufWriter::new(fs::File::create(&self.output_file)?);
        if self.output_file.extension().is_some_and(|ext| ext == "gz") {
            let encoder = GzEncoder::new(handle, Compression::best());
            let (encoder, n) = self.write_report(target, encoder)?;
            encoder.finish()?.flush()?;
            Ok(n)
        } else {
            let (_, n) = self.write_report(target, handle)?;
            Ok(n)
        }
    }
}
