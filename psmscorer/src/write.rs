use std::io::{self, Write};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use psmscore::{Match, PostProcessCollection, ScoreKind};

const FIXED_COLUMNS: &[&str] = &[
    "scan",
    "charge",
    "sequence",
    "peptide_mass",
    "proteins",
    "decoy",
    "xcorr_rank",
    "sp",
    "xcorr",
    "delta_cn",
    "b_y_ions_matched",
    "b_y_ions_possible",
    "ln_experiment_size",
];

/// Writes one tab-separated row per match
#[derive(Debug)]
pub struct ReportWriter<W: Write> {
    writer: W,
    extra_columns: Vec<ScoreKind>,
    rows_written: usize,
}

impl<W: Write> ReportWriter<W> {
    /// Create a writer and emit the header line.
    ///
    /// The fixed columns always carry SP and XCorr, so `report_kind` only adds
    /// a column when it is something else. `include_q_value` adds the decoy
    /// q-value column.
    pub fn new(mut writer: W, report_kind: ScoreKind, include_q_value: bool) -> io::Result<Self> {
        let mut extra_columns = Vec::new();
        if !matches!(report_kind, ScoreKind::Sp | ScoreKind::XCorr) {
            extra_columns.push(report_kind);
        }
        if include_q_value && !extra_columns.contains(&ScoreKind::QValue) {
            extra_columns.push(ScoreKind::QValue);
        }
        let header = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(extra_columns.iter().map(|k| k.name()))
            .join("\t");
        writeln!(writer, "{header}")?;
        Ok(Self {
            writer,
            extra_columns,
            rows_written: 0,
        })
    }

    pub fn write_match(&mut self, m: &Match) -> io::Result<()> {
        write!(
            self.writer,
            "{}\t{}\t{}\t{:.4}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            m.first_scan,
            m.charge,
            m.sequence(),
            m.peptide.mass,
            m.peptide.protein_indices.iter().join(";"),
            m.null_peptide,
            m.rank(ScoreKind::XCorr),
            m.score(ScoreKind::Sp),
            m.score(ScoreKind::XCorr),
            m.delta_cn,
            m.b_y_ions_matched,
            m.b_y_ions_possible,
            m.ln_experiment_size,
        )?;
        for kind in self.extra_columns.iter() {
            write!(self.writer, "\t{}", m.score(*kind))?;
        }
        writeln!(self.writer)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        debug!("Wrote {} report rows", self.rows_written);
        Ok(self.writer)
    }
}

/// The PSM and distinct peptide counts of one protein
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinSummary {
    pub protein_index: u32,
    pub psm_count: u32,
    pub peptide_count: u32,
}

pub fn protein_summaries(collection: &PostProcessCollection) -> Vec<ProteinSummary> {
    collection
        .proteins()
        .map(|(protein_index, psm_count, peptide_count)| ProteinSummary {
            protein_index,
            psm_count,
            peptide_count,
        })
        .sorted_by_key(|p| p.protein_index)
        .collect()
}

/// Write the per-protein counters of `collection` as a JSON array
pub fn write_protein_summary<W: Write>(
    writer: W,
    collection: &PostProcessCollection,
) -> io::Result<usize> {
    let summaries = protein_summaries(collection);
    serde_json::to_writer_pretty(writer, &summaries)?;
    Ok(summaries.len())
}
