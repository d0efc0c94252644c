mod driver;
mod proc;
mod progress;
mod write;

pub use driver::{PSMScorer, PSMScorerError, DEFAULT_CONFIG_FILE, MAX_DECOY_SETS};
pub use progress::AggregationRecord;
pub use write::{protein_summaries, write_protein_summary, ProteinSummary, ReportWriter};
