mod pipeline;
mod run_report;

pub use pipeline::{PipelineError, PipelineOptions, PipelineService};
pub use run_report::{RecordFailure, RunSummary};
