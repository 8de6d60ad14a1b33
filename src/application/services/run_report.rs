use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{CallId, FailureKind, RecordOutcome};

/// One terminally failed record, kept for the end-of-run report so the
/// operator can follow up manually.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub call_id: CallId,
    pub reason: FailureKind,
    pub detail: String,
}

/// End-of-run tally. Every record read from the database is accounted for
/// in exactly one of `written`, `skipped`, or `failures`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub failures: Vec<RecordFailure>,
}

impl RunSummary {
    pub fn from_outcomes(
        start_date: NaiveDate,
        end_date: NaiveDate,
        total: usize,
        outcomes: &[RecordOutcome],
        elapsed_secs: f64,
    ) -> Self {
        let mut written = 0;
        let mut skipped = 0;
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Written { .. } => written += 1,
                RecordOutcome::Skipped { .. } => skipped += 1,
                RecordOutcome::Failed {
                    call_id,
                    kind,
                    message,
                } => failures.push(RecordFailure {
                    call_id: *call_id,
                    reason: *kind,
                    detail: message.clone(),
                }),
            }
        }
        Self {
            start_date,
            end_date,
            total,
            written,
            skipped,
            failed: failures.len(),
            elapsed_secs,
            failures,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
