use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use super::CallId;

/// Terminal failure category for a record. A failed record is never retried
/// within the run; re-running the pipeline revisits only incomplete work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Transcription,
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Fetch => "fetch failed",
            FailureKind::Transcription => "transcription failed",
            FailureKind::Write => "write failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How a single record finished.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Written {
        call_id: CallId,
        transcript_path: PathBuf,
    },
    Skipped {
        call_id: CallId,
    },
    Failed {
        call_id: CallId,
        kind: FailureKind,
        message: String,
    },
}

impl RecordOutcome {
    pub fn call_id(&self) -> CallId {
        match self {
            RecordOutcome::Written { call_id, .. }
            | RecordOutcome::Skipped { call_id }
            | RecordOutcome::Failed { call_id, .. } => *call_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}
