use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Identifier of a call, stable across the audio legs belonging to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallId(i64);

impl CallId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the call an audio leg belongs to. The source system stores
/// this as a free-form string, so unknown values are carried through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserType {
    Customer,
    Agent,
    Other(String),
}

impl UserType {
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "customer" => UserType::Customer,
            "agent" => UserType::Agent,
            "" => UserType::Other("unknown".to_string()),
            _ => {
                let sanitized: String = normalized
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                UserType::Other(sanitized)
            }
        }
    }

    /// Filesystem-safe tag used as a file name prefix.
    pub fn label(&self) -> &str {
        match self {
            UserType::Customer => "customer",
            UserType::Agent => "agent",
            UserType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audio leg of a recorded call, as yielded by the database reader.
/// `audio_url` is guaranteed non-empty by the reader boundary.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: CallId,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub user_type: UserType,
    pub audio_url: String,
    pub branch_name: Option<String>,
    pub handled_by: Option<String>,
}

impl CallRecord {
    /// Call duration in seconds. `None` when the call has no recorded end,
    /// which the source data allows.
    pub fn duration_secs(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_seconds())
    }
}
