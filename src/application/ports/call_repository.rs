use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::CallRecord;

/// Source of call-audio records for a calendar date range (inclusive).
///
/// Implementations must only yield records with a non-empty `audio_url`,
/// ordered by call start time ascending. A custom query is executed
/// verbatim with the two dates bound positionally; its result set must
/// expose the same column aliases as the default query.
#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn calls_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        custom_query: Option<&str>,
    ) -> Result<Vec<CallRecord>, RepositoryError>;
}

/// Database errors are fatal to the run; they are not retried per record.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("row decode failed: {0}")]
    RowDecodeFailed(String),
}
