use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use tracing::instrument;

use crate::application::ports::{CallRepository, RepositoryError};
use crate::domain::{CallId, CallRecord, UserType};

/// One row per (call, audio leg). Legs without an audio URL are filtered at
/// the query boundary; `map_row` re-checks so the invariant also holds for
/// custom queries that skip the filter.
const DEFAULT_QUERY: &str = r#"
SELECT
    c.id AS call_id,
    c.started_at AS started_at,
    c.ended_at AS ended_at,
    ca.user_type AS user_type,
    ca.audio_url AS audio_url,
    b.name AS branch_name,
    p.full_name AS handled_by
FROM calls c
LEFT JOIN branches b ON b.id = c.branch_id
LEFT JOIN users u ON u.id = c.attended_by_employee_id
LEFT JOIN persons p ON p.id = u.person_id
LEFT JOIN call_audios ca ON ca.call_id = c.id
WHERE DATE(c.started_at) BETWEEN ? AND ?
  AND ca.audio_url IS NOT NULL
  AND ca.audio_url <> ''
ORDER BY c.started_at ASC
"#;

pub struct MySqlCallRepository {
    pool: MySqlPool,
}

impl MySqlCallRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for MySqlCallRepository {
    #[instrument(skip(self, custom_query), fields(%start, %end))]
    async fn calls_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        custom_query: Option<&str>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        let query = custom_query.unwrap_or(DEFAULT_QUERY);

        let rows = sqlx::query(query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RepositoryError::QueryFailed(format!("range {}..={}: {}", start, end, e))
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = map_row(row)? {
                records.push(record);
            }
        }

        tracing::info!(
            rows = rows.len(),
            records = records.len(),
            "Call records loaded"
        );
        Ok(records)
    }
}

fn map_row(row: &MySqlRow) -> Result<Option<CallRecord>, RepositoryError> {
    let audio_url: Option<String> = column(row, "audio_url")?;
    let audio_url = match audio_url {
        Some(url) if !url.trim().is_empty() => url,
        _ => return Ok(None),
    };

    let call_id: i64 = column(row, "call_id")?;
    let started_at: NaiveDateTime = column(row, "started_at")?;
    let ended_at: Option<NaiveDateTime> = column(row, "ended_at")?;
    let user_type: Option<String> = column(row, "user_type")?;
    let branch_name: Option<String> = column(row, "branch_name")?;
    let handled_by: Option<String> = column(row, "handled_by")?;

    Ok(Some(CallRecord {
        call_id: CallId::new(call_id),
        started_at,
        ended_at,
        user_type: UserType::from_raw(user_type.as_deref().unwrap_or("")),
        audio_url,
        branch_name,
        handled_by,
    }))
}

fn column<'r, T>(row: &'r MySqlRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(name).map_err(|e| {
        RepositoryError::RowDecodeFailed(format!(
            "column `{}`: {} (the query must alias its columns to the expected names)",
            name, e
        ))
    })
}
