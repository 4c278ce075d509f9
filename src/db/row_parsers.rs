use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rma::RmaHistoryEntry;
use crate::workflow::Status;

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid {s:?}: {e}")))
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format, with optional fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_status(s: &str) -> Result<Status, AppError> {
    s.parse()
        .map_err(|e| AppError::internal(format!("invalid status column: {e}")))
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, AppError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {name}: {e}")))
}

pub fn history_entry_from_row(row: &SqliteRow) -> Result<RmaHistoryEntry, AppError> {
    let id: String = column(row, "id")?;
    let event_name: String = column(row, "event_name")?;
    let actor_id: Option<String> = column(row, "actor_id")?;
    let from_status: Option<String> = column(row, "from_status")?;
    let to_status: String = column(row, "to_status")?;
    let occurred_at: String = column(row, "occurred_at")?;
    let hash: String = column(row, "hash")?;

    Ok(RmaHistoryEntry {
        id: parse_uuid(&id)?,
        event_name,
        actor_id: actor_id.as_deref().map(parse_uuid).transpose()?,
        from_status: from_status.as_deref().map(parse_status).transpose()?,
        to_status: parse_status(&to_status)?,
        occurred_at: parse_datetime(&occurred_at)?,
        hash,
    })
}
