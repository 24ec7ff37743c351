use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{query_scalar, PgExecutor};

use crate::errors::Result;

/// Quotes `identifier` the way Postgres would, so it can be spliced into SQL.
pub async fn escape_identifier<'e>(
    executor: impl PgExecutor<'e>,
    identifier: &str,
) -> Result<String> {
    let escaped_identifier: String = query_scalar("select format('%I', $1::text)")
        .bind(identifier)
        .fetch_one(executor)
        .await?;

    Ok(escaped_identifier)
}

/// `instant + duration`, saturating at the largest representable time.
pub fn add_duration(instant: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
