//! Schema of the Postgres job store.
//!
//! [`migrate`] is run by every process when it connects. It holds an advisory
//! lock on the schema for the whole upgrade, so processes starting together
//! apply each migration exactly once.

mod sql;

pub use sql::{latest_migration_id, Migration, MIGRATIONS};

use indoc::formatdoc;
use sqlx::{query, query_scalar, PgPool};
use thiserror::Error;
use tracing::{debug, info};

/// `server_version_num` of PostgreSQL 12.0
const MIN_SERVER_VERSION: i32 = 120000;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("The submit queue requires PostgreSQL 12 or newer (detected `server_version_num` = {0})")]
    UnsupportedServer(i32),
    #[error("Schema is at migration {applied} but this process only knows migrations up to {known}, refusing to use a newer schema")]
    SchemaTooNew { applied: i32, known: i32 },
    #[error("Error occured while migrating: {0}")]
    SqlError(#[from] sqlx::Error),
}

fn check_server_version(version: i32) -> Result<(), MigrateError> {
    if version < MIN_SERVER_VERSION {
        return Err(MigrateError::UnsupportedServer(version));
    }
    Ok(())
}

/// Creates the schema if needed and applies the migrations it is missing.
///
/// Everything runs in one transaction: a failed migration leaves the schema
/// as it was.
pub async fn migrate(pg_pool: &PgPool, escaped_schema: &str) -> Result<(), MigrateError> {
    let mut tx = pg_pool.begin().await?;

    let version: i32 = query_scalar("select current_setting('server_version_num')::int")
        .fetch_one(&mut *tx)
        .await?;
    check_server_version(version)?;

    query("select pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("migrate:{escaped_schema}"))
        .execute(&mut *tx)
        .await?;

    query(&format!("create schema if not exists {escaped_schema}"))
        .execute(&mut *tx)
        .await?;
    query(&formatdoc!(
        r#"
            create table if not exists {escaped_schema}.migrations (
                id int primary key,
                name text not null,
                applied_at timestamptz not null default now()
            )
        "#
    ))
    .execute(&mut *tx)
    .await?;

    let applied: Option<i32> =
        query_scalar(&format!("select max(id) from {escaped_schema}.migrations"))
            .fetch_one(&mut *tx)
            .await?;
    let applied = applied.unwrap_or_default();
    let known = latest_migration_id();
    if applied > known {
        return Err(MigrateError::SchemaTooNew { applied, known });
    }

    let insert_sql = format!("insert into {escaped_schema}.migrations (id, name) values ($1, $2)");
    for migration in MIGRATIONS.iter().filter(|m| m.id() > applied) {
        info!(
            migration = migration.name(),
            pg_version = version,
            "Applying submit queue migration"
        );
        migration.apply(&mut tx, escaped_schema).await?;
        query(&insert_sql)
            .bind(migration.id())
            .bind(migration.name())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if applied < known {
        info!(from = applied, to = known, "Submit queue schema migrated");
    } else {
        debug!(migration = applied, "Submit queue schema up to date");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_servers() {
        for version in [120000, 130100, 160004] {
            assert!(check_server_version(version).is_ok());
        }
    }

    #[test]
    fn test_old_servers_are_refused() {
        assert!(matches!(
            check_server_version(110022),
            Err(MigrateError::UnsupportedServer(110022))
        ));
    }
}
