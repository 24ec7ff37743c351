use sqlx::{query, PgConnection};

mod m000001;
mod m000002;

/// Replaced by the escaped schema name in every statement.
pub const SCHEMA_PLACEHOLDER: &str = ":SUBMIT_QUEUE_SCHEMA";

/// One step of the schema history, applied at most once per schema.
pub struct Migration {
    id: i32,
    name: &'static str,
    stmts: &'static [&'static str],
}

impl Migration {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) async fn apply(
        &self,
        conn: &mut PgConnection,
        escaped_schema: &str,
    ) -> Result<(), sqlx::Error> {
        for stmt in self.stmts {
            query(&stmt.replace(SCHEMA_PLACEHOLDER, escaped_schema))
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

/// Every migration, oldest first.
pub const MIGRATIONS: &[Migration] = &[m000001::M000001_MIGRATION, m000002::M000002_MIGRATION];

/// Id of the newest migration this build knows.
pub fn latest_migration_id() -> i32 {
    MIGRATIONS.last().map(Migration::id).unwrap_or_default()
}
