//! # Database Migrations
//!
//! Schema migrations live in `migrations/` at the crate root and are embedded
//! into the binary at compile time. Files follow the
//! `YYYYMMDDHHMMSS_description.sql` naming convention.

use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration
    pub async fn run_all(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        let known = MIGRATOR.iter().count();
        MIGRATOR.run(pool).await?;
        info!(migrations = known, "Database schema is up to date");
        Ok(())
    }
}
