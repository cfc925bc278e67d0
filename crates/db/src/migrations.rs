use sqlx::migrate::{MigrateError, Migrator};
use tracing::debug;

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    debug!(known_migrations = MIGRATOR.migrations.len(), "schema migrations applied");
    Ok(())
}
