use sqlx::{Executor, Row};
use tracing::debug;

use expenso_core::store::StoreError;

use crate::connection::DbPool;

/// Deterministic demo-company dataset: four users in a two-level
/// hierarchy, three expenses in different lifecycle stages, and one
/// rule of each configured type.
pub struct DemoSeedDataset;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub users: i64,
    pub expenses: i64,
    pub rules: i64,
}

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub const COMPANY_ID: &str = "c-acme";

    /// Load the dataset. Idempotent per database: re-running against an
    /// already seeded database fails on primary keys rather than
    /// duplicating rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await.map_err(backend)?;

        tx.execute(sqlx::query(Self::SQL)).await.map_err(backend)?;

        let users = count(&mut tx, "SELECT COUNT(*) AS count FROM app_user").await?;
        let expenses = count(&mut tx, "SELECT COUNT(*) AS count FROM expense").await?;
        let rules = count(&mut tx, "SELECT COUNT(*) AS count FROM approval_rule").await?;

        tx.commit().await.map_err(backend)?;

        debug!(users, expenses, rules, "demo dataset seeded");
        Ok(SeedResult { users, expenses, rules })
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

async fn count(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    sql: &str,
) -> Result<i64, StoreError> {
    let row = sqlx::query(sql).fetch_one(&mut **tx).await.map_err(backend)?;
    row.try_get::<i64, _>("count").map_err(|error| StoreError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use expenso_core::domain::user::CompanyId;
    use expenso_core::store::{RuleStore, UserStore};

    use crate::connection::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{SqlRuleStore, SqlUserStore};

    use super::DemoSeedDataset;

    #[tokio::test]
    async fn seed_loads_and_is_readable_through_the_stores() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let result = DemoSeedDataset::load(&pool).await.expect("load seed");
        assert_eq!(result.users, 4);
        assert_eq!(result.expenses, 3);
        assert_eq!(result.rules, 3);

        let company = CompanyId(DemoSeedDataset::COMPANY_ID.to_string());
        let users = SqlUserStore::new(pool.clone()).list_by_company(&company).await.expect("users");
        assert_eq!(users.len(), 4);

        let rules =
            SqlRuleStore::new(pool.clone()).list_for_company(&company).await.expect("rules");
        assert_eq!(rules.len(), 3);
    }
}
