use sqlx::Row;

use expenso_core::domain::user::{CompanyId, Role, User, UserId};
use expenso_core::store::{StoreError, UserStore};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlUserStore {
    pool: DbPool,
}

impl SqlUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_role(value: &str) -> Role {
    match value {
        "manager" => Role::Manager,
        "admin" => Role::Admin,
        _ => Role::Employee,
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, StoreError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let company_id: String = row.try_get("company_id").map_err(decode_error)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(decode_error)?;

    Ok(User {
        id: UserId(id),
        name,
        role: parse_role(&role),
        company_id: CompanyId(company_id),
        manager_id: manager_id.map(UserId),
    })
}

#[async_trait::async_trait]
impl UserStore for SqlUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, role, company_id, manager_id FROM app_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, role, company_id, manager_id
             FROM app_user WHERE company_id = ? ORDER BY id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.iter().map(row_to_user).collect()
    }
}
