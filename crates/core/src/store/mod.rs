//! Repository abstraction the engine is written against. Persistence
//! backends implement these traits; the engine never touches a
//! database directly and keeps no process-wide state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::rule::{ApprovalRule, RuleId};
use crate::domain::user::{CompanyId, User, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError>;

    /// Pending expenses submitted by any user of the company.
    async fn list_pending_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, StoreError>;

    async fn save(&self, expense: Expense) -> Result<(), StoreError>;
}

/// Read-only view of the user directory.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, StoreError>;
}

/// Rule configuration store. `upsert` fully replaces a rule in one
/// atomic step; no partial-rule state is ever visible mid-edit.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, StoreError>;

    async fn upsert(&self, rule: ApprovalRule) -> Result<(), StoreError>;

    async fn delete(&self, id: &RuleId) -> Result<(), StoreError>;
}
