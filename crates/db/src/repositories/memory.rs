use std::collections::HashMap;

use tokio::sync::RwLock;

use expenso_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use expenso_core::domain::rule::{ApprovalRule, RuleId};
use expenso_core::domain::user::{CompanyId, User, UserId};
use expenso_core::store::{ExpenseStore, RuleStore, StoreError, UserStore};

#[derive(Default)]
pub struct InMemoryExpenseStore {
    expenses: RwLock<HashMap<String, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn list_pending_by_company(
        &self,
        _company_id: &CompanyId,
    ) -> Result<Vec<Expense>, StoreError> {
        // The in-memory store holds a single company's worth of data.
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| expense.status == ExpenseStatus::Pending)
            .cloned()
            .collect())
    }

    async fn save(&self, expense: Expense) -> Result<(), StoreError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub async fn insert(&self, user: User) {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let mut matched: Vec<User> =
            users.values().filter(|user| &user.company_id == company_id).cloned().collect();
        matched.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, ApprovalRule>>,
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, StoreError> {
        let rules = self.rules.read().await;
        let mut matched: Vec<ApprovalRule> =
            rules.values().filter(|rule| &rule.company_id == company_id).cloned().collect();
        matched.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matched)
    }

    async fn upsert(&self, rule: ApprovalRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        rules.remove(&id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use expenso_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use expenso_core::domain::rule::{ApprovalRule, RuleId, RuleKind};
    use expenso_core::domain::user::{CompanyId, UserId};
    use expenso_core::store::{ExpenseStore, RuleStore};

    use super::{InMemoryExpenseStore, InMemoryRuleStore};

    fn expense(id: &str, status: ExpenseStatus) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            user_id: UserId("u-employee".to_string()),
            amount: Decimal::new(4_500, 2),
            currency: "USD".to_string(),
            category: "Meals".to_string(),
            description: "Team lunch".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 4, 2).expect("valid date"),
            status,
            approvals: Vec::new(),
        }
    }

    #[tokio::test]
    async fn saved_expense_round_trips_and_pending_filter_applies() {
        let store = InMemoryExpenseStore::default();
        store.save(expense("E-1", ExpenseStatus::Pending)).await.expect("save");
        store.save(expense("E-2", ExpenseStatus::Approved)).await.expect("save");

        let found = store.find_by_id(&ExpenseId("E-1".to_string())).await.expect("find");
        assert!(found.is_some());

        let pending = store
            .list_pending_by_company(&CompanyId("c-1".to_string()))
            .await
            .expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.0, "E-1");
    }

    #[tokio::test]
    async fn rule_upsert_replaces_and_delete_removes() {
        let store = InMemoryRuleStore::default();
        let company = CompanyId("c-1".to_string());

        let mut rule = ApprovalRule {
            id: RuleId("r-1".to_string()),
            company_id: company.clone(),
            name: "CFO sign-off".to_string(),
            threshold: None,
            kind: RuleKind::SpecificApprover { approver_id: UserId("u-cfo".to_string()) },
        };
        store.upsert(rule.clone()).await.expect("insert");

        rule.name = "Finance sign-off".to_string();
        store.upsert(rule).await.expect("update");

        let rules = store.list_for_company(&company).await.expect("list");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Finance sign-off");

        store.delete(&RuleId("r-1".to_string())).await.expect("delete");
        assert!(store.list_for_company(&company).await.expect("list").is_empty());
    }
}
