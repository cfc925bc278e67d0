//! The two operations the rest of the system calls: submit a vote and
//! list the pending-approval queue. Each vote submission is one atomic
//! unit of work per expense: eligibility check, ledger append, and
//! status recompute run under a per-expense lock, while votes on
//! different expenses proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::decision;
use crate::domain::expense::{Expense, ExpenseId, Vote, VoteDecision};
use crate::domain::user::UserId;
use crate::eligibility::EligibilityResolver;
use crate::errors::{ApplicationError, VoteError};
use crate::ledger;
use crate::store::{ExpenseStore, RuleStore, UserStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    pub expense_id: ExpenseId,
    pub voter_id: UserId,
    pub decision: VoteDecision,
    pub comments: Option<String>,
}

impl VoteRequest {
    fn validate(&self) -> Result<(), VoteError> {
        if self.expense_id.0.trim().is_empty() {
            return Err(VoteError::Validation("expense id must not be empty".to_string()));
        }
        if self.voter_id.0.trim().is_empty() {
            return Err(VoteError::Validation("voter id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A pending-queue entry, enriched with the submitter's display name
/// from the user directory.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingApproval {
    pub expense: Expense,
    pub submitter_name: String,
}

/// One async mutex per expense id. Lock handles are created lazily and
/// shared between submissions racing on the same expense.
#[derive(Default)]
struct ExpenseLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExpenseLocks {
    async fn acquire(&self, id: &ExpenseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Guards and waiters each hold a clone, so a strong count
            // of one means the entry is idle and can be dropped.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.0.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct ApprovalService<E, U, R> {
    expenses: E,
    users: U,
    rules: R,
    locks: ExpenseLocks,
}

impl<E, U, R> ApprovalService<E, U, R>
where
    E: ExpenseStore,
    U: UserStore,
    R: RuleStore,
{
    pub fn new(expenses: E, users: U, rules: R) -> Self {
        Self { expenses, users, rules, locks: ExpenseLocks::default() }
    }

    /// Records one vote and synchronously recomputes the expense
    /// status. Fails without side effects on validation, eligibility,
    /// duplicate-vote, and closed-expense conditions.
    pub async fn submit_vote(&self, request: VoteRequest) -> Result<Expense, ApplicationError> {
        request.validate().map_err(ApplicationError::from)?;

        let _guard = self.locks.acquire(&request.expense_id).await;

        let mut expense = self
            .expenses
            .find_by_id(&request.expense_id)
            .await?
            .ok_or_else(|| ApplicationError::ExpenseNotFound(request.expense_id.0.clone()))?;

        if expense.status.is_terminal() {
            return Err(VoteError::ExpenseClosed {
                expense_id: expense.id.0.clone(),
                status: expense.status,
            }
            .into());
        }

        if expense.has_vote_from(&request.voter_id) {
            return Err(VoteError::DuplicateVote {
                user_id: request.voter_id.0.clone(),
                expense_id: expense.id.0.clone(),
            }
            .into());
        }

        let owner = self
            .users
            .find_by_id(&expense.user_id)
            .await?
            .ok_or_else(|| ApplicationError::UserNotFound(expense.user_id.0.clone()))?;

        let company_users = self.users.list_by_company(&owner.company_id).await?;
        let rules = self.rules.list_for_company(&owner.company_id).await?;

        let resolver = EligibilityResolver::new(company_users.clone(), rules.clone());
        if !resolver.is_eligible(&request.voter_id, &expense) {
            return Err(VoteError::NotEligible {
                user_id: request.voter_id.0.clone(),
                expense_id: expense.id.0.clone(),
            }
            .into());
        }

        let vote = Vote {
            user_id: request.voter_id.clone(),
            status: request.decision,
            comments: request.comments.unwrap_or_default(),
            timestamp: Utc::now(),
        };
        ledger::append(&mut expense, vote).map_err(ApplicationError::from)?;

        let directory: HashSet<UserId> =
            company_users.into_iter().map(|user| user.id).collect();
        let recomputed = decision::recompute(&expense, &rules, &directory);
        if recomputed != expense.status {
            info!(
                expense_id = %expense.id.0,
                from = %expense.status,
                to = %recomputed,
                "expense status transition"
            );
        }
        expense.status = recomputed;

        self.expenses.save(expense.clone()).await?;
        Ok(expense)
    }

    /// The expenses currently awaiting `user_id`'s vote, oldest first,
    /// each enriched with the submitter's display name.
    pub async fn list_pending_approvals(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PendingApproval>, ApplicationError> {
        let voter = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::UserNotFound(user_id.0.clone()))?;

        let company_users = self.users.list_by_company(&voter.company_id).await?;
        let rules = self.rules.list_for_company(&voter.company_id).await?;
        let expenses = self.expenses.list_pending_by_company(&voter.company_id).await?;

        let resolver = EligibilityResolver::new(company_users, rules);
        let queue = resolver
            .pending_for(user_id, &expenses)
            .into_iter()
            .map(|expense| PendingApproval {
                submitter_name: resolver
                    .user(&expense.user_id)
                    .map(|owner| owner.name.clone())
                    .unwrap_or_else(|| "Unknown User".to_string()),
                expense: expense.clone(),
            })
            .collect();

        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tokio::sync::RwLock;

    use crate::decision;
    use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus, VoteDecision};
    use crate::domain::rule::{ApprovalRule, RuleId, RuleKind};
    use crate::domain::user::{CompanyId, Role, User, UserId};
    use crate::errors::{ApplicationError, VoteError};
    use crate::store::{ExpenseStore, RuleStore, StoreError, UserStore};

    use super::{ApprovalService, ExpenseLocks, VoteRequest};

    #[derive(Default)]
    struct FakeExpenseStore {
        expenses: RwLock<HashMap<String, Expense>>,
    }

    #[async_trait]
    impl ExpenseStore for FakeExpenseStore {
        async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
            Ok(self.expenses.read().await.get(&id.0).cloned())
        }

        async fn list_pending_by_company(
            &self,
            _company_id: &CompanyId,
        ) -> Result<Vec<Expense>, StoreError> {
            Ok(self
                .expenses
                .read()
                .await
                .values()
                .filter(|expense| expense.status == ExpenseStatus::Pending)
                .cloned()
                .collect())
        }

        async fn save(&self, expense: Expense) -> Result<(), StoreError> {
            self.expenses.write().await.insert(expense.id.0.clone(), expense);
            Ok(())
        }
    }

    struct FakeUserStore {
        users: Vec<User>,
    }

    #[async_trait]
    impl UserStore for FakeUserStore {
        async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
            Ok(self.users.iter().find(|user| &user.id == id).cloned())
        }

        async fn list_by_company(
            &self,
            company_id: &CompanyId,
        ) -> Result<Vec<User>, StoreError> {
            Ok(self
                .users
                .iter()
                .filter(|user| &user.company_id == company_id)
                .cloned()
                .collect())
        }
    }

    struct FakeRuleStore {
        rules: Vec<ApprovalRule>,
    }

    #[async_trait]
    impl RuleStore for FakeRuleStore {
        async fn list_for_company(
            &self,
            company_id: &CompanyId,
        ) -> Result<Vec<ApprovalRule>, StoreError> {
            Ok(self
                .rules
                .iter()
                .filter(|rule| &rule.company_id == company_id)
                .cloned()
                .collect())
        }

        async fn upsert(&self, _rule: ApprovalRule) -> Result<(), StoreError> {
            unimplemented!("not exercised by service tests")
        }

        async fn delete(&self, _id: &RuleId) -> Result<(), StoreError> {
            unimplemented!("not exercised by service tests")
        }
    }

    fn user_id(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn directory() -> Vec<User> {
        let company = CompanyId("c-1".to_string());
        vec![
            User {
                id: user_id("u-employee"),
                name: "Noor".to_string(),
                role: Role::Employee,
                company_id: company.clone(),
                manager_id: Some(user_id("u-mgr")),
            },
            User {
                id: user_id("u-mgr"),
                name: "Priya".to_string(),
                role: Role::Manager,
                company_id: company.clone(),
                manager_id: None,
            },
            User {
                id: user_id("u-cfo"),
                name: "Sam".to_string(),
                role: Role::Admin,
                company_id: company,
                manager_id: None,
            },
        ]
    }

    fn pending_expense(id: &str) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            user_id: user_id("u-employee"),
            amount: Decimal::new(18_000, 2),
            currency: "USD".to_string(),
            category: "Travel".to_string(),
            description: "Conference flight".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 4, 10).expect("valid date"),
            status: ExpenseStatus::Pending,
            approvals: Vec::new(),
        }
    }

    fn percentage_rule(approvers: &[&str], percentage: u8) -> ApprovalRule {
        ApprovalRule {
            id: RuleId("r-pct".to_string()),
            company_id: CompanyId("c-1".to_string()),
            name: "Leadership quorum".to_string(),
            threshold: None,
            kind: RuleKind::Percentage {
                approvers: approvers.iter().map(|id| user_id(id)).collect(),
                percentage,
            },
        }
    }

    async fn service_with(
        expenses: Vec<Expense>,
        rules: Vec<ApprovalRule>,
    ) -> ApprovalService<FakeExpenseStore, FakeUserStore, FakeRuleStore> {
        let expense_store = FakeExpenseStore::default();
        for expense in expenses {
            expense_store.save(expense).await.expect("seed expense");
        }
        ApprovalService::new(
            expense_store,
            FakeUserStore { users: directory() },
            FakeRuleStore { rules },
        )
    }

    fn request(expense_id: &str, voter_id: &str, decision: VoteDecision) -> VoteRequest {
        VoteRequest {
            expense_id: ExpenseId(expense_id.to_string()),
            voter_id: user_id(voter_id),
            decision,
            comments: None,
        }
    }

    #[tokio::test]
    async fn specific_approval_settles_the_expense() {
        let rule = ApprovalRule {
            id: RuleId("r-cfo".to_string()),
            company_id: CompanyId("c-1".to_string()),
            name: "CFO sign-off".to_string(),
            threshold: None,
            kind: RuleKind::SpecificApprover { approver_id: user_id("u-cfo") },
        };
        let service = service_with(vec![pending_expense("E-1")], vec![rule]).await;

        let updated = service
            .submit_vote(request("E-1", "u-cfo", VoteDecision::Approved))
            .await
            .expect("vote should commit");

        assert_eq!(updated.status, ExpenseStatus::Approved);
        assert_eq!(updated.approvals.len(), 1);
    }

    #[tokio::test]
    async fn manager_rejection_closes_the_expense() {
        let service = service_with(
            vec![pending_expense("E-1")],
            vec![percentage_rule(&["u-mgr", "u-cfo"], 100)],
        )
        .await;

        let updated = service
            .submit_vote(request("E-1", "u-mgr", VoteDecision::Rejected))
            .await
            .expect("vote should commit");

        assert_eq!(updated.status, ExpenseStatus::Rejected);
    }

    #[tokio::test]
    async fn ineligible_voter_is_refused_without_side_effects() {
        let service = service_with(vec![pending_expense("E-1")], Vec::new()).await;

        let error = service
            .submit_vote(request("E-1", "u-cfo", VoteDecision::Approved))
            .await
            .expect_err("no rule grants the CFO a turn");

        assert!(matches!(error, ApplicationError::Vote(VoteError::NotEligible { .. })));
        let untouched = service
            .expenses
            .find_by_id(&ExpenseId("E-1".to_string()))
            .await
            .expect("lookup")
            .expect("expense exists");
        assert!(untouched.approvals.is_empty());
    }

    #[tokio::test]
    async fn duplicate_vote_is_reported_as_such() {
        let service = service_with(
            vec![pending_expense("E-1")],
            vec![percentage_rule(&["u-mgr", "u-cfo"], 100)],
        )
        .await;

        service
            .submit_vote(request("E-1", "u-mgr", VoteDecision::Approved))
            .await
            .expect("first vote");
        let error = service
            .submit_vote(request("E-1", "u-mgr", VoteDecision::Approved))
            .await
            .expect_err("second vote from the same user");

        assert!(matches!(error, ApplicationError::Vote(VoteError::DuplicateVote { .. })));
    }

    #[tokio::test]
    async fn votes_on_a_settled_expense_fail_closed() {
        let mut settled = pending_expense("E-1");
        settled.status = ExpenseStatus::Rejected;
        let service =
            service_with(vec![settled], vec![percentage_rule(&["u-mgr", "u-cfo"], 100)]).await;

        let error = service
            .submit_vote(request("E-1", "u-cfo", VoteDecision::Approved))
            .await
            .expect_err("expense is terminal");

        assert!(matches!(error, ApplicationError::Vote(VoteError::ExpenseClosed { .. })));
    }

    #[tokio::test]
    async fn missing_expense_and_blank_input_fail_fast() {
        let service = service_with(Vec::new(), Vec::new()).await;

        let missing = service
            .submit_vote(request("E-404", "u-mgr", VoteDecision::Approved))
            .await
            .expect_err("unknown expense");
        assert!(matches!(missing, ApplicationError::ExpenseNotFound(_)));

        let blank = service
            .submit_vote(request("E-1", "  ", VoteDecision::Approved))
            .await
            .expect_err("blank voter id");
        assert!(matches!(blank, ApplicationError::Vote(VoteError::Validation(_))));
    }

    #[tokio::test]
    async fn pending_queue_is_enriched_with_submitter_names() {
        let service = service_with(
            vec![pending_expense("E-1")],
            vec![percentage_rule(&["u-cfo"], 100)],
        )
        .await;

        let queue =
            service.list_pending_approvals(&user_id("u-cfo")).await.expect("list pending");

        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].expense.id, ExpenseId("E-1".to_string()));
        assert_eq!(queue[0].submitter_name, "Noor");
    }

    #[tokio::test]
    async fn a_voter_who_already_voted_drops_out_of_the_queue() {
        let service = service_with(
            vec![pending_expense("E-1")],
            vec![percentage_rule(&["u-mgr", "u-cfo"], 100)],
        )
        .await;

        service
            .submit_vote(request("E-1", "u-cfo", VoteDecision::Approved))
            .await
            .expect("vote should commit");

        let queue =
            service.list_pending_approvals(&user_id("u-cfo")).await.expect("list pending");
        assert!(queue.is_empty());

        // The other quorum member still sees it.
        let queue =
            service.list_pending_approvals(&user_id("u-mgr")).await.expect("list pending");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn released_expense_locks_are_pruned() {
        let locks = ExpenseLocks::default();

        let held = locks.acquire(&ExpenseId("E-held".to_string())).await;
        let released = locks.acquire(&ExpenseId("E-released".to_string())).await;
        drop(released);

        let _other = locks.acquire(&ExpenseId("E-other".to_string())).await;

        let entries = locks.inner.lock().await;
        assert!(entries.contains_key("E-held"));
        assert!(entries.contains_key("E-other"));
        assert!(!entries.contains_key("E-released"));
        drop(held);
    }

    #[tokio::test]
    async fn concurrent_votes_on_one_expense_are_serialized() {
        let service = Arc::new(
            service_with(
                vec![pending_expense("E-1")],
                vec![percentage_rule(&["u-mgr", "u-cfo"], 100)],
            )
            .await,
        );

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.submit_vote(request("E-1", "u-mgr", VoteDecision::Approved)).await
            })
        };
        let second = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.submit_vote(request("E-1", "u-cfo", VoteDecision::Approved)).await
            })
        };

        first.await.expect("join").expect("manager vote");
        second.await.expect("join").expect("cfo vote");

        let settled = service
            .expenses
            .find_by_id(&ExpenseId("E-1".to_string()))
            .await
            .expect("lookup")
            .expect("expense exists");
        assert_eq!(settled.approvals.len(), 2);
        assert_eq!(settled.status, ExpenseStatus::Approved);
    }

    #[tokio::test]
    async fn persisted_status_matches_a_scratch_recompute() {
        let rules = vec![percentage_rule(&["u-mgr", "u-cfo"], 100)];
        let service = service_with(vec![pending_expense("E-1")], rules.clone()).await;

        service
            .submit_vote(request("E-1", "u-mgr", VoteDecision::Approved))
            .await
            .expect("first vote");
        let updated = service
            .submit_vote(request("E-1", "u-cfo", VoteDecision::Approved))
            .await
            .expect("second vote");

        let ids: HashSet<UserId> = directory().into_iter().map(|user| user.id).collect();
        assert_eq!(decision::recompute(&updated, &rules, &ids), updated.status);
    }
}
