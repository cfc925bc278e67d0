//! Decides who may currently vote on an expense. Eligibility is
//! derived from the organizational hierarchy (direct manager) plus
//! rule membership, and for sequential rules from the chain position.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::rule::{ApprovalRule, RuleKind};
use crate::domain::user::{CompanyId, User, UserId};

/// Built from a user-directory snapshot and the configured rules,
/// then queried per (user, expense) pair.
#[derive(Clone, Debug, Default)]
pub struct EligibilityResolver {
    users_by_id: HashMap<UserId, User>,
    rules_by_company: HashMap<CompanyId, Vec<ApprovalRule>>,
}

impl EligibilityResolver {
    pub fn new(users: Vec<User>, rules: Vec<ApprovalRule>) -> Self {
        let users_by_id = users.into_iter().map(|user| (user.id.clone(), user)).collect();

        let mut rules_by_company: HashMap<CompanyId, Vec<ApprovalRule>> = HashMap::new();
        for rule in rules {
            rules_by_company.entry(rule.company_id.clone()).or_default().push(rule);
        }

        Self { users_by_id, rules_by_company }
    }

    /// A user may vote when the expense is still pending, they have
    /// not voted yet, and they are either the owner's direct manager
    /// or it is their turn under some configured rule.
    pub fn is_eligible(&self, voter_id: &UserId, expense: &Expense) -> bool {
        if expense.status != ExpenseStatus::Pending {
            return false;
        }

        if expense.has_vote_from(voter_id) {
            return false;
        }

        let Some(owner) = self.users_by_id.get(&expense.user_id) else {
            warn!(
                expense_id = %expense.id.0,
                owner_id = %expense.user_id.0,
                "expense owner missing from the directory"
            );
            return false;
        };

        // The direct manager is an implicit approval path, independent
        // of configured rules.
        if owner.manager_id.as_ref() == Some(voter_id) {
            return true;
        }

        self.rules_by_company
            .get(&owner.company_id)
            .map(|rules| rules.iter().any(|rule| self.rule_grants_turn(rule, voter_id, expense)))
            .unwrap_or(false)
    }

    fn rule_grants_turn(&self, rule: &ApprovalRule, voter_id: &UserId, expense: &Expense) -> bool {
        if let Some(unknown) =
            rule.approver_ids().into_iter().find(|approver| !self.users_by_id.contains_key(*approver))
        {
            warn!(
                rule_id = %rule.id.0,
                approver_id = %unknown.0,
                "rule references an approver missing from the directory, skipping"
            );
            return false;
        }

        match &rule.kind {
            RuleKind::SpecificApprover { approver_id } => approver_id == voter_id,
            RuleKind::Percentage { approvers, .. } => approvers.contains(voter_id),
            RuleKind::Sequential { approvers } => {
                let Some(position) = approvers.iter().position(|approver| approver == voter_id)
                else {
                    return false;
                };

                // A later-listed approver cannot jump the queue: every
                // predecessor must already hold an approved vote.
                approvers[..position]
                    .iter()
                    .all(|predecessor| expense.has_approval_from(predecessor))
            }
        }
    }

    /// The pending expenses `voter_id` may act on, ordered by
    /// submission date ascending with ties broken by expense id so the
    /// queue is deterministic and restartable.
    pub fn pending_for<'a>(
        &self,
        voter_id: &UserId,
        expenses: &'a [Expense],
    ) -> Vec<&'a Expense> {
        let mut pending: Vec<&Expense> =
            expenses.iter().filter(|expense| self.is_eligible(voter_id, expense)).collect();
        pending.sort_by(|left, right| {
            left.date.cmp(&right.date).then_with(|| left.id.cmp(&right.id))
        });
        pending
    }

    pub fn user(&self, user_id: &UserId) -> Option<&User> {
        self.users_by_id.get(user_id)
    }
}
