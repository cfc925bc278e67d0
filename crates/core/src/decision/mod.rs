//! Combines every configured rule's outcome into one expense-level
//! verdict. Pure: recomputing from persisted history always yields the
//! same status as incremental updates after each vote.

use std::collections::HashSet;

use tracing::warn;

use crate::domain::expense::{Expense, ExpenseStatus, Vote};
use crate::domain::rule::{ApprovalRule, RuleOutcome};
use crate::domain::user::UserId;

/// Recomputes the expense status from the company's full rule set and
/// the current vote sequence.
///
/// Rejection is absolute: one rejecting rule overrides any other
/// rule's satisfaction. Approval needs only one satisfied rule. The
/// optional monetary threshold on rules never filters applicability;
/// every configured rule is evaluated.
pub fn recompute(
    expense: &Expense,
    rules: &[ApprovalRule],
    directory: &HashSet<UserId>,
) -> ExpenseStatus {
    let mut satisfied = false;

    for rule in rules {
        match checked_outcome(rule, &expense.approvals, directory) {
            RuleOutcome::Rejected => return ExpenseStatus::Rejected,
            RuleOutcome::Satisfied => satisfied = true,
            RuleOutcome::NotApplicable => {}
        }
    }

    if satisfied {
        ExpenseStatus::Approved
    } else {
        ExpenseStatus::Pending
    }
}

/// Evaluates one rule, downgrading configuration defects to
/// `NotApplicable` so a malformed rule cannot block other approval
/// paths.
fn checked_outcome(
    rule: &ApprovalRule,
    votes: &[Vote],
    directory: &HashSet<UserId>,
) -> RuleOutcome {
    let approvers = rule.approver_ids();

    if approvers.is_empty() {
        warn!(rule_id = %rule.id.0, rule_name = %rule.name, "rule has no approvers, skipping");
        return RuleOutcome::NotApplicable;
    }

    if let Some(unknown) = approvers.iter().copied().find(|approver| !directory.contains(*approver)) {
        warn!(
            rule_id = %rule.id.0,
            rule_name = %rule.name,
            approver_id = %unknown.0,
            "rule references an approver missing from the directory, skipping"
        );
        return RuleOutcome::NotApplicable;
    }

    rule.evaluate(votes)
}
