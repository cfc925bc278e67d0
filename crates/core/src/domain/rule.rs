use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::expense::{Vote, VoteDecision};
use crate::domain::user::{CompanyId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// Outcome of evaluating one rule against an expense's vote sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Satisfied,
    Rejected,
    NotApplicable,
}

/// Type-specific rule parameters, discriminated by `type` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// An ordered chain of approvers who must approve in turn.
    Sequential { approvers: Vec<UserId> },
    /// A minimum fraction of a named approver set must approve.
    Percentage {
        approvers: Vec<UserId>,
        #[serde(default = "default_percentage")]
        percentage: u8,
    },
    /// A single designated approver whose approval alone suffices.
    SpecificApprover {
        #[serde(rename = "approverId")]
        approver_id: UserId,
    },
}

fn default_percentage() -> u8 {
    100
}

/// Company-level approval policy. Configuration data: owned by one
/// company, mutated only through administrative edit operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRule {
    pub id: RuleId,
    pub company_id: CompanyId,
    pub name: String,
    /// Monetary threshold carried in configuration. Present in data but
    /// never gates applicability: every rule is always evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Decimal>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl ApprovalRule {
    /// All user ids this rule references, in configured order.
    pub fn approver_ids(&self) -> Vec<&UserId> {
        match &self.kind {
            RuleKind::Sequential { approvers } | RuleKind::Percentage { approvers, .. } => {
                approvers.iter().collect()
            }
            RuleKind::SpecificApprover { approver_id } => vec![approver_id],
        }
    }

    pub fn evaluate(&self, votes: &[Vote]) -> RuleOutcome {
        self.kind.evaluate(votes)
    }
}

impl RuleKind {
    /// Pure evaluation against a vote sequence. Consumes only the
    /// votes and the rule's own parameters.
    pub fn evaluate(&self, votes: &[Vote]) -> RuleOutcome {
        match self {
            Self::Sequential { approvers } => evaluate_sequential(approvers, votes),
            Self::Percentage { approvers, percentage } => {
                evaluate_percentage(approvers, *percentage, votes)
            }
            Self::SpecificApprover { approver_id } => evaluate_specific(approver_id, votes),
        }
    }
}

fn decision_of<'a>(votes: &'a [Vote], user_id: &UserId) -> Option<&'a VoteDecision> {
    votes.iter().find(|vote| &vote.user_id == user_id).map(|vote| &vote.status)
}

fn evaluate_sequential(approvers: &[UserId], votes: &[Vote]) -> RuleOutcome {
    if approvers.is_empty() {
        return RuleOutcome::NotApplicable;
    }

    if approvers
        .iter()
        .any(|approver| decision_of(votes, approver) == Some(&VoteDecision::Rejected))
    {
        return RuleOutcome::Rejected;
    }

    // Walk the chain front to back. A later approval is recorded but
    // does not advance satisfaction until every predecessor approved.
    for approver in approvers {
        if decision_of(votes, approver) != Some(&VoteDecision::Approved) {
            return RuleOutcome::NotApplicable;
        }
    }

    RuleOutcome::Satisfied
}

fn evaluate_percentage(approvers: &[UserId], percentage: u8, votes: &[Vote]) -> RuleOutcome {
    if approvers.is_empty() {
        return RuleOutcome::NotApplicable;
    }

    // A rejection from inside the approver set disqualifies the
    // expense outright, mirroring expense-level rejection dominance.
    if approvers
        .iter()
        .any(|approver| decision_of(votes, approver) == Some(&VoteDecision::Rejected))
    {
        return RuleOutcome::Rejected;
    }

    let approved = approvers
        .iter()
        .filter(|approver| decision_of(votes, approver) == Some(&VoteDecision::Approved))
        .count();

    if approved * 100 >= usize::from(percentage) * approvers.len() {
        RuleOutcome::Satisfied
    } else {
        RuleOutcome::NotApplicable
    }
}

fn evaluate_specific(approver_id: &UserId, votes: &[Vote]) -> RuleOutcome {
    match decision_of(votes, approver_id) {
        Some(VoteDecision::Approved) => RuleOutcome::Satisfied,
        Some(VoteDecision::Rejected) => RuleOutcome::Rejected,
        None => RuleOutcome::NotApplicable,
    }
}
