use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    /// Approved and rejected expenses accept no further votes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Approved,
    Rejected,
}

/// A single approver's decision on an expense. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub user_id: UserId,
    pub status: VoteDecision,
    #[serde(default)]
    pub comments: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    /// The submitting user; the expense is owned by them.
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub status: ExpenseStatus,
    /// Cast votes in arrival order. Insertion order is significant for
    /// sequential rules.
    #[serde(default)]
    pub approvals: Vec<Vote>,
}

impl Expense {
    pub fn has_vote_from(&self, user_id: &UserId) -> bool {
        self.approvals.iter().any(|vote| &vote.user_id == user_id)
    }

    pub fn vote_from(&self, user_id: &UserId) -> Option<&Vote> {
        self.approvals.iter().find(|vote| &vote.user_id == user_id)
    }

    pub fn has_approval_from(&self, user_id: &UserId) -> bool {
        self.vote_from(user_id).map(|vote| vote.status == VoteDecision::Approved).unwrap_or(false)
    }
}
