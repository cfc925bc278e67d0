use expenso_core::domain::expense::{ExpenseStatus, VoteDecision};
use expenso_core::store::StoreError;

pub mod expense;
pub mod memory;
pub mod rule;
pub mod user;

pub use expense::SqlExpenseStore;
pub use memory::{InMemoryExpenseStore, InMemoryRuleStore, InMemoryUserStore};
pub use rule::SqlRuleStore;
pub use user::SqlUserStore;

pub(crate) fn backend_error(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(error.to_string())
}

pub(crate) fn parse_expense_status(value: &str) -> ExpenseStatus {
    match value {
        "approved" => ExpenseStatus::Approved,
        "rejected" => ExpenseStatus::Rejected,
        _ => ExpenseStatus::Pending,
    }
}

pub(crate) fn parse_vote_decision(value: &str) -> Result<VoteDecision, StoreError> {
    match value {
        "approved" => Ok(VoteDecision::Approved),
        "rejected" => Ok(VoteDecision::Rejected),
        other => Err(StoreError::Decode(format!("unknown vote decision `{other}`"))),
    }
}

pub(crate) fn vote_decision_as_str(decision: VoteDecision) -> &'static str {
    match decision {
        VoteDecision::Approved => "approved",
        VoteDecision::Rejected => "rejected",
    }
}
