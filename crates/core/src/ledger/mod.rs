//! Append-only vote recording. A vote either fully commits or fails
//! with a typed error; failed appends never mutate the expense.

use tracing::debug;

use crate::domain::expense::{Expense, Vote};
use crate::errors::VoteError;

/// Appends `vote` to the expense's vote sequence, preserving arrival
/// order. The caller recomputes the expense status synchronously after
/// a successful append.
pub fn append(expense: &mut Expense, vote: Vote) -> Result<(), VoteError> {
    if expense.status.is_terminal() {
        return Err(VoteError::ExpenseClosed {
            expense_id: expense.id.0.clone(),
            status: expense.status,
        });
    }

    if expense.has_vote_from(&vote.user_id) {
        return Err(VoteError::DuplicateVote {
            user_id: vote.user_id.0.clone(),
            expense_id: expense.id.0.clone(),
        });
    }

    debug!(
        expense_id = %expense.id.0,
        voter_id = %vote.user_id.0,
        decision = ?vote.status,
        "vote recorded"
    );
    expense.approvals.push(vote);
    Ok(())
}
