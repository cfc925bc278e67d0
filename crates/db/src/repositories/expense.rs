use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use expenso_core::domain::expense::{Expense, ExpenseId, Vote};
use expenso_core::domain::user::{CompanyId, UserId};
use expenso_core::store::{ExpenseStore, StoreError};

use super::{backend_error, decode_error, parse_expense_status, parse_vote_decision, vote_decision_as_str};
use crate::DbPool;

pub struct SqlExpenseStore {
    pool: DbPool,
}

impl SqlExpenseStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn votes_for(&self, expense_ids: &[String]) -> Result<HashMap<String, Vec<Vote>>, StoreError> {
        let mut votes_by_expense: HashMap<String, Vec<Vote>> = HashMap::new();
        if expense_ids.is_empty() {
            return Ok(votes_by_expense);
        }

        let placeholders = vec!["?"; expense_ids.len()].join(", ");
        let sql = format!(
            "SELECT expense_id, voter_id, decision, comments, cast_at
             FROM expense_vote
             WHERE expense_id IN ({placeholders})
             ORDER BY expense_id, position",
        );

        let mut query = sqlx::query(&sql);
        for id in expense_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(backend_error)?;
        for row in rows {
            let expense_id: String = row.try_get("expense_id").map_err(decode_error)?;
            votes_by_expense.entry(expense_id).or_default().push(row_to_vote(&row)?);
        }

        Ok(votes_by_expense)
    }
}

fn row_to_vote(row: &sqlx::sqlite::SqliteRow) -> Result<Vote, StoreError> {
    let voter_id: String = row.try_get("voter_id").map_err(decode_error)?;
    let decision: String = row.try_get("decision").map_err(decode_error)?;
    let comments: String = row.try_get("comments").map_err(decode_error)?;
    let cast_at: String = row.try_get("cast_at").map_err(decode_error)?;

    let timestamp = DateTime::parse_from_rfc3339(&cast_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            StoreError::Decode(format!("vote by `{voter_id}` has malformed cast_at `{cast_at}`"))
        })?;

    Ok(Vote {
        user_id: UserId(voter_id),
        status: parse_vote_decision(&decision)?,
        comments,
        timestamp,
    })
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow, approvals: Vec<Vote>) -> Result<Expense, StoreError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let user_id: String = row.try_get("user_id").map_err(decode_error)?;
    let amount: String = row.try_get("amount").map_err(decode_error)?;
    let currency: String = row.try_get("currency").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let submitted_on: String = row.try_get("submitted_on").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;

    let amount = Decimal::from_str(&amount)
        .map_err(|_| StoreError::Decode(format!("expense `{id}` has malformed amount `{amount}`")))?;
    let date = NaiveDate::parse_from_str(&submitted_on, "%Y-%m-%d").map_err(|_| {
        StoreError::Decode(format!("expense `{id}` has malformed submitted_on `{submitted_on}`"))
    })?;

    Ok(Expense {
        id: ExpenseId(id),
        user_id: UserId(user_id),
        amount,
        currency,
        category,
        description,
        date,
        status: parse_expense_status(&status),
        approvals,
    })
}

#[async_trait::async_trait]
impl ExpenseStore for SqlExpenseStore {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, amount, currency, category, description, submitted_on, status
             FROM expense WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        let Some(row) = row else { return Ok(None) };

        let mut votes = self.votes_for(std::slice::from_ref(&id.0)).await?;
        let approvals = votes.remove(&id.0).unwrap_or_default();
        Ok(Some(row_to_expense(&row, approvals)?))
    }

    async fn list_pending_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query(
            "SELECT e.id, e.user_id, e.amount, e.currency, e.category, e.description,
                    e.submitted_on, e.status
             FROM expense e
             JOIN app_user u ON u.id = e.user_id
             WHERE u.company_id = ? AND e.status = 'pending'
             ORDER BY e.submitted_on, e.id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let ids: Vec<String> =
            rows.iter().map(|row| row.try_get("id").map_err(decode_error)).collect::<Result<_, _>>()?;
        let mut votes_by_expense = self.votes_for(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_expense(row, votes_by_expense.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn save(&self, expense: Expense) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query(
            "INSERT INTO expense (id, user_id, amount, currency, category, description,
                                  submitted_on, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 amount = excluded.amount,
                 currency = excluded.currency,
                 category = excluded.category,
                 description = excluded.description,
                 submitted_on = excluded.submitted_on,
                 status = excluded.status",
        )
        .bind(&expense.id.0)
        .bind(&expense.user_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date.format("%Y-%m-%d").to_string())
        .bind(expense.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend_error)?;

        // The vote ledger is rewritten as a whole so the stored rows
        // always mirror the in-memory arrival order.
        sqlx::query("DELETE FROM expense_vote WHERE expense_id = ?")
            .bind(&expense.id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        for (position, vote) in expense.approvals.iter().enumerate() {
            sqlx::query(
                "INSERT INTO expense_vote (expense_id, voter_id, decision, comments, cast_at, position)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&expense.id.0)
            .bind(&vote.user_id.0)
            .bind(vote_decision_as_str(vote.status))
            .bind(&vote.comments)
            .bind(vote.timestamp.to_rfc3339())
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)
    }
}
