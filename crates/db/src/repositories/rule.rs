use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use expenso_core::domain::rule::{ApprovalRule, RuleId, RuleKind};
use expenso_core::domain::user::{CompanyId, UserId};
use expenso_core::store::{RuleStore, StoreError};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlRuleStore {
    pool: DbPool,
}

impl SqlRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn rule_type_as_str(kind: &RuleKind) -> &'static str {
    match kind {
        RuleKind::Sequential { .. } => "sequential",
        RuleKind::Percentage { .. } => "percentage",
        RuleKind::SpecificApprover { .. } => "specific_approver",
    }
}

fn assemble_kind(
    rule_id: &str,
    rule_type: &str,
    percentage: Option<i64>,
    approvers: Vec<UserId>,
) -> Result<RuleKind, StoreError> {
    match rule_type {
        "sequential" => Ok(RuleKind::Sequential { approvers }),
        "percentage" => {
            let percentage = percentage.unwrap_or(100);
            let percentage = u8::try_from(percentage).map_err(|_| {
                StoreError::Decode(format!("rule `{rule_id}` has malformed percentage `{percentage}`"))
            })?;
            Ok(RuleKind::Percentage { approvers, percentage })
        }
        "specific_approver" => {
            let approver_id = approvers.into_iter().next().ok_or_else(|| {
                StoreError::Decode(format!("rule `{rule_id}` names no specific approver"))
            })?;
            Ok(RuleKind::SpecificApprover { approver_id })
        }
        other => Err(StoreError::Decode(format!("rule `{rule_id}` has unknown type `{other}`"))),
    }
}

#[async_trait::async_trait]
impl RuleStore for SqlRuleStore {
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, StoreError> {
        let rule_rows = sqlx::query(
            "SELECT id, company_id, name, rule_type, percentage, threshold
             FROM approval_rule WHERE company_id = ?
             ORDER BY position, id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let approver_rows = sqlx::query(
            "SELECT ra.rule_id, ra.approver_id
             FROM rule_approver ra
             JOIN approval_rule r ON r.id = ra.rule_id
             WHERE r.company_id = ?
             ORDER BY ra.rule_id, ra.position",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut approvers_by_rule: HashMap<String, Vec<UserId>> = HashMap::new();
        for row in approver_rows {
            let rule_id: String = row.try_get("rule_id").map_err(decode_error)?;
            let approver_id: String = row.try_get("approver_id").map_err(decode_error)?;
            approvers_by_rule.entry(rule_id).or_default().push(UserId(approver_id));
        }

        rule_rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(decode_error)?;
                let company_id: String = row.try_get("company_id").map_err(decode_error)?;
                let name: String = row.try_get("name").map_err(decode_error)?;
                let rule_type: String = row.try_get("rule_type").map_err(decode_error)?;
                let percentage: Option<i64> = row.try_get("percentage").map_err(decode_error)?;
                let threshold: Option<String> = row.try_get("threshold").map_err(decode_error)?;

                let threshold = threshold
                    .map(|raw| {
                        Decimal::from_str(&raw).map_err(|_| {
                            StoreError::Decode(format!("rule `{id}` has malformed threshold `{raw}`"))
                        })
                    })
                    .transpose()?;

                let approvers = approvers_by_rule.remove(&id).unwrap_or_default();
                let kind = assemble_kind(&id, &rule_type, percentage, approvers)?;

                Ok(ApprovalRule {
                    id: RuleId(id),
                    company_id: CompanyId(company_id),
                    name,
                    threshold,
                    kind,
                })
            })
            .collect()
    }

    async fn upsert(&self, rule: ApprovalRule) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        let percentage = match &rule.kind {
            RuleKind::Percentage { percentage, .. } => Some(i64::from(*percentage)),
            _ => None,
        };

        // New rules append to the company's evaluation order; edits keep
        // their slot.
        sqlx::query(
            "INSERT INTO approval_rule (id, company_id, name, rule_type, percentage, threshold, position)
             VALUES (?, ?, ?, ?, ?, ?,
                     (SELECT IFNULL(MAX(position) + 1, 0) FROM approval_rule WHERE company_id = ?))
             ON CONFLICT(id) DO UPDATE SET
                 company_id = excluded.company_id,
                 name = excluded.name,
                 rule_type = excluded.rule_type,
                 percentage = excluded.percentage,
                 threshold = excluded.threshold",
        )
        .bind(&rule.id.0)
        .bind(&rule.company_id.0)
        .bind(&rule.name)
        .bind(rule_type_as_str(&rule.kind))
        .bind(percentage)
        .bind(rule.threshold.map(|threshold| threshold.to_string()))
        .bind(&rule.company_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend_error)?;

        sqlx::query("DELETE FROM rule_approver WHERE rule_id = ?")
            .bind(&rule.id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        let approvers: Vec<&UserId> = match &rule.kind {
            RuleKind::Sequential { approvers } | RuleKind::Percentage { approvers, .. } => {
                approvers.iter().collect()
            }
            RuleKind::SpecificApprover { approver_id } => vec![approver_id],
        };

        for (position, approver) in approvers.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO rule_approver (rule_id, approver_id, position) VALUES (?, ?, ?)",
            )
            .bind(&rule.id.0)
            .bind(&approver.0)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)
    }

    async fn delete(&self, id: &RuleId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM approval_rule WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
