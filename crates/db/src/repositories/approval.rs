use sqlx::Row;

use waqf_core::approvals::engine::ApprovalTransition;
use waqf_core::domain::approval::{
    ApprovalId, ApprovalState, ApprovalStatus, ApprovalStep, ApprovalStepId, EntityType,
    StepAction, WorkflowId,
};

use super::{
    parse_decimal, parse_enum, parse_optional_timestamp, parse_timestamp, ApprovalRepository,
    PendingApproval, RepositoryError,
};
use crate::DbPool;

const STATUS_COLUMNS: &str = "s.id, s.workflow_id, s.entity_type, s.entity_id, s.amount, s.status,
        s.current_level, s.total_levels, s.started_at, s.completed_at";

const STEP_COLUMNS: &str = "st.id AS step_id, st.approval_id, st.level, st.approver_role,
        st.required, st.approver_name, st.action, st.actioned_at, st.notes";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_status(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStatus, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: String =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: String =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_level: i64 =
        row.try_get("current_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_levels: i64 =
        row.try_get("total_levels").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let started_at: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalStatus {
        id: ApprovalId(id),
        workflow_id: WorkflowId(workflow_id),
        entity_type: parse_enum::<EntityType>("entity_type", &entity_type)?,
        entity_id,
        amount: parse_decimal("amount", &amount)?,
        status: parse_enum::<ApprovalState>("status", &status)?,
        current_level: level_from_i64("current_level", current_level)?,
        total_levels: level_from_i64("total_levels", total_levels)?,
        started_at: parse_timestamp("started_at", &started_at)?,
        completed_at: parse_optional_timestamp("completed_at", completed_at)?,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: String = row.try_get("step_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approval_id: String =
        row.try_get("approval_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level: i64 = row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_role: String =
        row.try_get("approver_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required: bool =
        row.try_get("required").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_name: Option<String> =
        row.try_get("approver_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action: Option<String> =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actioned_at: Option<String> =
        row.try_get("actioned_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: Option<String> =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalStep {
        id: ApprovalStepId(id),
        approval_id: ApprovalId(approval_id),
        level: level_from_i64("level", level)?,
        approver_role,
        required,
        approver_name,
        action: action.map(|raw| parse_enum::<StepAction>("action", &raw)).transpose()?,
        actioned_at: parse_optional_timestamp("actioned_at", actioned_at)?,
        notes,
    })
}

fn level_from_i64(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column}: {value} is not a valid level")))
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn save_started(
        &self,
        status: ApprovalStatus,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_status (id, workflow_id, entity_type, entity_id, amount, status,
                                          current_level, total_levels, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&status.id.0)
        .bind(&status.workflow_id.0)
        .bind(status.entity_type.as_str())
        .bind(&status.entity_id)
        .bind(status.amount.to_string())
        .bind(status.status.as_str())
        .bind(i64::from(status.current_level))
        .bind(i64::from(status.total_levels))
        .bind(status.started_at.to_rfc3339())
        .bind(status.completed_at.map(|value| value.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(|error| match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!(
                    "{} `{}` already has a pending approval",
                    status.entity_type.as_str(),
                    status.entity_id
                ),
            ),
            _ => RepositoryError::from(error),
        })?;

        for step in &steps {
            sqlx::query(
                "INSERT INTO approval_steps (id, approval_id, level, approver_role, required,
                                             approver_name, action, actioned_at, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.approval_id.0)
            .bind(i64::from(step.level))
            .bind(&step.approver_role)
            .bind(step.required)
            .bind(&step.approver_name)
            .bind(step.action.map(|action| action.as_str()))
            .bind(step.actioned_at.map(|value| value.to_rfc3339()))
            .bind(&step.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<ApprovalStatus>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {STATUS_COLUMNS} FROM approval_status s WHERE s.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_status).transpose()
    }

    async fn steps_for(&self, id: &ApprovalId) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_steps st WHERE st.approval_id = ? ORDER BY st.level"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect()
    }

    async fn find_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ApprovalStatus>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STATUS_COLUMNS} FROM approval_status s
             WHERE s.entity_type = ? AND s.entity_id = ?
             ORDER BY s.started_at DESC"
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_status).collect()
    }

    async fn list_pending(
        &self,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PendingApproval>, RepositoryError> {
        let base = format!(
            "SELECT {STATUS_COLUMNS}, {STEP_COLUMNS}
             FROM approval_status s
             JOIN approval_steps st ON st.approval_id = s.id AND st.level = s.current_level
             WHERE s.status = 'pending'"
        );

        let rows = match role {
            Some(role) => {
                sqlx::query(&format!(
                    "{base} AND LOWER(st.approver_role) = LOWER(?) ORDER BY s.started_at ASC LIMIT ?"
                ))
                .bind(role.trim())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{base} ORDER BY s.started_at ASC LIMIT ?"))
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| Ok(PendingApproval { status: row_to_status(row)?, current_step: row_to_step(row)? }))
            .collect()
    }

    async fn record_transition(
        &self,
        transition: &ApprovalTransition,
    ) -> Result<(), RepositoryError> {
        let step = &transition.step;
        let status = &transition.status;
        let mut tx = self.pool.begin().await?;

        let step_update = sqlx::query(
            "UPDATE approval_steps
             SET approver_name = ?, action = ?, actioned_at = ?, notes = ?
             WHERE id = ? AND approval_id = ? AND action IS NULL",
        )
        .bind(&step.approver_name)
        .bind(step.action.map(|action| action.as_str()))
        .bind(step.actioned_at.map(|value| value.to_rfc3339()))
        .bind(&step.notes)
        .bind(&step.id.0)
        .bind(&status.id.0)
        .execute(&mut *tx)
        .await?;

        if step_update.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "step `{}` was already actioned or does not exist",
                step.id.0
            )));
        }

        let status_update = sqlx::query(
            "UPDATE approval_status
             SET status = ?, current_level = ?, completed_at = ?
             WHERE id = ? AND status = 'pending' AND current_level = ?",
        )
        .bind(status.status.as_str())
        .bind(i64::from(status.current_level))
        .bind(status.completed_at.map(|value| value.to_rfc3339()))
        .bind(&status.id.0)
        .bind(i64::from(transition.from_level))
        .execute(&mut *tx)
        .await?;

        if status_update.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "approval `{}` is no longer pending at level {}",
                status.id.0, transition.from_level
            )));
        }

        tx.commit().await?;
        tracing::debug!(
            event_name = "db.approval.transition_recorded",
            approval_id = %status.id.0,
            from_level = transition.from_level,
            to_level = transition.to_level,
            state = status.status.as_str(),
            "approval transition persisted"
        );
        Ok(())
    }
}
