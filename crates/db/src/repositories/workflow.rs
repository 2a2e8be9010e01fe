use sqlx::Row;

use waqf_core::domain::approval::{
    ApprovalLevel, ApprovalWorkflow, EntityType, WorkflowConditions, WorkflowId,
};

use super::{parse_decimal, parse_enum, parse_timestamp, RepositoryError, WorkflowRepository};
use crate::DbPool;

const SELECT_WORKFLOW: &str = "SELECT id, name, entity_type, levels_json, min_amount, max_amount,
        active, created_at
 FROM approval_workflows";

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalWorkflow, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: String =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let levels_json: String =
        row.try_get("levels_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_amount: Option<String> =
        row.try_get("min_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_amount: Option<String> =
        row.try_get("max_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let levels: Vec<ApprovalLevel> = serde_json::from_str(&levels_json)
        .map_err(|e| RepositoryError::Decode(format!("levels_json: {e}")))?;

    Ok(ApprovalWorkflow {
        id: WorkflowId(id),
        name,
        entity_type: parse_enum::<EntityType>("entity_type", &entity_type)?,
        levels,
        conditions: WorkflowConditions {
            min_amount: min_amount.map(|raw| parse_decimal("min_amount", &raw)).transpose()?,
            max_amount: max_amount.map(|raw| parse_decimal("max_amount", &raw)).transpose()?,
        },
        active,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<ApprovalWorkflow>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_WORKFLOW} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_workflow).transpose()
    }

    async fn save(&self, workflow: ApprovalWorkflow) -> Result<(), RepositoryError> {
        let levels_json = serde_json::to_string(&workflow.levels)
            .map_err(|e| RepositoryError::Decode(format!("levels_json: {e}")))?;

        sqlx::query(
            "INSERT INTO approval_workflows (id, name, entity_type, levels_json, min_amount,
                                             max_amount, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 entity_type = excluded.entity_type,
                 levels_json = excluded.levels_json,
                 min_amount = excluded.min_amount,
                 max_amount = excluded.max_amount,
                 active = excluded.active",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.name)
        .bind(workflow.entity_type.as_str())
        .bind(levels_json)
        .bind(workflow.conditions.min_amount.map(|value| value.to_string()))
        .bind(workflow.conditions.max_amount.map(|value| value.to_string()))
        .bind(workflow.active)
        .bind(workflow.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<ApprovalWorkflow>, RepositoryError> {
        let rows = match entity_type {
            Some(entity_type) => {
                sqlx::query(&format!(
                    "{SELECT_WORKFLOW} WHERE active = 1 AND entity_type = ? ORDER BY id"
                ))
                .bind(entity_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{SELECT_WORKFLOW} WHERE active = 1 ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_workflow).collect()
    }
}
