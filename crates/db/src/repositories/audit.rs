use std::collections::BTreeMap;

use sqlx::Row;

use waqf_core::audit::{AuditCategory, AuditEvent, AuditOutcome};

use super::{parse_timestamp, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_category(raw: &str) -> Result<AuditCategory, RepositoryError> {
    match raw {
        "intake" => Ok(AuditCategory::Intake),
        "approval" => Ok(AuditCategory::Approval),
        "distribution" => Ok(AuditCategory::Distribution),
        "accounting" => Ok(AuditCategory::Accounting),
        "persistence" => Ok(AuditCategory::Persistence),
        "system" => Ok(AuditCategory::System),
        other => Err(RepositoryError::Decode(format!("category: unknown value `{other}`"))),
    }
}

fn parse_outcome(raw: &str) -> Result<AuditOutcome, RepositoryError> {
    match raw {
        "success" => Ok(AuditOutcome::Success),
        "rejected" => Ok(AuditOutcome::Rejected),
        "failed" => Ok(AuditOutcome::Failed),
        other => Err(RepositoryError::Decode(format!("outcome: unknown value `{other}`"))),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: Option<String> =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: Option<String> =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String = row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome: String =
        row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_json: String =
        row.try_get("metadata_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

    Ok(AuditEvent {
        event_id: id,
        entity_type,
        entity_id,
        correlation_id,
        event_type,
        category: parse_category(&category)?,
        actor,
        outcome: parse_outcome(&outcome)?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

        sqlx::query(
            "INSERT INTO audit_event (id, entity_type, entity_id, correlation_id, event_type,
                                      category, actor, outcome, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&event.event_id)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, entity_type, entity_id, correlation_id, event_type, category, actor,
                    outcome, metadata_json, occurred_at
             FROM audit_event
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use waqf_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};

    use super::SqlAuditEventRepository;
    use crate::repositories::AuditEventRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn append_and_list_preserves_metadata_and_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditEventRepository::new(pool);
        let context = AuditContext::new("corr-77", "financial_manager:sara");

        let started = AuditEvent::new(
            &context,
            "approval.started",
            AuditCategory::Approval,
            AuditOutcome::Success,
        )
        .for_entity("loan", "LOAN-9")
        .with_metadata("total_levels", "2");
        let refused = AuditEvent::new(
            &context,
            "approval.transition_rejected",
            AuditCategory::Approval,
            AuditOutcome::Rejected,
        )
        .for_entity("loan", "LOAN-9");
        let unrelated = AuditEvent::new(
            &context,
            "request.opened",
            AuditCategory::Intake,
            AuditOutcome::Success,
        )
        .for_entity("beneficiary_request", "REQ-1");

        repo.append(started.clone()).await.expect("append");
        repo.append(refused.clone()).await.expect("append");
        repo.append(unrelated).await.expect("append");
        repo.append(started.clone()).await.expect("duplicate append is ignored");

        let events = repo.list_for_entity("loan", "LOAN-9").await.expect("list");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "approval.started");
        assert_eq!(events[0].metadata.get("total_levels").map(String::as_str), Some("2"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}
