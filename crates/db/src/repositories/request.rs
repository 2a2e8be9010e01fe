use sqlx::{QueryBuilder, Row, Sqlite};

use waqf_core::domain::beneficiary::BeneficiaryId;
use waqf_core::domain::request::{
    BeneficiaryRequest, Priority, RequestId, RequestKind, RequestStatus,
};

use super::{
    parse_decimal, parse_enum, parse_optional_timestamp, parse_timestamp, RepositoryError,
    RequestFilter, RequestRepository,
};
use crate::DbPool;

const SELECT_REQUEST: &str = "SELECT id, beneficiary_id, kind, title, amount, status, priority,
        sla_due_at, created_at, updated_at
 FROM beneficiary_requests";

const ORDER_BY_DEADLINE: &str = "sla_due_at IS NULL, sla_due_at ASC, created_at ASC";

fn push_terminal_statuses(query: &mut QueryBuilder<'_, Sqlite>) {
    query.push("(");
    let mut separated = query.separated(", ");
    for status in RequestStatus::TERMINAL {
        separated.push_bind(status.as_str());
    }
    query.push(")");
}

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<BeneficiaryRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let beneficiary_id: String =
        row.try_get("beneficiary_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: Option<String> =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority: String =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sla_due_at: Option<String> =
        row.try_get("sla_due_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(BeneficiaryRequest {
        id: RequestId(id),
        beneficiary_id: BeneficiaryId(beneficiary_id),
        kind: parse_enum::<RequestKind>("kind", &kind)?,
        title,
        amount: amount.map(|raw| parse_decimal("amount", &raw)).transpose()?,
        status: parse_enum::<RequestStatus>("status", &status)?,
        priority: parse_enum::<Priority>("priority", &priority)?,
        sla_due_at: parse_optional_timestamp("sla_due_at", sla_due_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<BeneficiaryRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_REQUEST} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn save(&self, request: BeneficiaryRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO beneficiary_requests (id, beneficiary_id, kind, title, amount, status,
                                               priority, sla_due_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 amount = excluded.amount,
                 status = excluded.status,
                 priority = excluded.priority,
                 sla_due_at = excluded.sla_due_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.beneficiary_id.0)
        .bind(request.kind.as_str())
        .bind(&request.title)
        .bind(request.amount.map(|value| value.to_string()))
        .bind(request.status.as_str())
        .bind(request.priority.as_str())
        .bind(request.sla_due_at.map(|value| value.to_rfc3339()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        limit: u32,
    ) -> Result<Vec<BeneficiaryRequest>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_REQUEST);
        query.push(" WHERE 1=1");

        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status.as_str());
        }
        if filter.open_only {
            query.push(" AND status NOT IN ");
            push_terminal_statuses(&mut query);
        }
        if let Some(now) = filter.overdue_at {
            // RFC 3339 in UTC sorts lexically in time order.
            query.push(" AND sla_due_at IS NOT NULL AND sla_due_at < ");
            query.push_bind(now.to_rfc3339());
        }

        query.push(" ORDER BY status IN ");
        push_terminal_statuses(&mut query);
        query.push(", ");
        query.push(ORDER_BY_DEADLINE);
        query.push(" LIMIT ");
        query.push_bind(i64::from(limit));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect()
    }
}
