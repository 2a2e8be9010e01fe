use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use waqf_core::approvals::engine::ApprovalTransition;
use waqf_core::audit::AuditEvent;
use waqf_core::domain::approval::{
    ApprovalId, ApprovalStatus, ApprovalStep, ApprovalWorkflow, EntityType, WorkflowId,
};
use waqf_core::domain::beneficiary::{Beneficiary, BeneficiaryId};
use waqf_core::domain::request::{BeneficiaryRequest, RequestId, RequestStatus};
use waqf_core::errors::ApplicationError;

pub mod approval;
pub mod audit;
pub mod beneficiary;
pub mod memory;
pub mod request;
pub mod workflow;

pub use approval::SqlApprovalRepository;
pub use audit::SqlAuditEventRepository;
pub use beneficiary::SqlBeneficiaryRepository;
pub use memory::{
    InMemoryApprovalRepository, InMemoryAuditEventRepository, InMemoryBeneficiaryRepository,
    InMemoryRequestRepository, InMemoryWorkflowRepository,
};
pub use request::SqlRequestRepository;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound(message) => Self::NotFound(message),
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                Self::Persistence(error.to_string())
            }
        }
    }
}

/// An open approval together with the step currently waiting for action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub status: ApprovalStatus,
    pub current_step: ApprovalStep,
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_by_id(&self, id: &WorkflowId)
        -> Result<Option<ApprovalWorkflow>, RepositoryError>;
    async fn save(&self, workflow: ApprovalWorkflow) -> Result<(), RepositoryError>;
    /// Active workflows, optionally narrowed to one entity type, ordered by id.
    async fn list_active(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<ApprovalWorkflow>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Persists a freshly started approval and all of its steps atomically.
    async fn save_started(
        &self,
        status: ApprovalStatus,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ApprovalId)
        -> Result<Option<ApprovalStatus>, RepositoryError>;

    async fn steps_for(&self, id: &ApprovalId) -> Result<Vec<ApprovalStep>, RepositoryError>;

    async fn find_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ApprovalStatus>, RepositoryError>;

    /// Pending approvals whose current step requires `role`, or all when `role` is `None`.
    async fn list_pending(
        &self,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PendingApproval>, RepositoryError>;

    /// Writes the actioned step and the aggregate in one unit.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the stored approval is no
    /// longer pending at `transition.from_level` or the step was already
    /// actioned, leaving both rows untouched.
    async fn record_transition(&self, transition: &ApprovalTransition)
        -> Result<(), RepositoryError>;
}

/// Predicates applied before the row limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    /// Excludes approved, rejected, completed and cancelled requests.
    pub open_only: bool,
    /// Keeps only requests whose deadline is strictly before this instant.
    pub overdue_at: Option<DateTime<Utc>>,
}

impl RequestFilter {
    pub fn open() -> Self {
        Self { open_only: true, ..Self::default() }
    }

    pub fn with_status(status: Option<RequestStatus>) -> Self {
        Self { status, ..Self::default() }
    }

    pub fn matches(&self, request: &BeneficiaryRequest) -> bool {
        if self.status.is_some_and(|status| request.status != status) {
            return false;
        }
        if self.open_only && request.status.is_terminal() {
            return false;
        }
        match self.overdue_at {
            Some(now) => request.sla_due_at.is_some_and(|due| due < now),
            None => true,
        }
    }
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<BeneficiaryRequest>, RepositoryError>;
    async fn save(&self, request: BeneficiaryRequest) -> Result<(), RepositoryError>;
    /// Requests matching `filter`, open ones first, then by deadline (missing
    /// deadlines last) and creation time. `limit` applies after filtering.
    async fn list(
        &self,
        filter: &RequestFilter,
        limit: u32,
    ) -> Result<Vec<BeneficiaryRequest>, RepositoryError>;
}

#[async_trait]
pub trait BeneficiaryRepository: Send + Sync {
    async fn find_by_id(&self, id: &BeneficiaryId)
        -> Result<Option<Beneficiary>, RepositoryError>;
    async fn save(&self, beneficiary: Beneficiary) -> Result<(), RepositoryError>;
    async fn list_active(&self) -> Result<Vec<Beneficiary>, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(column, &value)).transpose()
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_enum<T>(column: &str, raw: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
