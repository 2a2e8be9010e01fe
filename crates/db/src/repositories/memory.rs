use std::collections::HashMap;

use tokio::sync::RwLock;

use waqf_core::approvals::engine::ApprovalTransition;
use waqf_core::audit::AuditEvent;
use waqf_core::domain::approval::{
    ApprovalId, ApprovalState, ApprovalStatus, ApprovalStep, ApprovalWorkflow, EntityType,
    WorkflowId,
};
use waqf_core::domain::beneficiary::{Beneficiary, BeneficiaryId};
use waqf_core::domain::request::{BeneficiaryRequest, RequestId};

use super::{
    ApprovalRepository, AuditEventRepository, BeneficiaryRepository, PendingApproval,
    RepositoryError, RequestFilter, RequestRepository, WorkflowRepository,
};

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, ApprovalWorkflow>>,
}

#[async_trait::async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<ApprovalWorkflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn save(&self, workflow: ApprovalWorkflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow);
        Ok(())
    }

    async fn list_active(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<ApprovalWorkflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        let mut active: Vec<ApprovalWorkflow> = workflows
            .values()
            .filter(|workflow| workflow.active)
            .filter(|workflow| entity_type.map_or(true, |kind| workflow.entity_type == kind))
            .cloned()
            .collect();
        active.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(active)
    }
}

#[derive(Default)]
struct ApprovalTables {
    statuses: HashMap<String, ApprovalStatus>,
    steps: HashMap<String, Vec<ApprovalStep>>,
}

/// Holds statuses and steps behind one lock so transitions stay atomic.
#[derive(Default)]
pub struct InMemoryApprovalRepository {
    tables: RwLock<ApprovalTables>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn save_started(
        &self,
        status: ApprovalStatus,
        mut steps: Vec<ApprovalStep>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.statuses.contains_key(&status.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "approval `{}` already exists",
                status.id.0
            )));
        }
        let duplicate_pending = status.status == ApprovalState::Pending
            && tables.statuses.values().any(|existing| {
                existing.status == ApprovalState::Pending
                    && existing.entity_type == status.entity_type
                    && existing.entity_id == status.entity_id
            });
        if duplicate_pending {
            return Err(RepositoryError::Conflict(format!(
                "{} `{}` already has a pending approval",
                status.entity_type.as_str(),
                status.entity_id
            )));
        }

        steps.sort_by_key(|step| step.level);
        tables.steps.insert(status.id.0.clone(), steps);
        tables.statuses.insert(status.id.0.clone(), status);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalStatus>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.statuses.get(&id.0).cloned())
    }

    async fn steps_for(&self, id: &ApprovalId) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.steps.get(&id.0).cloned().unwrap_or_default())
    }

    async fn find_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ApprovalStatus>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut found: Vec<ApprovalStatus> = tables
            .statuses
            .values()
            .filter(|status| status.entity_type == entity_type && status.entity_id == entity_id)
            .cloned()
            .collect();
        found.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        Ok(found)
    }

    async fn list_pending(
        &self,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PendingApproval>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<PendingApproval> = tables
            .statuses
            .values()
            .filter(|status| status.status == ApprovalState::Pending)
            .filter_map(|status| {
                let current_step = tables
                    .steps
                    .get(&status.id.0)?
                    .iter()
                    .find(|step| step.level == status.current_level)?
                    .clone();
                Some(PendingApproval { status: status.clone(), current_step })
            })
            .filter(|pending| {
                role.map_or(true, |role| {
                    pending.current_step.approver_role.eq_ignore_ascii_case(role.trim())
                })
            })
            .collect();

        pending.sort_by(|left, right| {
            left.status
                .started_at
                .cmp(&right.status.started_at)
                .then_with(|| left.status.id.0.cmp(&right.status.id.0))
        });
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn record_transition(
        &self,
        transition: &ApprovalTransition,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let approval_id = transition.status.id.0.clone();

        let stored = tables
            .statuses
            .get(&approval_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("approval `{approval_id}`")))?;
        if stored.status != ApprovalState::Pending || stored.current_level != transition.from_level
        {
            return Err(RepositoryError::Conflict(format!(
                "approval `{approval_id}` is no longer pending at level {}",
                transition.from_level
            )));
        }

        let steps = tables
            .steps
            .get_mut(&approval_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("steps for `{approval_id}`")))?;
        let slot = steps
            .iter_mut()
            .find(|step| step.id == transition.step.id && step.action.is_none())
            .ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "step `{}` was already actioned or does not exist",
                    transition.step.id.0
                ))
            })?;
        *slot = transition.step.clone();

        tables.statuses.insert(approval_id, transition.status.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, BeneficiaryRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<BeneficiaryRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: BeneficiaryRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list(
        &self,
        filter: &RequestFilter,
        limit: u32,
    ) -> Result<Vec<BeneficiaryRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<BeneficiaryRequest> =
            requests.values().filter(|request| filter.matches(request)).cloned().collect();
        listed.sort_by(|left, right| {
            left.status
                .is_terminal()
                .cmp(&right.status.is_terminal())
                .then_with(|| left.sla_due_at.is_none().cmp(&right.sla_due_at.is_none()))
                .then_with(|| left.sla_due_at.cmp(&right.sla_due_at))
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        listed.truncate(limit as usize);
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryBeneficiaryRepository {
    beneficiaries: RwLock<HashMap<String, Beneficiary>>,
}

#[async_trait::async_trait]
impl BeneficiaryRepository for InMemoryBeneficiaryRepository {
    async fn find_by_id(&self, id: &BeneficiaryId) -> Result<Option<Beneficiary>, RepositoryError> {
        let beneficiaries = self.beneficiaries.read().await;
        Ok(beneficiaries.get(&id.0).cloned())
    }

    async fn save(&self, beneficiary: Beneficiary) -> Result<(), RepositoryError> {
        let mut beneficiaries = self.beneficiaries.write().await;
        beneficiaries.insert(beneficiary.id.0.clone(), beneficiary);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Beneficiary>, RepositoryError> {
        let beneficiaries = self.beneficiaries.read().await;
        let mut active: Vec<Beneficiary> =
            beneficiaries.values().filter(|beneficiary| beneficiary.active).cloned().collect();
        active.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if !events.iter().any(|existing| existing.event_id == event.event_id) {
            events.push(event);
        }
        Ok(())
    }

    async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| {
                event.entity_type.as_deref() == Some(entity_type)
                    && event.entity_id.as_deref() == Some(entity_id)
            })
            .cloned()
            .collect())
    }
}
