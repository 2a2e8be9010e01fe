use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::approvals::{ApprovalValidationFailure, ApprovalValidationInput, ApprovalValidator};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{
    ApprovalId, ApprovalState, ApprovalStatus, ApprovalStep, ApprovalStepId, ApprovalWorkflow,
    StepAction,
};
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub level: u32,
    pub approver_name: String,
    pub approver_role: String,
    pub action: StepAction,
    pub notes: Option<String>,
}

/// Result of actioning one step. `status` and `step` are the updated rows to persist together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTransition {
    pub from_level: u32,
    pub to_level: u32,
    pub from_state: ApprovalState,
    pub to_state: ApprovalState,
    pub status: ApprovalStatus,
    pub step: ApprovalStep,
}

impl ApprovalTransition {
    pub fn completed(&self) -> bool {
        self.to_state.is_final()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error(transparent)]
    InvalidWorkflow(#[from] DomainError),
    #[error("approval `{approval_id}` is already {state:?}")]
    AlreadyCompleted { approval_id: String, state: ApprovalState },
    #[error("level {actual} cannot be actioned while the approval waits on level {expected}")]
    OutOfOrder { expected: u32, actual: u32 },
    #[error("approval has no step at level {level}")]
    MissingStep { level: u32 },
    #[error("step at level {level} was already actioned")]
    StepAlreadyActioned { level: u32 },
    #[error("approver is not authorized: {}", .0.reason())]
    Unauthorized(ApprovalValidationFailure),
    #[error("level {level} is required and cannot be skipped")]
    RequiredLevelNotSkippable { level: u32 },
    #[error("a rejection must include notes giving the reason")]
    RejectionReasonRequired,
    #[error("approver name is required")]
    MissingApproverName,
}

impl From<ApprovalError> for ApplicationError {
    fn from(error: ApprovalError) -> Self {
        match error {
            ApprovalError::InvalidWorkflow(domain) => Self::Domain(domain),
            ApprovalError::AlreadyCompleted { .. }
            | ApprovalError::OutOfOrder { .. }
            | ApprovalError::StepAlreadyActioned { .. } => Self::Conflict(error.to_string()),
            ApprovalError::Unauthorized(_) => Self::Forbidden(error.to_string()),
            ApprovalError::MissingStep { .. }
            | ApprovalError::RequiredLevelNotSkippable { .. }
            | ApprovalError::RejectionReasonRequired
            | ApprovalError::MissingApproverName => {
                Self::Domain(DomainError::InvariantViolation(error.to_string()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProgress {
    pub actioned_levels: u32,
    pub total_levels: u32,
    pub remaining_required: u32,
    pub percent_complete: u8,
    pub current_role: Option<String>,
}

impl ApprovalProgress {
    pub fn of(status: &ApprovalStatus, steps: &[ApprovalStep]) -> Self {
        let own_steps: Vec<&ApprovalStep> =
            steps.iter().filter(|step| step.approval_id == status.id).collect();
        let actioned_levels = own_steps.iter().filter(|step| step.is_actioned()).count() as u32;
        let remaining_required = if status.status.is_final() {
            0
        } else {
            own_steps.iter().filter(|step| step.required && !step.is_actioned()).count() as u32
        };

        let percent_complete = match status.status {
            ApprovalState::Approved => 100,
            _ if status.total_levels == 0 => 0,
            _ => ((actioned_levels * 100) / status.total_levels).min(100) as u8,
        };

        let current_role = if status.status == ApprovalState::Pending {
            own_steps
                .iter()
                .find(|step| step.level == status.current_level)
                .map(|step| step.approver_role.clone())
        } else {
            None
        };

        Self {
            actioned_levels,
            total_levels: status.total_levels,
            remaining_required,
            percent_complete,
            current_role,
        }
    }
}

/// Starts approval runs and applies level decisions.
///
/// The engine is pure: it never mutates its inputs and returns the rows the
/// caller must persist.
#[derive(Clone, Debug)]
pub struct ApprovalEngine {
    validator: ApprovalValidator,
}

impl Default for ApprovalEngine {
    fn default() -> Self {
        Self::new(ApprovalValidator::waqf_defaults())
    }
}

impl ApprovalEngine {
    pub fn new(validator: ApprovalValidator) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &ApprovalValidator {
        &self.validator
    }

    pub fn start(
        &self,
        workflow: &ApprovalWorkflow,
        entity_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(ApprovalStatus, Vec<ApprovalStep>), ApprovalError> {
        workflow.validate()?;

        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return Err(DomainError::InvariantViolation("entity_id is required".to_string()).into());
        }
        if amount < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "approval amount must not be negative, got {amount}"
            ))
            .into());
        }

        let levels = workflow.ordered_levels();
        if let Some(unknown) = levels.iter().find(|level| !self.validator.knows_role(&level.approver_role))
        {
            return Err(DomainError::InvariantViolation(format!(
                "workflow `{}` level {} requires unknown role `{}`",
                workflow.id.0, unknown.level, unknown.approver_role
            ))
            .into());
        }

        let approval_id = ApprovalId(format!("APR-{}", &Uuid::new_v4().simple().to_string()[..12]));
        let steps: Vec<ApprovalStep> = levels
            .iter()
            .map(|level| ApprovalStep {
                id: ApprovalStepId(format!("{}-L{}", approval_id.0, level.level)),
                approval_id: approval_id.clone(),
                level: level.level,
                approver_role: level.approver_role.clone(),
                required: level.required,
                approver_name: None,
                action: None,
                actioned_at: None,
                notes: None,
            })
            .collect();

        let current_level = levels.first().map(|level| level.level).unwrap_or(1);
        let status = ApprovalStatus {
            id: approval_id,
            workflow_id: workflow.id.clone(),
            entity_type: workflow.entity_type,
            entity_id: entity_id.to_string(),
            amount,
            status: ApprovalState::Pending,
            current_level,
            total_levels: steps.len() as u32,
            started_at: now,
            completed_at: None,
        };

        Ok((status, steps))
    }

    pub fn start_with_audit<S>(
        &self,
        workflow: &ApprovalWorkflow,
        entity_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<(ApprovalStatus, Vec<ApprovalStep>), ApprovalError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.start(workflow, entity_id, amount, now);
        match &result {
            Ok((status, _)) => sink.emit(
                AuditEvent::new(
                    audit,
                    "approval.started",
                    AuditCategory::Approval,
                    AuditOutcome::Success,
                )
                .for_entity(status.entity_type.as_str(), status.entity_id.clone())
                .with_metadata("approval_id", status.id.0.clone())
                .with_metadata("workflow_id", workflow.id.0.clone())
                .with_metadata("total_levels", status.total_levels.to_string()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    audit,
                    "approval.start_rejected",
                    AuditCategory::Approval,
                    AuditOutcome::Rejected,
                )
                .for_entity(workflow.entity_type.as_str(), entity_id)
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    pub fn act(
        &self,
        status: &ApprovalStatus,
        steps: &[ApprovalStep],
        decision: &ApprovalDecision,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, ApprovalError> {
        if status.status.is_final() {
            return Err(ApprovalError::AlreadyCompleted {
                approval_id: status.id.0.clone(),
                state: status.status,
            });
        }

        let approver_name = decision.approver_name.trim();
        if approver_name.is_empty() {
            return Err(ApprovalError::MissingApproverName);
        }

        if decision.level != status.current_level {
            return Err(ApprovalError::OutOfOrder {
                expected: status.current_level,
                actual: decision.level,
            });
        }

        let own_steps: Vec<&ApprovalStep> =
            steps.iter().filter(|step| step.approval_id == status.id).collect();
        let Some(current) = own_steps.iter().find(|step| step.level == decision.level) else {
            return Err(ApprovalError::MissingStep { level: decision.level });
        };
        if current.is_actioned() {
            return Err(ApprovalError::StepAlreadyActioned { level: current.level });
        }

        let validation = self.validator.validate(&ApprovalValidationInput {
            approver_name: approver_name.to_string(),
            approver_role: decision.approver_role.clone(),
            required_role: current.approver_role.clone(),
            amount: status.amount,
            entity_type: status.entity_type,
        });
        if let Some(failure) = validation.failure {
            return Err(ApprovalError::Unauthorized(failure));
        }

        let notes = decision
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(str::to_string);

        let next_level = own_steps
            .iter()
            .map(|step| step.level)
            .filter(|level| *level > current.level)
            .min();

        match decision.action {
            StepAction::Rejected if notes.is_none() => {
                return Err(ApprovalError::RejectionReasonRequired);
            }
            StepAction::Skipped if current.required || next_level.is_none() => {
                return Err(ApprovalError::RequiredLevelNotSkippable { level: current.level });
            }
            _ => {}
        }

        let mut step = (*current).clone();
        step.approver_name = Some(approver_name.to_string());
        step.action = Some(decision.action);
        step.actioned_at = Some(now);
        step.notes = notes;

        let mut updated = status.clone();
        match (decision.action, next_level) {
            (StepAction::Rejected, _) => {
                updated.status = ApprovalState::Rejected;
                updated.completed_at = Some(now);
            }
            (StepAction::Approved | StepAction::Skipped, Some(level)) => {
                updated.current_level = level;
            }
            (StepAction::Approved | StepAction::Skipped, None) => {
                updated.status = ApprovalState::Approved;
                updated.completed_at = Some(now);
            }
        }

        Ok(ApprovalTransition {
            from_level: status.current_level,
            to_level: updated.current_level,
            from_state: status.status,
            to_state: updated.status,
            status: updated,
            step,
        })
    }

    pub fn act_with_audit<S>(
        &self,
        status: &ApprovalStatus,
        steps: &[ApprovalStep],
        decision: &ApprovalDecision,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ApprovalTransition, ApprovalError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.act(status, steps, decision, now);
        match &result {
            Ok(transition) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        format!("approval.step_{}", decision.action.as_str()),
                        AuditCategory::Approval,
                        AuditOutcome::Success,
                    )
                    .for_entity(status.entity_type.as_str(), status.entity_id.clone())
                    .with_metadata("approval_id", status.id.0.clone())
                    .with_metadata("from_level", transition.from_level.to_string())
                    .with_metadata("to_level", transition.to_level.to_string())
                    .with_metadata("approver_name", decision.approver_name.trim().to_string()),
                );
                if transition.completed() {
                    sink.emit(
                        AuditEvent::new(
                            audit,
                            "approval.completed",
                            AuditCategory::Approval,
                            AuditOutcome::Success,
                        )
                        .for_entity(status.entity_type.as_str(), status.entity_id.clone())
                        .with_metadata("approval_id", status.id.0.clone())
                        .with_metadata("final_state", transition.to_state.as_str()),
                    );
                }
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "approval.transition_rejected",
                        AuditCategory::Approval,
                        AuditOutcome::Rejected,
                    )
                    .for_entity(status.entity_type.as_str(), status.entity_id.clone())
                    .with_metadata("approval_id", status.id.0.clone())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
