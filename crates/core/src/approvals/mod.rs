pub mod engine;

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalWorkflow, EntityType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAuthority {
    pub role: String,
    pub role_rank: u8,
    /// `None` means no amount ceiling.
    pub max_amount: Option<Decimal>,
    /// Empty means every entity type.
    pub allowed_entity_types: Vec<EntityType>,
}

impl ApproverAuthority {
    fn allows_entity_type(&self, entity_type: EntityType) -> bool {
        self.allowed_entity_types.is_empty() || self.allowed_entity_types.contains(&entity_type)
    }

    fn allows_amount(&self, amount: Decimal) -> bool {
        self.max_amount.map_or(true, |max_amount| amount <= max_amount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValidationInput {
    pub approver_name: String,
    pub approver_role: String,
    pub required_role: String,
    pub amount: Decimal,
    pub entity_type: EntityType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalValidationFailure {
    UnknownApproverRole { approver_role: String },
    UnknownRequiredRole { required_role: String },
    InsufficientRoleAuthority { approver_role: String, required_role: String },
    AmountLimitExceeded { approver_role: String, amount: Decimal, max_amount: Decimal },
    EntityTypeNotAllowed { approver_role: String, entity_type: EntityType },
}

impl ApprovalValidationFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::UnknownApproverRole { approver_role } => {
                format!("unknown approver role `{approver_role}`")
            }
            Self::UnknownRequiredRole { required_role } => {
                format!("unknown required role `{required_role}`")
            }
            Self::InsufficientRoleAuthority { approver_role, required_role } => {
                format!(
                    "approver role `{approver_role}` does not satisfy required role `{required_role}`"
                )
            }
            Self::AmountLimitExceeded { approver_role, amount, max_amount } => {
                format!("amount {amount} exceeds `{approver_role}` limit {max_amount}")
            }
            Self::EntityTypeNotAllowed { approver_role, entity_type } => {
                format!(
                    "approver role `{approver_role}` cannot approve `{}` records",
                    entity_type.as_str()
                )
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<ApprovalValidationFailure>,
}

impl ApprovalValidationResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: ApprovalValidationFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Checks that an approver's role may action a level that requires another role.
#[derive(Clone, Debug, Default)]
pub struct ApprovalValidator {
    authorities: HashMap<String, ApproverAuthority>,
}

impl ApprovalValidator {
    pub fn new(authorities: Vec<ApproverAuthority>) -> Self {
        let authorities = authorities
            .into_iter()
            .map(|authority| (normalize_key(&authority.role), authority))
            .collect();

        Self { authorities }
    }

    /// Role ladder used by the waqf office: accountant, financial manager, nazer, board.
    pub fn waqf_defaults() -> Self {
        Self::new(vec![
            ApproverAuthority {
                role: "accountant".to_string(),
                role_rank: 1,
                max_amount: Some(Decimal::new(50_000, 0)),
                allowed_entity_types: vec![EntityType::JournalEntry, EntityType::Payment],
            },
            ApproverAuthority {
                role: "financial_manager".to_string(),
                role_rank: 2,
                max_amount: Some(Decimal::new(250_000, 0)),
                allowed_entity_types: Vec::new(),
            },
            ApproverAuthority {
                role: "nazer".to_string(),
                role_rank: 3,
                max_amount: None,
                allowed_entity_types: Vec::new(),
            },
            ApproverAuthority {
                role: "board".to_string(),
                role_rank: 4,
                max_amount: None,
                allowed_entity_types: Vec::new(),
            },
        ])
    }

    pub fn knows_role(&self, role: &str) -> bool {
        self.authorities.contains_key(&normalize_key(role))
    }

    pub fn validate(&self, input: &ApprovalValidationInput) -> ApprovalValidationResult {
        let approver_key = normalize_key(&input.approver_role);
        let required_key = normalize_key(&input.required_role);

        let Some(approver_authority) = self.authorities.get(&approver_key) else {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::UnknownApproverRole {
                    approver_role: input.approver_role.clone(),
                },
            );
        };

        let Some(required_authority) = self.authorities.get(&required_key) else {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::UnknownRequiredRole {
                    required_role: input.required_role.clone(),
                },
            );
        };

        if approver_authority.role_rank < required_authority.role_rank {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::InsufficientRoleAuthority {
                    approver_role: input.approver_role.clone(),
                    required_role: input.required_role.clone(),
                },
            );
        }

        if !approver_authority.allows_amount(input.amount) {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::AmountLimitExceeded {
                    approver_role: input.approver_role.clone(),
                    amount: input.amount,
                    max_amount: approver_authority.max_amount.unwrap_or_default(),
                },
            );
        }

        if !approver_authority.allows_entity_type(input.entity_type) {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::EntityTypeNotAllowed {
                    approver_role: input.approver_role.clone(),
                    entity_type: input.entity_type,
                },
            );
        }

        ApprovalValidationResult::allow(format!(
            "approver `{}` is authorized for `{}` on {} {}",
            input.approver_name,
            input.required_role,
            input.entity_type.as_str(),
            input.amount
        ))
    }
}

/// Active workflow definitions, queried when an entity is submitted.
#[derive(Clone, Debug, Default)]
pub struct WorkflowCatalog {
    workflows: Vec<ApprovalWorkflow>,
}

impl WorkflowCatalog {
    pub fn new(workflows: Vec<ApprovalWorkflow>) -> Self {
        Self { workflows }
    }

    pub fn workflows(&self) -> &[ApprovalWorkflow] {
        &self.workflows
    }

    /// Picks the workflow for a submission, or `None` when no approval is needed.
    ///
    /// Among matching active workflows the one with more amount bounds wins,
    /// then the lowest id.
    pub fn select(&self, entity_type: EntityType, amount: Decimal) -> Option<&ApprovalWorkflow> {
        let mut matches: Vec<&ApprovalWorkflow> = self
            .workflows
            .iter()
            .filter(|workflow| workflow.active)
            .filter(|workflow| workflow.entity_type == entity_type)
            .filter(|workflow| workflow.conditions.contains(amount))
            .collect();

        matches.sort_by(|left, right| {
            right
                .conditions
                .specificity()
                .cmp(&left.conditions.specificity())
                .then_with(|| left.id.0.cmp(&right.id.0))
        });
        matches.into_iter().next()
    }
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
