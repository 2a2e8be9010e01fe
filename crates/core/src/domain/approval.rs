use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalStepId(pub String);

/// Kinds of records that can be routed through a multi-level approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    JournalEntry,
    Distribution,
    Payment,
    Loan,
    EmergencyAid,
}

impl EntityType {
    pub const ALL: [EntityType; 5] =
        [Self::JournalEntry, Self::Distribution, Self::Payment, Self::Loan, Self::EmergencyAid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JournalEntry => "journal_entry",
            Self::Distribution => "distribution",
            Self::Payment => "payment",
            Self::Loan => "loan",
            Self::EmergencyAid => "emergency_aid",
        }
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|entity| entity.as_str() == key).ok_or_else(|| {
            DomainError::UnknownValue { kind: "entity type", value: value.to_string() }
        })
    }
}

/// Aggregate state of an approval run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for ApprovalState {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(DomainError::UnknownValue { kind: "approval state", value: value.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Approved,
    Rejected,
    Skipped,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }
}

impl FromStr for StepAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            "skipped" | "skip" => Ok(Self::Skipped),
            _ => Err(DomainError::UnknownValue { kind: "step action", value: value.to_string() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub level: u32,
    pub approver_role: String,
    pub required: bool,
}

/// Trigger bounds on the entity amount. Both bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConditions {
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

impl WorkflowConditions {
    pub fn contains(&self, amount: Decimal) -> bool {
        if let Some(min_amount) = self.min_amount {
            if amount < min_amount {
                return false;
            }
        }

        if let Some(max_amount) = self.max_amount {
            if amount > max_amount {
                return false;
            }
        }

        true
    }

    pub fn specificity(&self) -> usize {
        usize::from(self.min_amount.is_some()) + usize::from(self.max_amount.is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: WorkflowId,
    pub name: String,
    pub entity_type: EntityType,
    pub levels: Vec<ApprovalLevel>,
    pub conditions: WorkflowConditions,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.levels.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "workflow `{}` must define at least one approval level",
                self.id.0
            )));
        }

        let mut seen = HashSet::new();
        for level in &self.levels {
            if level.level == 0 {
                return Err(DomainError::InvariantViolation(format!(
                    "workflow `{}` has a level numbered 0; levels start at 1",
                    self.id.0
                )));
            }
            if !seen.insert(level.level) {
                return Err(DomainError::InvariantViolation(format!(
                    "workflow `{}` defines level {} more than once",
                    self.id.0, level.level
                )));
            }
            if level.approver_role.trim().is_empty() {
                return Err(DomainError::InvariantViolation(format!(
                    "workflow `{}` level {} has no approver role",
                    self.id.0, level.level
                )));
            }
        }

        let last_required = self.ordered_levels().last().map(|level| level.required);
        if last_required != Some(true) {
            return Err(DomainError::InvariantViolation(format!(
                "workflow `{}` must end with a required level",
                self.id.0
            )));
        }

        if let (Some(min_amount), Some(max_amount)) =
            (self.conditions.min_amount, self.conditions.max_amount)
        {
            if min_amount > max_amount {
                return Err(DomainError::InvariantViolation(format!(
                    "workflow `{}` has min_amount {min_amount} above max_amount {max_amount}",
                    self.id.0
                )));
            }
        }

        Ok(())
    }

    /// Levels sorted ascending by level number.
    pub fn ordered_levels(&self) -> Vec<&ApprovalLevel> {
        let mut levels: Vec<&ApprovalLevel> = self.levels.iter().collect();
        levels.sort_by_key(|level| level.level);
        levels
    }
}

/// One approval run for a submitted entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub id: ApprovalId,
    pub workflow_id: WorkflowId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub amount: Decimal,
    pub status: ApprovalState,
    pub current_level: u32,
    pub total_levels: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub approval_id: ApprovalId,
    pub level: u32,
    pub approver_role: String,
    pub required: bool,
    pub approver_name: Option<String>,
    pub action: Option<StepAction>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ApprovalStep {
    pub fn is_actioned(&self) -> bool {
        self.action.is_some()
    }
}
