use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::display;
use crate::domain::approval::EntityType;
use crate::domain::beneficiary::BeneficiaryId;
use crate::errors::DomainError;
use crate::sla::SlaPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    General,
    Loan,
    EmergencyAid,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Loan => "loan",
            Self::EmergencyAid => "emergency_aid",
        }
    }

    /// Entity type used when the request is routed for approval.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Self::General => None,
            Self::Loan => Some(EntityType::Loan),
            Self::EmergencyAid => Some(EntityType::EmergencyAid),
        }
    }
}

impl FromStr for RequestKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "general" => Ok(Self::General),
            "loan" => Ok(Self::Loan),
            "emergency_aid" | "emergency" => Ok(Self::EmergencyAid),
            _ => Err(DomainError::UnknownValue { kind: "request kind", value: value.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const TERMINAL: [Self; 4] = [Self::Approved, Self::Rejected, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses never carry an SLA.
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Parses either the storage key or any Arabic label from the display table.
    pub fn parse(raw: &str) -> Option<Self> {
        display::request_status_from_label(raw)
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::UnknownValue {
            kind: "request status",
            value: value.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        display::priority_from_label(raw)
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| DomainError::UnknownValue { kind: "priority", value: value.to_string() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryRequest {
    pub id: RequestId,
    pub beneficiary_id: BeneficiaryId,
    pub kind: RequestKind,
    pub title: String,
    pub amount: Option<Decimal>,
    pub status: RequestStatus,
    pub priority: Priority,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BeneficiaryRequest {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::{Approved, Cancelled, Completed, Pending, Rejected, UnderReview};

        matches!(
            (self.status, next),
            (Pending, UnderReview)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (Approved, Completed)
                | (Pending, Cancelled)
                | (UnderReview, Cancelled)
        )
    }

    pub fn transition_to(
        &mut self,
        next: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidRequestTransition { from: self.status, to: next })
    }
}

/// Input for opening a new beneficiary request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIntake {
    pub beneficiary_id: BeneficiaryId,
    pub kind: RequestKind,
    pub title: String,
    pub amount: Option<Decimal>,
    pub priority: Priority,
}

impl RequestIntake {
    /// Opens the request as pending with the SLA deadline assigned from `policy`.
    pub fn open(
        self,
        policy: &SlaPolicy,
        now: DateTime<Utc>,
    ) -> Result<BeneficiaryRequest, DomainError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::InvariantViolation("request title is required".to_string()));
        }

        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(DomainError::InvariantViolation(format!(
                    "request amount must be positive, got {amount}"
                )));
            }
        }

        if matches!(self.kind, RequestKind::Loan | RequestKind::EmergencyAid)
            && self.amount.is_none()
        {
            return Err(DomainError::InvariantViolation(format!(
                "{} requests must state an amount",
                self.kind.as_str()
            )));
        }

        let sla_due_at = policy.due_at(self.priority, now)?;

        Ok(BeneficiaryRequest {
            id: RequestId(format!("REQ-{}", &Uuid::new_v4().simple().to_string()[..12])),
            beneficiary_id: self.beneficiary_id,
            kind: self.kind,
            title,
            amount: self.amount,
            status: RequestStatus::Pending,
            priority: self.priority,
            sla_due_at: Some(sla_due_at),
            created_at: now,
            updated_at: now,
        })
    }
}
