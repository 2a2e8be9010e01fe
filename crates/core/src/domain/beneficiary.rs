use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeneficiaryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: BeneficiaryId,
    pub full_name: String,
    pub national_id: String,
    pub category: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Beneficiary {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.full_name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "beneficiary full_name is required".to_string(),
            ));
        }

        let national_id = self.national_id.trim();
        if national_id.len() != 10 || !national_id.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(DomainError::InvariantViolation(format!(
                "beneficiary national_id `{national_id}` must be 10 digits"
            )));
        }

        Ok(())
    }
}
