use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JournalEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Draft,
    PendingApproval,
    Posted,
    Reversed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Double-entry journal record. Posting requires a completed approval run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub lines: Vec<JournalLine>,
    pub status: JournalStatus,
}

impl JournalEntry {
    /// Returns the balanced total, which is also the amount used for approval routing.
    pub fn validate_balanced(&self) -> Result<Decimal, DomainError> {
        if self.lines.len() < 2 {
            return Err(self.unbalanced("at least two lines are required"));
        }

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;

        for (index, line) in self.lines.iter().enumerate() {
            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                return Err(self.unbalanced(format!("line {} has a negative amount", index + 1)));
            }

            let debit_side = line.debit > Decimal::ZERO;
            let credit_side = line.credit > Decimal::ZERO;
            if debit_side == credit_side {
                return Err(self.unbalanced(format!(
                    "line {} on account `{}` must carry exactly one of debit or credit",
                    index + 1,
                    line.account_code
                )));
            }

            total_debit += line.debit;
            total_credit += line.credit;
        }

        if total_debit != total_credit {
            return Err(self.unbalanced(format!(
                "total debit {total_debit} does not equal total credit {total_credit}"
            )));
        }

        Ok(total_debit)
    }

    fn unbalanced(&self, reason: impl Into<String>) -> DomainError {
        DomainError::UnbalancedJournal {
            entry_number: self.entry_number.clone(),
            reason: reason.into(),
        }
    }
}
