//! Splits a distributable yield across beneficiary shares.
//!
//! Amounts are floored to cents per share and the leftover cents are handed
//! out one at a time by largest remainder, ties going to the lower
//! beneficiary id. The allocations always sum to the net amount.

use std::collections::HashSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::beneficiary::BeneficiaryId;

fn cent() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub gross: Decimal,
    /// Percent of gross kept as the nazer's fee.
    pub nazer_fee_pct: Decimal,
    /// Percent of gross retained for waqf reserves.
    pub reserve_pct: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionShare {
    pub beneficiary_id: BeneficiaryId,
    pub weight: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub beneficiary_id: BeneficiaryId,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionOutcome {
    pub gross: Decimal,
    pub nazer_fee: Decimal,
    pub reserve: Decimal,
    pub net: Decimal,
    pub allocations: Vec<Allocation>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("gross amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("{name} must be between 0 and 100, got {value}")]
    InvalidPercentage { name: &'static str, value: Decimal },
    #[error("fee and reserve together take {total}% of the gross amount")]
    DeductionsExceedGross { total: Decimal },
    #[error("at least one beneficiary share is required")]
    NoShares,
    #[error("share weight for `{beneficiary_id}` must be positive, got {weight}")]
    NonPositiveWeight { beneficiary_id: String, weight: Decimal },
    #[error("beneficiary `{0}` appears more than once")]
    DuplicateBeneficiary(String),
}

pub fn allocate(
    plan: &DistributionPlan,
    shares: &[DistributionShare],
) -> Result<DistributionOutcome, AllocationError> {
    validate(plan, shares)?;

    let gross = to_cents(plan.gross);
    let nazer_fee = to_cents(gross * plan.nazer_fee_pct / Decimal::ONE_HUNDRED);
    let reserve = to_cents(gross * plan.reserve_pct / Decimal::ONE_HUNDRED);
    let net = gross - nazer_fee - reserve;

    let total_weight: Decimal = shares.iter().map(|share| share.weight).sum();

    let mut allocations = Vec::with_capacity(shares.len());
    let mut remainders = Vec::with_capacity(shares.len());
    for (index, share) in shares.iter().enumerate() {
        let exact = net * share.weight / total_weight;
        let floored = exact.round_dp_with_strategy(2, RoundingStrategy::ToZero);
        remainders.push((index, exact - floored));
        allocations.push(Allocation { beneficiary_id: share.beneficiary_id.clone(), amount: floored });
    }

    let allocated: Decimal = allocations.iter().map(|allocation| allocation.amount).sum();
    let leftover_cents = ((net - allocated) / cent()).to_u64().unwrap_or(0) as usize;

    remainders.sort_by(|(left_index, left), (right_index, right)| {
        right
            .cmp(left)
            .then_with(|| shares[*left_index].beneficiary_id.cmp(&shares[*right_index].beneficiary_id))
    });
    for (index, _) in remainders.iter().cycle().take(leftover_cents) {
        allocations[*index].amount += cent();
    }

    Ok(DistributionOutcome { gross, nazer_fee, reserve, net, allocations })
}

fn validate(plan: &DistributionPlan, shares: &[DistributionShare]) -> Result<(), AllocationError> {
    if plan.gross < Decimal::ZERO {
        return Err(AllocationError::NegativeAmount(plan.gross));
    }

    for (name, value) in [("nazer_fee_pct", plan.nazer_fee_pct), ("reserve_pct", plan.reserve_pct)] {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(AllocationError::InvalidPercentage { name, value });
        }
    }

    let deductions = plan.nazer_fee_pct + plan.reserve_pct;
    if deductions > Decimal::ONE_HUNDRED {
        return Err(AllocationError::DeductionsExceedGross { total: deductions });
    }

    if shares.is_empty() {
        return Err(AllocationError::NoShares);
    }

    let mut seen = HashSet::new();
    for share in shares {
        if share.weight <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveWeight {
                beneficiary_id: share.beneficiary_id.0.clone(),
                weight: share.weight,
            });
        }
        if !seen.insert(&share.beneficiary_id) {
            return Err(AllocationError::DuplicateBeneficiary(share.beneficiary_id.0.clone()));
        }
    }

    Ok(())
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{allocate, AllocationError, DistributionPlan, DistributionShare};
    use crate::domain::beneficiary::BeneficiaryId;

    fn share(id: &str, weight: i64) -> DistributionShare {
        DistributionShare { beneficiary_id: BeneficiaryId(id.to_string()), weight: Decimal::new(weight, 0) }
    }

    fn plan(gross: Decimal, fee: i64, reserve: i64) -> DistributionPlan {
        DistributionPlan {
            gross,
            nazer_fee_pct: Decimal::new(fee, 0),
            reserve_pct: Decimal::new(reserve, 0),
        }
    }

    #[test]
    fn deducts_fee_and_reserve_before_splitting() {
        let outcome = allocate(
            &plan(Decimal::new(100_000, 0), 10, 5),
            &[share("BEN-1", 2), share("BEN-2", 1), share("BEN-3", 1)],
        )
        .expect("allocation");

        assert_eq!(outcome.nazer_fee, Decimal::new(10_000, 0));
        assert_eq!(outcome.reserve, Decimal::new(5_000, 0));
        assert_eq!(outcome.net, Decimal::new(85_000, 0));
        assert_eq!(outcome.allocations[0].amount, Decimal::new(42_500, 0));
        assert_eq!(outcome.allocations[1].amount, Decimal::new(21_250, 0));
        assert_eq!(outcome.allocations[2].amount, Decimal::new(21_250, 0));
    }

    #[test]
    fn leftover_cents_go_to_largest_remainder_then_lowest_id() {
        let outcome = allocate(
            &plan(Decimal::new(100, 0), 0, 0),
            &[share("BEN-C", 1), share("BEN-A", 1), share("BEN-B", 1)],
        )
        .expect("allocation");

        let amounts: Vec<(String, Decimal)> = outcome
            .allocations
            .iter()
            .map(|allocation| (allocation.beneficiary_id.0.clone(), allocation.amount))
            .collect();
        assert_eq!(
            amounts,
            vec![
                ("BEN-C".to_string(), Decimal::new(3333, 2)),
                ("BEN-A".to_string(), Decimal::new(3334, 2)),
                ("BEN-B".to_string(), Decimal::new(3333, 2)),
            ]
        );
    }

    #[test]
    fn allocations_always_sum_to_net() {
        for gross in [Decimal::new(1, 2), Decimal::new(99_999_99, 2), Decimal::new(7_777_77, 2)] {
            let outcome = allocate(
                &plan(gross, 7, 3),
                &[share("BEN-1", 3), share("BEN-2", 7), share("BEN-3", 11), share("BEN-4", 13)],
            )
            .expect("allocation");

            let total: Decimal = outcome.allocations.iter().map(|allocation| allocation.amount).sum();
            assert_eq!(total, outcome.net, "gross {gross}");
            assert_eq!(outcome.gross, outcome.net + outcome.nazer_fee + outcome.reserve);
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            allocate(&plan(Decimal::new(-1, 0), 0, 0), &[share("BEN-1", 1)]),
            Err(AllocationError::NegativeAmount(Decimal::new(-1, 0)))
        );
        assert!(matches!(
            allocate(&plan(Decimal::ONE, 101, 0), &[share("BEN-1", 1)]),
            Err(AllocationError::InvalidPercentage { name: "nazer_fee_pct", .. })
        ));
        assert!(matches!(
            allocate(&plan(Decimal::ONE, 60, 50), &[share("BEN-1", 1)]),
            Err(AllocationError::DeductionsExceedGross { .. })
        ));
        assert_eq!(allocate(&plan(Decimal::ONE, 0, 0), &[]), Err(AllocationError::NoShares));
        assert!(matches!(
            allocate(&plan(Decimal::ONE, 0, 0), &[share("BEN-1", 0)]),
            Err(AllocationError::NonPositiveWeight { .. })
        ));
        assert_eq!(
            allocate(&plan(Decimal::ONE, 0, 0), &[share("BEN-1", 1), share("BEN-1", 2)]),
            Err(AllocationError::DuplicateBeneficiary("BEN-1".to_string()))
        );
    }
}
