//! Proportional payout planning.
//!
//! The planner is pure: it turns a balance and a stake snapshot into a set of
//! payouts whose sum (plus the treasury share, if any) is exactly the balance.
//! Moving the funds is the contract's job.

use soroban_sdk::{contracttype, Address, Env, Vec};

use crate::{Beneficiary, StakeError};

/// Denominator used when dividing the fund.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DistributionBasis {
    /// Divide by the aggregate stake; the whole balance goes to beneficiaries
    /// and the truncation residual is added to the last beneficiary.
    Aggregate = 0,
    /// Divide by the capacity; unallocated capacity and the truncation
    /// residual are paid to the treasury.
    Capacity = 1,
}

/// Result of planning a distribution.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct PayoutPlan {
    /// Balance being distributed. Always `sum(payouts) + treasury_amount`.
    pub total: i128,
    /// Payout per beneficiary, in ledger insertion order.
    pub payouts: Vec<(Address, i128)>,
    /// Amount routed to the treasury (always 0 under `Aggregate`).
    pub treasury_amount: i128,
}

/// `floor(amount * stake / denominator)` without forming the full product.
///
/// Requires `amount >= 0`, `denominator > 0` and `stake <= denominator <= MAX_CAPACITY`,
/// which keeps `(amount % denominator) * stake` below `10^36`.
pub fn pro_rata(amount: i128, stake: u64, denominator: u64) -> i128 {
    let stake = stake as i128;
    let denominator = denominator as i128;
    (amount / denominator) * stake + (amount % denominator) * stake / denominator
}

/// Plan how `balance` is split across `beneficiaries`.
pub fn plan_distribution(
    env: &Env,
    balance: i128,
    beneficiaries: &Vec<Beneficiary>,
    aggregate: u64,
    capacity: u64,
    basis: DistributionBasis,
) -> Result<PayoutPlan, StakeError> {
    if balance <= 0 {
        return Err(StakeError::NothingToDistribute);
    }
    if beneficiaries.is_empty() || aggregate == 0 {
        return Err(StakeError::NoBeneficiaries);
    }

    let denominator = match basis {
        DistributionBasis::Aggregate => aggregate,
        DistributionBasis::Capacity => capacity,
    };

    let mut payouts = Vec::new(env);
    let mut paid: i128 = 0;
    for beneficiary in beneficiaries.iter() {
        let amount = pro_rata(balance, beneficiary.stake_units, denominator);
        paid += amount;
        payouts.push_back((beneficiary.identity, amount));
    }

    let residual = balance - paid;
    let mut treasury_amount = 0;
    match basis {
        DistributionBasis::Aggregate => {
            if residual > 0 {
                if let Some((identity, amount)) = payouts.last() {
                    payouts.set(payouts.len() - 1, (identity, amount + residual));
                }
            }
        }
        DistributionBasis::Capacity => treasury_amount = residual,
    }

    Ok(PayoutPlan {
        total: balance,
        payouts,
        treasury_amount,
    })
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use soroban_sdk::testutils::Address as _;

    fn ledger(env: &Env, stakes: &[u64]) -> Vec<Beneficiary> {
        let mut out = Vec::new(env);
        for stake in stakes {
            out.push_back(Beneficiary {
                identity: Address::generate(env),
                stake_units: *stake,
            });
        }
        out
    }

    fn amounts(plan: &PayoutPlan) -> std::vec::Vec<i128> {
        plan.payouts.iter().map(|(_, amount)| amount).collect()
    }

    #[test]
    fn pro_rata_matches_naive_formula() {
        assert_eq!(pro_rata(1_000, 1, 3), 333);
        assert_eq!(pro_rata(1_000, 500_000_000, 1_000_000_000), 500);
        assert_eq!(pro_rata(7, 3, 3), 7);
        assert_eq!(pro_rata(0, 5, 9), 0);
    }

    #[test]
    fn pro_rata_does_not_overflow_at_extremes() {
        let max_cap = crate::MAX_CAPACITY;
        assert_eq!(pro_rata(i128::MAX, max_cap, max_cap), i128::MAX);
        let half = pro_rata(i128::MAX, max_cap / 2, max_cap);
        assert_eq!(half, i128::MAX / 2);
    }

    #[test]
    fn even_split() {
        let env = Env::default();
        let bens = ledger(&env, &[500_000_000, 500_000_000]);
        let plan = plan_distribution(
            &env,
            1_000,
            &bens,
            1_000_000_000,
            1_000_000_000,
            DistributionBasis::Aggregate,
        )
        .unwrap();
        assert_eq!(amounts(&plan), [500, 500]);
        assert_eq!(plan.total, 1_000);
        assert_eq!(plan.treasury_amount, 0);
    }

    #[test]
    fn residual_goes_to_last_beneficiary() {
        let env = Env::default();
        let bens = ledger(&env, &[1, 1, 1]);
        let plan =
            plan_distribution(&env, 1_000, &bens, 3, 1_000_000_000, DistributionBasis::Aggregate)
                .unwrap();
        assert_eq!(amounts(&plan), [333, 333, 334]);
        assert_eq!(amounts(&plan).iter().sum::<i128>(), 1_000);
    }

    #[test]
    fn capacity_basis_routes_remainder_to_treasury() {
        let env = Env::default();
        let bens = ledger(&env, &[500_000_000]);
        let plan = plan_distribution(
            &env,
            1_000,
            &bens,
            500_000_000,
            1_000_000_000,
            DistributionBasis::Capacity,
        )
        .unwrap();
        assert_eq!(amounts(&plan), [500]);
        assert_eq!(plan.treasury_amount, 500);
    }

    #[test]
    fn capacity_basis_treasury_collects_truncation() {
        let env = Env::default();
        let bens = ledger(&env, &[1, 1, 1]);
        let plan =
            plan_distribution(&env, 1_000, &bens, 3, 3, DistributionBasis::Capacity).unwrap();
        assert_eq!(amounts(&plan), [333, 333, 333]);
        assert_eq!(plan.treasury_amount, 1);
    }

    #[test]
    fn rejects_empty_balance_and_empty_ledger() {
        let env = Env::default();
        let bens = ledger(&env, &[10]);
        assert_eq!(
            plan_distribution(&env, 0, &bens, 10, 100, DistributionBasis::Aggregate),
            Err(StakeError::NothingToDistribute)
        );
        let empty = Vec::new(&env);
        assert_eq!(
            plan_distribution(&env, 5, &empty, 0, 100, DistributionBasis::Aggregate),
            Err(StakeError::NoBeneficiaries)
        );
    }

    #[test]
    fn dust_balance_lands_on_last() {
        let env = Env::default();
        let bens = ledger(&env, &[1, 1, 1, 1]);
        let plan =
            plan_distribution(&env, 3, &bens, 4, 100, DistributionBasis::Aggregate).unwrap();
        assert_eq!(amounts(&plan), [0, 0, 0, 3]);
    }
}
