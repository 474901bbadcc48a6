#![cfg(test)]
//! Randomized operation sequences checked against a shadow model.
extern crate std;

use arbitrary::{Arbitrary, Unstructured};
use soroban_sdk::{
    testutils::{Address as _, Ledger as _},
    token, Address, Env,
};
use std::vec::Vec as StdVec;

use crate::{
    window, DistributionBasis, StakeConfig, StakeError, StakeManager, StakeManagerClient,
    StakeUpdateMode,
};

const GENESIS: u64 = 5_000;
const INTERVAL: u64 = 1_000;
const WINDOW: u64 = 300;
const CAPACITY: u64 = 10_000;
const SLOTS: usize = 6;
const SEEDS: u64 = 32;

#[derive(Arbitrary, Debug)]
enum LedgerOp {
    Add { slot: u8, stake: u32 },
    Update { slot: u8, stake: u32 },
    Remove { slot: u8 },
    Advance { secs: u32 },
}

#[derive(Arbitrary, Debug)]
struct DistributionCase {
    stakes: StdVec<u16>,
    amount: u32,
    capacity_basis: bool,
}

/// Deterministic xorshift byte stream for a seed.
fn seed_bytes(seed: u64, len: usize) -> StdVec<u8> {
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

/// Collapse a `try_` client result to the contract-level outcome.
fn outcome<T, C: core::fmt::Debug, I: core::fmt::Debug>(
    result: Result<Result<T, C>, Result<StakeError, I>>,
) -> Result<(), StakeError> {
    match result {
        Ok(Ok(_)) => Ok(()),
        Err(Ok(err)) => Err(err),
        Ok(Err(err)) => panic!("conversion failure: {:?}", err),
        Err(Err(err)) => panic!("host failure: {:?}", err),
    }
}

/// Expected ledger: (slot, stake) in insertion order.
struct Model {
    entries: StdVec<(usize, u64)>,
    mode: StakeUpdateMode,
    now: u64,
}

impl Model {
    fn total(&self) -> u64 {
        self.entries.iter().map(|(_, stake)| stake).sum()
    }

    fn position(&self, slot: usize) -> Option<usize> {
        self.entries.iter().position(|(s, _)| *s == slot)
    }

    fn window_open(&self) -> bool {
        window::window_state(GENESIS, INTERVAL, WINDOW, self.now)
            .map(|state| state.open)
            .unwrap_or(false)
    }

    fn add(&mut self, slot: usize, stake: u64) -> Result<(), StakeError> {
        if stake == 0 {
            return Err(StakeError::ZeroStake);
        }
        if !self.window_open() {
            return Err(StakeError::WindowClosed);
        }
        if self.position(slot).is_some() {
            return Err(StakeError::DuplicateBeneficiary);
        }
        if self.total() + stake > CAPACITY {
            return Err(StakeError::CapacityExceeded);
        }
        self.entries.push((slot, stake));
        Ok(())
    }

    fn update(&mut self, slot: usize, stake: u64) -> Result<(), StakeError> {
        if stake == 0 {
            return Err(StakeError::ZeroStake);
        }
        if !self.window_open() {
            return Err(StakeError::WindowClosed);
        }
        let idx = self.position(slot).ok_or(StakeError::UnknownBeneficiary)?;
        let previous = self.entries[idx].1;
        let next = match self.mode {
            StakeUpdateMode::Accumulate => previous + stake,
            StakeUpdateMode::Replace => stake,
        };
        if self.total() - previous + next > CAPACITY {
            return Err(StakeError::CapacityExceeded);
        }
        self.entries[idx].1 = next;
        Ok(())
    }

    fn remove(&mut self, slot: usize) -> Result<(), StakeError> {
        if !self.window_open() {
            return Err(StakeError::WindowClosed);
        }
        let idx = self.position(slot).ok_or(StakeError::UnknownBeneficiary)?;
        self.entries.remove(idx);
        Ok(())
    }
}

fn setup(
    mode: StakeUpdateMode,
    basis: DistributionBasis,
    capacity: u64,
) -> (Env, StakeManagerClient<'static>, Address, Address, Address) {
    let env = Env::default();
    env.mock_all_auths();
    env.budget().reset_unlimited();
    env.ledger().with_mut(|li| li.timestamp = GENESIS);
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let treasury = Address::generate(&env);
    let payout_token = env.register_stellar_asset_contract(Address::generate(&env));
    client.initialize(
        &admin,
        &treasury,
        &payout_token,
        &StakeConfig {
            capacity,
            interval_secs: INTERVAL,
            window_secs: WINDOW,
            update_mode: mode,
            basis,
        },
    );
    (env, client, admin, treasury, payout_token)
}

fn assert_ledger_matches(client: &StakeManagerClient, slots: &[Address], model: &Model) {
    let listed = client.list_beneficiaries();
    assert_eq!(listed.len() as usize, model.entries.len());
    assert_eq!(client.beneficiary_count() as usize, model.entries.len());

    let mut sum = 0u64;
    for (i, beneficiary) in listed.iter().enumerate() {
        let (slot, stake) = model.entries[i];
        assert_eq!(beneficiary.identity, slots[slot]);
        assert_eq!(beneficiary.stake_units, stake);
        assert!(beneficiary.stake_units > 0);
        assert_eq!(client.get_stake(&beneficiary.identity), stake);
        sum += beneficiary.stake_units;
    }
    assert_eq!(sum, client.total_stake());
    assert!(sum <= CAPACITY);

    for (slot, addr) in slots.iter().enumerate() {
        assert_eq!(client.is_beneficiary(addr), model.position(slot).is_some());
    }
}

#[test]
fn ledger_tracks_model_under_random_operations() {
    for seed in 0..SEEDS {
        let mode = if seed % 2 == 0 {
            StakeUpdateMode::Accumulate
        } else {
            StakeUpdateMode::Replace
        };
        let (env, client, admin, _, _) = setup(mode, DistributionBasis::Aggregate, CAPACITY);
        let slots: StdVec<Address> = (0..SLOTS).map(|_| Address::generate(&env)).collect();
        let mut model = Model {
            entries: StdVec::new(),
            mode,
            now: GENESIS,
        };

        let bytes = seed_bytes(seed, 512);
        let mut u = Unstructured::new(&bytes);
        for _ in 0..60 {
            let Ok(op) = LedgerOp::arbitrary(&mut u) else {
                break;
            };
            match op {
                LedgerOp::Add { slot, stake } => {
                    let slot = slot as usize % SLOTS;
                    let stake = u64::from(stake % 4_000);
                    let expected = model.add(slot, stake);
                    let actual = outcome(client.try_add_beneficiary(&admin, &slots[slot], &stake));
                    assert_eq!(actual, expected, "seed {seed}: add {slot} {stake}");
                }
                LedgerOp::Update { slot, stake } => {
                    let slot = slot as usize % SLOTS;
                    let stake = u64::from(stake % 4_000);
                    let expected = model.update(slot, stake);
                    let actual = outcome(client.try_update_beneficiary_stake(
                        &admin,
                        &slots[slot],
                        &stake,
                    ));
                    assert_eq!(actual, expected, "seed {seed}: update {slot} {stake}");
                }
                LedgerOp::Remove { slot } => {
                    let slot = slot as usize % SLOTS;
                    let expected = model.remove(slot);
                    let actual = outcome(client.try_remove_beneficiary(&admin, &slots[slot]));
                    assert_eq!(actual, expected, "seed {seed}: remove {slot}");
                }
                LedgerOp::Advance { secs } => {
                    model.now += u64::from(secs % 700);
                    let now = model.now;
                    env.ledger().with_mut(|li| li.timestamp = now);
                    assert_eq!(client.is_window_open(), model.window_open());
                }
            }
            assert_ledger_matches(&client, &slots, &model);
        }
    }
}

#[test]
fn distribution_conserves_funds() {
    const CASE_CAPACITY: u64 = 1_000_000;

    for seed in 0..SEEDS {
        let bytes = seed_bytes(seed + 1_000, 128);
        let mut u = Unstructured::new(&bytes);
        let Ok(case) = DistributionCase::arbitrary(&mut u) else {
            continue;
        };
        let stakes: StdVec<u64> = case
            .stakes
            .iter()
            .take(8)
            .map(|s| u64::from(*s % 1_000) + 1)
            .collect();
        if stakes.is_empty() {
            continue;
        }
        let amount = i128::from(case.amount % 1_000_000) + 1;
        let basis = if case.capacity_basis {
            DistributionBasis::Capacity
        } else {
            DistributionBasis::Aggregate
        };

        let (env, client, admin, treasury, payout_token) =
            setup(StakeUpdateMode::Accumulate, basis, CASE_CAPACITY);
        let identities: StdVec<Address> = stakes
            .iter()
            .map(|stake| {
                let identity = Address::generate(&env);
                client.add_beneficiary(&admin, &identity, stake);
                identity
            })
            .collect();
        token::StellarAssetClient::new(&env, &payout_token)
            .mint(&client.address, &amount);

        assert_eq!(client.distribute_funds(), amount);

        let tok = token::Client::new(&env, &payout_token);
        let aggregate: u64 = stakes.iter().sum();
        let denominator = match basis {
            DistributionBasis::Aggregate => aggregate,
            DistributionBasis::Capacity => CASE_CAPACITY,
        };
        let received: StdVec<i128> = identities.iter().map(|id| tok.balance(id)).collect();
        let last = received.len() - 1;
        for (i, (stake, got)) in stakes.iter().zip(received.iter()).enumerate() {
            let floor = amount * i128::from(*stake) / i128::from(denominator);
            if i == last && basis == DistributionBasis::Aggregate {
                assert!(*got >= floor, "seed {seed}: last payout below its share");
            } else {
                assert_eq!(*got, floor, "seed {seed}: payout {i}");
            }
        }

        let paid: i128 = received.iter().sum();
        let to_treasury = tok.balance(&treasury);
        assert_eq!(paid + to_treasury, amount, "seed {seed}: funds not conserved");
        if basis == DistributionBasis::Aggregate {
            assert_eq!(to_treasury, 0);
        }
        assert_eq!(client.contract_balance(), 0);
    }
}
