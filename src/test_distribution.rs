#![cfg(test)]
extern crate std;

use soroban_sdk::{
    symbol_short,
    testutils::{Address as _, Events as _, Ledger as _},
    token, Address, Env, FromVal, IntoVal, Val, Vec,
};

use crate::{
    DistributionBasis, StakeConfig, StakeError, StakeManager, StakeManagerClient,
    StakeUpdateMode, DEFAULT_CAPACITY, DEFAULT_INTERVAL_SECS, DEFAULT_WINDOW_SECS,
};

const GENESIS: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

/// Token whose transfers can be made to fail per recipient.
mod rejecting_token {
    use soroban_sdk::{contract, contracterror, contractimpl, contracttype, Address, Env};

    #[contracterror]
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(u32)]
    pub enum MockTokenError {
        Rejected = 1,
        Insufficient = 2,
    }

    #[contracttype]
    pub enum Key {
        Balance(Address),
        Rejected(Address),
    }

    #[contract]
    pub struct RejectingToken;

    #[contractimpl]
    impl RejectingToken {
        pub fn mint(env: Env, to: Address, amount: i128) {
            let balance = Self::balance(env.clone(), to.clone());
            env.storage()
                .persistent()
                .set(&Key::Balance(to), &(balance + amount));
        }

        pub fn set_rejected(env: Env, who: Address, rejected: bool) {
            env.storage()
                .persistent()
                .set(&Key::Rejected(who), &rejected);
        }

        pub fn balance(env: Env, id: Address) -> i128 {
            env.storage()
                .persistent()
                .get(&Key::Balance(id))
                .unwrap_or(0)
        }

        pub fn transfer(
            env: Env,
            from: Address,
            to: Address,
            amount: i128,
        ) -> Result<(), MockTokenError> {
            from.require_auth();
            let rejected: bool = env
                .storage()
                .persistent()
                .get(&Key::Rejected(to.clone()))
                .unwrap_or(false);
            if rejected {
                return Err(MockTokenError::Rejected);
            }
            let from_balance = Self::balance(env.clone(), from.clone());
            if from_balance < amount {
                return Err(MockTokenError::Insufficient);
            }
            let to_balance = Self::balance(env.clone(), to.clone());
            let store = env.storage().persistent();
            store.set(&Key::Balance(from), &(from_balance - amount));
            store.set(&Key::Balance(to), &(to_balance + amount));
            Ok(())
        }
    }
}

use rejecting_token::{RejectingToken, RejectingTokenClient};

// ── helpers ───────────────────────────────────────────────────

struct Fixture {
    env: Env,
    client: StakeManagerClient<'static>,
    admin: Address,
    treasury: Address,
    payout_token: Address,
}

impl Fixture {
    fn token(&self) -> token::Client<'static> {
        token::Client::new(&self.env, &self.payout_token)
    }

    /// Mint `amount` to a fresh funder and deposit it into the contract.
    fn fund(&self, amount: i128) -> Address {
        let funder = Address::generate(&self.env);
        token::StellarAssetClient::new(&self.env, &self.payout_token).mint(&funder, &amount);
        self.client.deposit(&funder, &amount);
        funder
    }

    fn add(&self, stake_units: u64) -> Address {
        let identity = Address::generate(&self.env);
        self.client.add_beneficiary(&self.admin, &identity, &stake_units);
        identity
    }

    fn balance(&self, id: &Address) -> i128 {
        self.token().balance(id)
    }
}

fn config(basis: DistributionBasis) -> StakeConfig {
    StakeConfig {
        capacity: DEFAULT_CAPACITY,
        interval_secs: DEFAULT_INTERVAL_SECS,
        window_secs: DEFAULT_WINDOW_SECS,
        update_mode: StakeUpdateMode::Accumulate,
        basis,
    }
}

fn setup_with(cfg: StakeConfig) -> Fixture {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = GENESIS);
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let treasury = Address::generate(&env);
    let payout_token = env.register_stellar_asset_contract(Address::generate(&env));
    client.initialize(&admin, &treasury, &payout_token, &cfg);
    Fixture {
        env,
        client,
        admin,
        treasury,
        payout_token,
    }
}

fn setup() -> Fixture {
    setup_with(config(DistributionBasis::Aggregate))
}

fn warp(env: &Env, elapsed: u64) {
    env.ledger().with_mut(|li| li.timestamp = GENESIS + elapsed);
}

fn last_event(env: &Env) -> (Address, Vec<Val>, Val) {
    env.events().all().last().unwrap()
}

// ── deposit ───────────────────────────────────────────────────

#[test]
fn deposit_moves_tokens_into_contract() {
    let f = setup();
    let funder = f.fund(1_000);

    assert_eq!(f.client.contract_balance(), 1_000);
    assert_eq!(f.balance(&funder), 0);
}

#[test]
fn deposit_emits_event() {
    let f = setup();
    let funder = f.fund(250);

    let (_, topics, data) = last_event(&f.env);
    let expected: Vec<Val> = (symbol_short!("funds_rcv"), funder).into_val(&f.env);
    assert_eq!(topics, expected);
    assert_eq!(i128::from_val(&f.env, &data), 250);
}

#[test]
fn deposit_rejects_non_positive_amount() {
    let f = setup();
    let funder = Address::generate(&f.env);
    assert_eq!(
        f.client.try_deposit(&funder, &0),
        Err(Ok(StakeError::InvalidAmount))
    );
    assert_eq!(
        f.client.try_deposit(&funder, &-5),
        Err(Ok(StakeError::InvalidAmount))
    );
}

#[test]
fn deposit_before_initialize_fails() {
    let env = Env::default();
    env.mock_all_auths();
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let funder = Address::generate(&env);

    assert_eq!(
        client.try_deposit(&funder, &10),
        Err(Ok(StakeError::NotInitialized))
    );
    assert_eq!(client.contract_balance(), 0);
    assert_eq!(
        client.try_distribute_funds(),
        Err(Ok(StakeError::NotInitialized))
    );
}

#[test]
fn deposit_accepted_outside_window() {
    let f = setup();
    warp(&f.env, 20 * DAY);
    assert!(!f.client.is_window_open());
    f.fund(100);
    assert_eq!(f.client.contract_balance(), 100);
}

// ── proportional split ────────────────────────────────────────

#[test]
fn even_split_drains_fund() {
    let f = setup();
    let alice = f.add(500_000_000);
    let bob = f.add(500_000_000);
    f.fund(1_000);

    assert_eq!(f.client.distribute_funds(), 1_000);
    assert_eq!(f.balance(&alice), 500);
    assert_eq!(f.balance(&bob), 500);
    assert_eq!(f.client.contract_balance(), 0);
}

#[test]
fn single_beneficiary_takes_everything_under_aggregate_basis() {
    let f = setup();
    let alice = f.add(500_000_000);
    f.fund(1_000);

    assert_eq!(f.client.distribute_funds(), 1_000);
    assert_eq!(f.balance(&alice), 1_000);
    assert_eq!(f.balance(&f.treasury), 0);
}

#[test]
fn truncation_residual_goes_to_last_beneficiary() {
    let f = setup();
    let a = f.add(1);
    let b = f.add(1);
    let c = f.add(1);
    f.fund(1_000);

    f.client.distribute_funds();
    assert_eq!(f.balance(&a), 333);
    assert_eq!(f.balance(&b), 333);
    assert_eq!(f.balance(&c), 334);
    assert_eq!(f.client.contract_balance(), 0);
}

#[test]
fn payouts_follow_stake_weights() {
    let f = setup();
    let a = f.add(100_000_000);
    let b = f.add(300_000_000);
    f.fund(4_000);

    f.client.distribute_funds();
    assert_eq!(f.balance(&a), 1_000);
    assert_eq!(f.balance(&b), 3_000);
}

#[test]
fn removed_beneficiary_receives_nothing() {
    let f = setup();
    let alice = f.add(10);
    let bob = f.add(10);
    f.client.remove_beneficiary(&f.admin, &alice);
    f.fund(90);

    f.client.distribute_funds();
    assert_eq!(f.balance(&alice), 0);
    assert_eq!(f.balance(&bob), 90);
}

#[test]
fn capacity_basis_pays_unallocated_share_to_treasury() {
    let f = setup_with(config(DistributionBasis::Capacity));
    let alice = f.add(500_000_000);
    f.fund(1_000);

    assert_eq!(f.client.distribute_funds(), 1_000);
    assert_eq!(f.balance(&alice), 500);
    assert_eq!(f.balance(&f.treasury), 500);
    assert_eq!(f.client.contract_balance(), 0);
}

#[test]
fn capacity_basis_full_allocation_leaves_treasury_empty() {
    let f = setup_with(config(DistributionBasis::Capacity));
    let alice = f.add(400_000_000);
    let bob = f.add(600_000_000);
    f.fund(1_000);

    f.client.distribute_funds();
    assert_eq!(f.balance(&alice), 400);
    assert_eq!(f.balance(&bob), 600);
    assert_eq!(f.balance(&f.treasury), 0);
}

// ── failure paths ─────────────────────────────────────────────

#[test]
fn empty_fund_is_rejected() {
    let f = setup();
    f.add(10);
    assert_eq!(
        f.client.try_distribute_funds(),
        Err(Ok(StakeError::NothingToDistribute))
    );
    assert_eq!(f.client.get_distribution_count(), 0);
}

#[test]
fn empty_ledger_keeps_funds() {
    let f = setup();
    f.fund(1_000);
    assert_eq!(
        f.client.try_distribute_funds(),
        Err(Ok(StakeError::NoBeneficiaries))
    );
    assert_eq!(f.client.contract_balance(), 1_000);
}

#[test]
fn paused_distribution_keeps_funds() {
    let f = setup();
    let alice = f.add(10);
    f.fund(1_000);
    f.client.pause(&f.admin);

    assert_eq!(
        f.client.try_distribute_funds(),
        Err(Ok(StakeError::SystemPaused))
    );
    assert_eq!(f.balance(&alice), 0);
    assert_eq!(f.client.contract_balance(), 1_000);

    f.client.unpause(&f.admin);
    f.client.distribute_funds();
    assert_eq!(f.balance(&alice), 1_000);
}

#[test]
fn failed_settlement_rolls_back_every_payout() {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = GENESIS);
    let token_id = env.register_contract(None, RejectingToken);
    let token = RejectingTokenClient::new(&env, &token_id);
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let treasury = Address::generate(&env);
    client.initialize(
        &admin,
        &treasury,
        &token_id,
        &config(DistributionBasis::Aggregate),
    );

    let alice = Address::generate(&env);
    let bob = Address::generate(&env);
    client.add_beneficiary(&admin, &alice, &1);
    client.add_beneficiary(&admin, &bob, &1);
    token.mint(&contract_id, &100);
    token.set_rejected(&bob, &true);

    assert_eq!(
        client.try_distribute_funds(),
        Err(Ok(StakeError::SettlementFailed))
    );
    // Alice's transfer went through before Bob's failed; both are undone.
    assert_eq!(token.balance(&alice), 0);
    assert_eq!(token.balance(&bob), 0);
    assert_eq!(token.balance(&contract_id), 100);
    assert_eq!(client.get_distribution_count(), 0);
    assert_eq!(client.get_total_distributed(), 0);

    // Retry after the recipient is fixed pays each share exactly once.
    token.set_rejected(&bob, &false);
    assert_eq!(client.distribute_funds(), 100);
    assert_eq!(token.balance(&alice), 50);
    assert_eq!(token.balance(&bob), 50);
    assert_eq!(token.balance(&contract_id), 0);
    assert_eq!(client.get_distribution_count(), 1);
}

// ── bookkeeping and preview ───────────────────────────────────

#[test]
fn bookkeeping_tracks_distributions() {
    let f = setup();
    f.add(10);
    assert_eq!(f.client.get_distribution_count(), 0);
    assert_eq!(f.client.get_total_distributed(), 0);
    assert_eq!(f.client.get_last_distribution_at(), None);

    f.fund(1_000);
    warp(&f.env, 3 * DAY);
    f.client.distribute_funds();

    f.fund(300);
    warp(&f.env, 40 * DAY);
    f.client.distribute_funds();

    assert_eq!(f.client.get_distribution_count(), 2);
    assert_eq!(f.client.get_total_distributed(), 1_300);
    assert_eq!(f.client.get_last_distribution_at(), Some(GENESIS + 40 * DAY));
}

#[test]
fn distribution_emits_event() {
    let f = setup_with(config(DistributionBasis::Capacity));
    let alice = f.add(500_000_000);
    f.fund(1_000);
    f.client.distribute_funds();

    let (_, topics, data) = last_event(&f.env);
    let expected: Vec<Val> = (symbol_short!("funds_dst"),).into_val(&f.env);
    assert_eq!(topics, expected);

    let (total, payouts, treasury_amount, at) =
        <(i128, Vec<(Address, i128)>, i128, u64)>::from_val(&f.env, &data);
    assert_eq!(total, 1_000);
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts.get(0).unwrap(), (alice, 500));
    assert_eq!(treasury_amount, 500);
    assert_eq!(at, GENESIS);
}

#[test]
fn preview_matches_distribution() {
    let f = setup();
    let a = f.add(2);
    let b = f.add(5);
    f.fund(1_001);

    let plan = f.client.preview_distribution();
    assert_eq!(plan.total, 1_001);
    assert_eq!(plan.treasury_amount, 0);
    assert_eq!(f.client.contract_balance(), 1_001);

    f.client.distribute_funds();
    assert_eq!(plan.payouts.get(0).unwrap(), (a.clone(), f.balance(&a)));
    assert_eq!(plan.payouts.get(1).unwrap(), (b.clone(), f.balance(&b)));
    assert_eq!(f.balance(&a) + f.balance(&b), 1_001);
}

#[test]
fn preview_reports_planning_errors() {
    let f = setup();
    assert_eq!(
        f.client.try_preview_distribution(),
        Err(Ok(StakeError::NothingToDistribute))
    );
    f.fund(10);
    assert_eq!(
        f.client.try_preview_distribution(),
        Err(Ok(StakeError::NoBeneficiaries))
    );
}

#[test]
fn preview_ignores_pause() {
    let f = setup();
    f.add(10);
    f.fund(10);
    f.client.pause(&f.admin);
    assert_eq!(f.client.preview_distribution().total, 10);
}

// ── interaction with the window ───────────────────────────────

#[test]
fn distribution_runs_while_window_locked() {
    let f = setup();
    let alice = f.add(10);
    f.fund(500);
    warp(&f.env, 15 * DAY);
    assert!(!f.client.is_window_open());

    assert_eq!(f.client.distribute_funds(), 500);
    assert_eq!(f.balance(&alice), 500);
}

#[test]
fn direct_transfer_is_distributable() {
    let f = setup();
    let alice = f.add(10);
    let sender = Address::generate(&f.env);
    token::StellarAssetClient::new(&f.env, &f.payout_token).mint(&sender, &700);
    f.token().transfer(&sender, &f.client.address, &700);

    assert_eq!(f.client.contract_balance(), 700);
    assert_eq!(f.client.distribute_funds(), 700);
    assert_eq!(f.balance(&alice), 700);
}

#[test]
fn stake_change_applies_to_next_distribution() {
    let f = setup_with(StakeConfig {
        update_mode: StakeUpdateMode::Replace,
        ..config(DistributionBasis::Aggregate)
    });
    let alice = f.add(1);
    let bob = f.add(1);
    f.fund(100);
    f.client.distribute_funds();
    assert_eq!(f.balance(&alice), 50);
    assert_eq!(f.balance(&bob), 50);

    // Next cycle's window: bob's weight triples.
    warp(&f.env, DEFAULT_INTERVAL_SECS + DAY);
    f.client.update_beneficiary_stake(&f.admin, &bob, &3);
    f.fund(100);
    f.client.distribute_funds();
    assert_eq!(f.balance(&alice), 75);
    assert_eq!(f.balance(&bob), 125);
}

// ── the contract cannot pay itself ────────────────────────────

#[test]
fn contract_cannot_be_added_as_beneficiary() {
    let f = setup();
    let alice = f.add(1);
    let own_address = f.client.address.clone();

    assert_eq!(
        f.client.try_add_beneficiary(&f.admin, &own_address, &1),
        Err(Ok(StakeError::InvalidBeneficiary))
    );
    assert!(!f.client.is_beneficiary(&own_address));
    assert_eq!(f.client.total_stake(), 1);

    f.fund(1_000);
    assert_eq!(f.client.distribute_funds(), 1_000);
    assert_eq!(f.balance(&alice), 1_000);
    assert_eq!(f.client.contract_balance(), 0);
    assert_eq!(f.client.get_total_distributed(), 1_000);
}

#[test]
fn contract_cannot_be_its_own_treasury() {
    let env = Env::default();
    env.mock_all_auths();
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let payout_token = env.register_stellar_asset_contract(Address::generate(&env));

    assert_eq!(
        client.try_initialize(
            &admin,
            &contract_id,
            &payout_token,
            &config(DistributionBasis::Capacity),
        ),
        Err(Ok(StakeError::InvalidConfig))
    );
    assert!(client.get_admin().is_none());
    assert!(client.get_treasury().is_none());
}
