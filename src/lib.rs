#![no_std]
#![deny(unsafe_code)]
#![deny(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token, Address, Env,
    Symbol, Vec,
};

pub mod distribution;
pub mod window;

pub use distribution::{DistributionBasis, PayoutPlan};
pub use window::WindowState;

/// Contract error codes. Signature failures are signaled by host panic (require_auth).
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u32)]
pub enum StakeError {
    /// Contract is not initialized (admin not set).
    NotInitialized = 1,
    /// `initialize` was already called.
    AlreadyInitialized = 2,
    /// Construction-time configuration is out of range.
    InvalidConfig = 3,
    /// Caller does not hold the required role.
    Unauthorized = 4,
    /// Ledger mutations are only accepted inside the update window.
    WindowClosed = 5,
    /// Stake units must be positive.
    ZeroStake = 6,
    /// Beneficiary already exists; use update instead.
    DuplicateBeneficiary = 7,
    /// Beneficiary is not in the ledger.
    UnknownBeneficiary = 8,
    /// Aggregate stake would exceed capacity.
    CapacityExceeded = 9,
    /// Distribution is suspended.
    SystemPaused = 10,
    /// Contract holds no funds.
    NothingToDistribute = 11,
    /// Ledger is empty.
    NoBeneficiaries = 12,
    /// Ledger timestamp precedes genesis.
    ClockError = 13,
    /// A payout transfer failed; the whole distribution was rolled back.
    SettlementFailed = 14,
    /// Amount must be positive.
    InvalidAmount = 15,
    /// Identity cannot hold a stake (the contract itself).
    InvalidBeneficiary = 16,
    /// Ledger already holds `MAX_BENEFICIARIES` entries.
    BeneficiaryLimitReached = 17,
}

// ── Event symbols ────────────────────────────────────────────
const EVENT_INIT: Symbol = symbol_short!("init");
const EVENT_BENEFICIARY_ADDED: Symbol = symbol_short!("ben_add");
const EVENT_BENEFICIARY_REMOVED: Symbol = symbol_short!("ben_rem");
const EVENT_STAKE_UPDATED: Symbol = symbol_short!("stake_upd");
const EVENT_FUNDS_RECEIVED: Symbol = symbol_short!("funds_rcv");
const EVENT_FUNDS_DISTRIBUTED: Symbol = symbol_short!("funds_dst");
const EVENT_PAUSED: Symbol = symbol_short!("paused");
const EVENT_UNPAUSED: Symbol = symbol_short!("unpaused");
const EVENT_ROLE_GRANTED: Symbol = symbol_short!("role_grnt");
const EVENT_ROLE_REVOKED: Symbol = symbol_short!("role_rvk");

// ── Data structures ──────────────────────────────────────────
/// Contract version identifier. Bumped when storage or semantics change.
pub const CONTRACT_VERSION: u32 = 1;

/// Upper bound on capacity; keeps payout arithmetic inside i128.
pub const MAX_CAPACITY: u64 = 1_000_000_000_000_000_000;

/// Max beneficiaries; bounds the transfers made by one distribution.
pub const MAX_BENEFICIARIES: u32 = 50;

/// Stake units representing full allocation in the reference deployment.
pub const DEFAULT_CAPACITY: u64 = 1_000_000_000;

/// 30 days.
pub const DEFAULT_INTERVAL_SECS: u64 = 2_592_000;

/// 7 days.
pub const DEFAULT_WINDOW_SECS: u64 = 604_800;

/// How `update_beneficiary_stake` combines the stored stake with its input.
#[contracttype]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StakeUpdateMode {
    /// new = previous + input. Passing the current stake doubles it.
    Accumulate = 0,
    /// new = input.
    Replace = 1,
}

/// Capabilities checked before privileged operations.
#[contracttype]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// May add, update and remove beneficiaries.
    Manager = 0,
    /// May pause and unpause distribution.
    Pauser = 1,
}

/// Fixed at initialization; there is no reconfiguration entrypoint.
#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct StakeConfig {
    /// Maximum aggregate stake units.
    pub capacity: u64,
    /// Length of one cycle in seconds.
    pub interval_secs: u64,
    /// Length of the update window opening each cycle, in seconds.
    pub window_secs: u64,
    /// Semantics of `update_beneficiary_stake`.
    pub update_mode: StakeUpdateMode,
    /// Denominator used when splitting the fund.
    pub basis: DistributionBasis,
}

impl StakeConfig {
    fn validate(&self) -> Result<(), StakeError> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(StakeError::InvalidConfig);
        }
        if self.interval_secs == 0
            || self.window_secs == 0
            || self.window_secs > self.interval_secs
        {
            return Err(StakeError::InvalidConfig);
        }
        Ok(())
    }
}

#[contracttype]
#[derive(Clone, Debug, PartialEq)]
pub struct Beneficiary {
    pub identity: Address,
    pub stake_units: u64,
}

/// Storage keys. The beneficiary ledger is `BeneficiaryOrder` (insertion order)
/// plus one `Stake` entry per identity; `TotalStake` is maintained incrementally.
#[contracttype]
pub enum DataKey {
    Admin,
    /// Receives the unallocated share under `DistributionBasis::Capacity`.
    Treasury,
    /// Token contract whose balance is distributed.
    PayoutToken,
    Config,
    /// Ledger timestamp at initialization; cycles are counted from here.
    Genesis,
    /// When true, distribute_funds is rejected.
    Paused,
    RoleMember(Role, Address),
    BeneficiaryOrder,
    Stake(Address),
    TotalStake,
    DistributionCount,
    TotalDistributed,
    LastDistributionAt,
}

/// Transfer one payout, mapping any token failure to `SettlementFailed`.
fn settle(
    client: &token::Client,
    from: &Address,
    to: &Address,
    amount: i128,
) -> Result<(), StakeError> {
    match client.try_transfer(from, to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(StakeError::SettlementFailed),
    }
}

// ── Contract ─────────────────────────────────────────────────
#[contract]
pub struct StakeManager;

#[contractimpl]
impl StakeManager {
    fn load_config(env: &Env) -> Result<StakeConfig, StakeError> {
        env.storage()
            .persistent()
            .get(&DataKey::Config)
            .ok_or(StakeError::NotInitialized)
    }

    fn load_payout_token(env: &Env) -> Result<Address, StakeError> {
        env.storage()
            .persistent()
            .get(&DataKey::PayoutToken)
            .ok_or(StakeError::NotInitialized)
    }

    /// Require `caller`'s signature and membership in `role`.
    fn require_role(env: &Env, caller: &Address, role: Role) -> Result<(), StakeError> {
        caller.require_auth();
        if !Self::has_role(env.clone(), role, caller.clone()) {
            return Err(StakeError::Unauthorized);
        }
        Ok(())
    }

    fn require_admin(env: &Env, caller: &Address) -> Result<(), StakeError> {
        let admin = Self::get_admin(env.clone()).ok_or(StakeError::NotInitialized)?;
        caller.require_auth();
        if *caller != admin {
            return Err(StakeError::Unauthorized);
        }
        Ok(())
    }

    fn require_window_open(env: &Env, config: &StakeConfig) -> Result<WindowState, StakeError> {
        window::require_window_open(
            Self::get_genesis(env.clone()),
            config.interval_secs,
            config.window_secs,
            env.ledger().timestamp(),
        )
    }

    fn read_order(env: &Env) -> Vec<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::BeneficiaryOrder)
            .unwrap_or_else(|| Vec::new(env))
    }

    fn write_total_stake(env: &Env, total: u64) {
        env.storage().persistent().set(&DataKey::TotalStake, &total);
    }

    /// Initialize the contract. Genesis is the current ledger timestamp and the
    /// admin receives both the manager and pauser roles.
    pub fn initialize(
        env: Env,
        admin: Address,
        treasury: Address,
        payout_token: Address,
        config: StakeConfig,
    ) -> Result<(), StakeError> {
        if env.storage().persistent().has(&DataKey::Admin) {
            return Err(StakeError::AlreadyInitialized);
        }
        admin.require_auth();
        config.validate()?;
        if treasury == env.current_contract_address() {
            return Err(StakeError::InvalidConfig);
        }

        let store = env.storage().persistent();
        store.set(&DataKey::Admin, &admin);
        store.set(&DataKey::Treasury, &treasury);
        store.set(&DataKey::PayoutToken, &payout_token);
        store.set(&DataKey::Config, &config);
        store.set(&DataKey::Genesis, &env.ledger().timestamp());
        store.set(&DataKey::Paused, &false);
        store.set(&DataKey::TotalStake, &0u64);
        store.set(&DataKey::RoleMember(Role::Manager, admin.clone()), &true);
        store.set(&DataKey::RoleMember(Role::Pauser, admin.clone()), &true);

        env.events()
            .publish((EVENT_INIT, admin), (treasury, payout_token, config));
        Ok(())
    }

    // ── Roles and pause ───────────────────────────────────────

    /// Grant `role` to `account`. Admin only. Idempotent.
    pub fn grant_role(
        env: Env,
        admin: Address,
        role: Role,
        account: Address,
    ) -> Result<(), StakeError> {
        Self::require_admin(&env, &admin)?;
        env.storage()
            .persistent()
            .set(&DataKey::RoleMember(role, account.clone()), &true);
        env.events().publish((EVENT_ROLE_GRANTED, role), account);
        Ok(())
    }

    /// Revoke `role` from `account`. Admin only. Idempotent.
    pub fn revoke_role(
        env: Env,
        admin: Address,
        role: Role,
        account: Address,
    ) -> Result<(), StakeError> {
        Self::require_admin(&env, &admin)?;
        env.storage()
            .persistent()
            .remove(&DataKey::RoleMember(role, account.clone()));
        env.events().publish((EVENT_ROLE_REVOKED, role), account);
        Ok(())
    }

    pub fn has_role(env: Env, role: Role, account: Address) -> bool {
        env.storage()
            .persistent()
            .get::<DataKey, bool>(&DataKey::RoleMember(role, account))
            .unwrap_or(false)
    }

    pub fn get_admin(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::Admin)
    }

    /// Suspend distribution (pauser only). Idempotent.
    pub fn pause(env: Env, caller: Address) -> Result<(), StakeError> {
        Self::load_config(&env)?;
        Self::require_role(&env, &caller, Role::Pauser)?;
        env.storage().persistent().set(&DataKey::Paused, &true);
        env.events().publish((EVENT_PAUSED, caller), ());
        Ok(())
    }

    /// Resume distribution (pauser only). Idempotent.
    pub fn unpause(env: Env, caller: Address) -> Result<(), StakeError> {
        Self::load_config(&env)?;
        Self::require_role(&env, &caller, Role::Pauser)?;
        env.storage().persistent().set(&DataKey::Paused, &false);
        env.events().publish((EVENT_UNPAUSED, caller), ());
        Ok(())
    }

    pub fn is_paused(env: Env) -> bool {
        env.storage()
            .persistent()
            .get::<DataKey, bool>(&DataKey::Paused)
            .unwrap_or(false)
    }

    // ── Update window ─────────────────────────────────────────

    /// Window policy evaluated at the current ledger timestamp.
    pub fn get_window_state(env: Env) -> Result<WindowState, StakeError> {
        let config = Self::load_config(&env)?;
        window::window_state(
            Self::get_genesis(env.clone()),
            config.interval_secs,
            config.window_secs,
            env.ledger().timestamp(),
        )
    }

    /// True if a ledger mutation would pass the window check right now.
    pub fn is_window_open(env: Env) -> bool {
        Self::get_window_state(env)
            .map(|state| state.open)
            .unwrap_or(false)
    }

    pub fn get_genesis(env: Env) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::Genesis)
            .unwrap_or(0)
    }

    pub fn get_config(env: Env) -> Option<StakeConfig> {
        env.storage().persistent().get(&DataKey::Config)
    }

    // ── Beneficiary ledger ────────────────────────────────────

    /// Add a new beneficiary at the end of the ledger.
    ///
    /// Checks, in order: manager role, non-zero stake, identity is not the
    /// contract, open window, identity not yet present, ledger size, capacity.
    pub fn add_beneficiary(
        env: Env,
        caller: Address,
        identity: Address,
        stake_units: u64,
    ) -> Result<(), StakeError> {
        let config = Self::load_config(&env)?;
        Self::require_role(&env, &caller, Role::Manager)?;
        if stake_units == 0 {
            return Err(StakeError::ZeroStake);
        }
        if identity == env.current_contract_address() {
            return Err(StakeError::InvalidBeneficiary);
        }
        Self::require_window_open(&env, &config)?;

        let stake_key = DataKey::Stake(identity.clone());
        if env.storage().persistent().has(&stake_key) {
            return Err(StakeError::DuplicateBeneficiary);
        }
        let mut order = Self::read_order(&env);
        if order.len() >= MAX_BENEFICIARIES {
            return Err(StakeError::BeneficiaryLimitReached);
        }

        let new_total = Self::total_stake(env.clone())
            .checked_add(stake_units)
            .filter(|total| *total <= config.capacity)
            .ok_or(StakeError::CapacityExceeded)?;

        order.push_back(identity.clone());
        env.storage()
            .persistent()
            .set(&DataKey::BeneficiaryOrder, &order);
        env.storage().persistent().set(&stake_key, &stake_units);
        Self::write_total_stake(&env, new_total);

        env.events()
            .publish((EVENT_BENEFICIARY_ADDED, identity), stake_units);
        Ok(())
    }

    /// Change an existing beneficiary's stake according to the configured
    /// `StakeUpdateMode`. Returns the new stake.
    pub fn update_beneficiary_stake(
        env: Env,
        caller: Address,
        identity: Address,
        stake_units: u64,
    ) -> Result<u64, StakeError> {
        let config = Self::load_config(&env)?;
        Self::require_role(&env, &caller, Role::Manager)?;
        if stake_units == 0 {
            return Err(StakeError::ZeroStake);
        }
        Self::require_window_open(&env, &config)?;

        let stake_key = DataKey::Stake(identity.clone());
        let previous: u64 = env
            .storage()
            .persistent()
            .get(&stake_key)
            .ok_or(StakeError::UnknownBeneficiary)?;

        let new_stake = match config.update_mode {
            StakeUpdateMode::Accumulate => previous
                .checked_add(stake_units)
                .ok_or(StakeError::CapacityExceeded)?,
            StakeUpdateMode::Replace => stake_units,
        };

        // previous is part of the total, so the subtraction cannot underflow.
        let new_total = (Self::total_stake(env.clone()) - previous)
            .checked_add(new_stake)
            .filter(|total| *total <= config.capacity)
            .ok_or(StakeError::CapacityExceeded)?;

        env.storage().persistent().set(&stake_key, &new_stake);
        Self::write_total_stake(&env, new_total);

        env.events()
            .publish((EVENT_STAKE_UPDATED, identity), (previous, new_stake));
        Ok(new_stake)
    }

    /// Remove a beneficiary, keeping the relative order of the others.
    /// Returns the stake that was released.
    pub fn remove_beneficiary(
        env: Env,
        caller: Address,
        identity: Address,
    ) -> Result<u64, StakeError> {
        let config = Self::load_config(&env)?;
        Self::require_role(&env, &caller, Role::Manager)?;
        Self::require_window_open(&env, &config)?;

        let stake_key = DataKey::Stake(identity.clone());
        let previous: u64 = env
            .storage()
            .persistent()
            .get(&stake_key)
            .ok_or(StakeError::UnknownBeneficiary)?;

        let old_order = Self::read_order(&env);
        let mut new_order = Vec::new(&env);
        for addr in old_order.iter() {
            if addr != identity {
                new_order.push_back(addr);
            }
        }
        env.storage()
            .persistent()
            .set(&DataKey::BeneficiaryOrder, &new_order);
        env.storage().persistent().remove(&stake_key);
        Self::write_total_stake(&env, Self::total_stake(env.clone()) - previous);

        env.events()
            .publish((EVENT_BENEFICIARY_REMOVED, identity), previous);
        Ok(previous)
    }

    pub fn is_beneficiary(env: Env, identity: Address) -> bool {
        env.storage().persistent().has(&DataKey::Stake(identity))
    }

    /// Stake units held by `identity` (0 if not a beneficiary).
    pub fn get_stake(env: Env, identity: Address) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::Stake(identity))
            .unwrap_or(0)
    }

    /// Snapshot of the ledger in insertion order.
    pub fn list_beneficiaries(env: Env) -> Vec<Beneficiary> {
        let mut out = Vec::new(&env);
        for identity in Self::read_order(&env).iter() {
            let stake_units = Self::get_stake(env.clone(), identity.clone());
            out.push_back(Beneficiary {
                identity,
                stake_units,
            });
        }
        out
    }

    pub fn beneficiary_count(env: Env) -> u32 {
        Self::read_order(&env).len()
    }

    /// Aggregate stake units across all beneficiaries.
    pub fn total_stake(env: Env) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::TotalStake)
            .unwrap_or(0)
    }

    // ── Funds ─────────────────────────────────────────────────

    /// Transfer `amount` of the payout token from `from` into the fund.
    /// Accepted regardless of window or pause state.
    pub fn deposit(env: Env, from: Address, amount: i128) -> Result<(), StakeError> {
        let payout_token = Self::load_payout_token(&env)?;
        from.require_auth();
        if amount <= 0 {
            return Err(StakeError::InvalidAmount);
        }

        let contract_addr = env.current_contract_address();
        token::Client::new(&env, &payout_token).transfer(&from, &contract_addr, &amount);

        env.events().publish((EVENT_FUNDS_RECEIVED, from), amount);
        Ok(())
    }

    /// Payout-token balance currently held by the contract.
    pub fn contract_balance(env: Env) -> i128 {
        match Self::load_payout_token(&env) {
            Ok(payout_token) => {
                token::Client::new(&env, &payout_token).balance(&env.current_contract_address())
            }
            Err(_) => 0,
        }
    }

    pub fn get_treasury(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::Treasury)
    }

    pub fn get_payout_token(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::PayoutToken)
    }

    // ── Distribution ──────────────────────────────────────────

    /// Read-only: payouts `distribute_funds` would make against the current balance.
    pub fn preview_distribution(env: Env) -> Result<PayoutPlan, StakeError> {
        let config = Self::load_config(&env)?;
        distribution::plan_distribution(
            &env,
            Self::contract_balance(env.clone()),
            &Self::list_beneficiaries(env.clone()),
            Self::total_stake(env.clone()),
            config.capacity,
            config.basis,
        )
    }

    /// Drain the fund to the beneficiaries in proportion to stake.
    ///
    /// Callable by anyone while not paused. Payouts are sent in ledger order;
    /// if any transfer fails the call returns `SettlementFailed` and every
    /// transfer already made in this call is rolled back with it, so a retry
    /// never pays twice. Returns the total distributed.
    pub fn distribute_funds(env: Env) -> Result<i128, StakeError> {
        Self::load_config(&env)?;
        if Self::is_paused(env.clone()) {
            return Err(StakeError::SystemPaused);
        }

        let plan = Self::preview_distribution(env.clone())?;

        let payout_token = Self::load_payout_token(&env)?;
        let client = token::Client::new(&env, &payout_token);
        let contract_addr = env.current_contract_address();

        for (identity, amount) in plan.payouts.iter() {
            if amount > 0 {
                settle(&client, &contract_addr, &identity, amount)?;
            }
        }
        if plan.treasury_amount > 0 {
            let treasury = Self::get_treasury(env.clone()).ok_or(StakeError::NotInitialized)?;
            settle(&client, &contract_addr, &treasury, plan.treasury_amount)?;
        }

        let store = env.storage().persistent();
        let now = env.ledger().timestamp();
        store.set(
            &DataKey::DistributionCount,
            &Self::get_distribution_count(env.clone()).saturating_add(1),
        );
        store.set(
            &DataKey::TotalDistributed,
            &Self::get_total_distributed(env.clone()).saturating_add(plan.total),
        );
        store.set(&DataKey::LastDistributionAt, &now);

        env.events().publish(
            (EVENT_FUNDS_DISTRIBUTED,),
            (plan.total, plan.payouts, plan.treasury_amount, now),
        );
        Ok(plan.total)
    }

    /// Number of successful distributions.
    pub fn get_distribution_count(env: Env) -> u32 {
        env.storage()
            .persistent()
            .get(&DataKey::DistributionCount)
            .unwrap_or(0)
    }

    /// Sum of all successful distributions.
    pub fn get_total_distributed(env: Env) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::TotalDistributed)
            .unwrap_or(0)
    }

    pub fn get_last_distribution_at(env: Env) -> Option<u64> {
        env.storage()
            .persistent()
            .get(&DataKey::LastDistributionAt)
    }

    /// Return the current contract version. Used for upgrade compatibility and migration.
    pub fn get_version(env: Env) -> u32 {
        let _ = env;
        CONTRACT_VERSION
    }
}

mod test_auth;
mod test_distribution;
mod test_invariants;
