#![cfg(test)]
use soroban_sdk::{
    testutils::{Address as _, Ledger as _},
    token, Address, Env,
};

use crate::{
    DistributionBasis, Role, StakeConfig, StakeError, StakeManager, StakeManagerClient,
    StakeUpdateMode, DEFAULT_CAPACITY, DEFAULT_INTERVAL_SECS, DEFAULT_WINDOW_SECS,
};

fn default_config() -> StakeConfig {
    StakeConfig {
        capacity: DEFAULT_CAPACITY,
        interval_secs: DEFAULT_INTERVAL_SECS,
        window_secs: DEFAULT_WINDOW_SECS,
        update_mode: StakeUpdateMode::Accumulate,
        basis: DistributionBasis::Aggregate,
    }
}

/// Initialized contract with a funded payout token; return (env, client, admin, payout_token).
fn setup() -> (Env, StakeManagerClient<'static>, Address, Address) {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = 10_000);
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let treasury = Address::generate(&env);
    let payout_token = env.register_stellar_asset_contract(Address::generate(&env));
    client.initialize(&admin, &treasury, &payout_token, &default_config());
    (env, client, admin, payout_token)
}

/// Stop mocking signatures: subsequent require_auth calls fail.
fn revoke_mocked_auths(env: &Env) {
    env.mock_auths(&[]);
}

// ── initialize ────────────────────────────────────────────────

#[test]
fn initialize_missing_auth_no_mutation() {
    let env = Env::default();
    let contract_id = env.register_contract(None, StakeManager);
    let client = StakeManagerClient::new(&env, &contract_id);
    let admin = Address::generate(&env);
    let treasury = Address::generate(&env);
    let token = Address::generate(&env);

    assert!(client
        .try_initialize(&admin, &treasury, &token, &default_config())
        .is_err());
    assert!(client.get_admin().is_none());
    assert!(client.get_config().is_none());
}

#[test]
fn admin_holds_both_roles_after_initialize() {
    let (env, client, admin, _) = setup();
    assert!(client.has_role(&Role::Manager, &admin));
    assert!(client.has_role(&Role::Pauser, &admin));

    let stranger = Address::generate(&env);
    assert!(!client.has_role(&Role::Manager, &stranger));
    assert!(!client.has_role(&Role::Pauser, &stranger));
}

// ── ledger mutations require the manager role ─────────────────

#[test]
fn add_beneficiary_requires_manager_role() {
    let (env, client, _admin, _) = setup();
    let alice = Address::generate(&env);

    assert_eq!(
        client.try_add_beneficiary(&alice, &alice, &50_000_000),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(!client.is_beneficiary(&alice));
}

#[test]
fn update_beneficiary_requires_manager_role() {
    let (env, client, admin, _) = setup();
    let alice = Address::generate(&env);
    let bob = Address::generate(&env);
    client.add_beneficiary(&admin, &alice, &50_000_000);

    assert_eq!(
        client.try_update_beneficiary_stake(&bob, &alice, &50_000_000),
        Err(Ok(StakeError::Unauthorized))
    );
    assert_eq!(client.get_stake(&alice), 50_000_000);
}

#[test]
fn remove_beneficiary_requires_manager_role() {
    let (env, client, admin, _) = setup();
    let alice = Address::generate(&env);
    let bob = Address::generate(&env);
    client.add_beneficiary(&admin, &alice, &10);

    assert_eq!(
        client.try_remove_beneficiary(&bob, &alice),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(client.is_beneficiary(&alice));
}

#[test]
fn unauthorized_caller_checked_before_input() {
    let (env, client, _admin, _) = setup();
    let mallory = Address::generate(&env);
    assert_eq!(
        client.try_add_beneficiary(&mallory, &mallory, &0),
        Err(Ok(StakeError::Unauthorized))
    );
}

#[test]
fn add_beneficiary_missing_signature_no_mutation() {
    let (env, client, admin, _) = setup();
    let alice = Address::generate(&env);
    revoke_mocked_auths(&env);

    assert!(client.try_add_beneficiary(&admin, &alice, &10).is_err());
    assert!(!client.is_beneficiary(&alice));
    assert_eq!(client.total_stake(), 0);
}

#[test]
fn granted_manager_can_mutate_until_revoked() {
    let (env, client, admin, _) = setup();
    let manager = Address::generate(&env);
    let alice = Address::generate(&env);
    let bob = Address::generate(&env);

    client.grant_role(&admin, &Role::Manager, &manager);
    assert!(client.has_role(&Role::Manager, &manager));
    client.add_beneficiary(&manager, &alice, &100);

    client.revoke_role(&admin, &Role::Manager, &manager);
    assert!(!client.has_role(&Role::Manager, &manager));
    assert_eq!(
        client.try_add_beneficiary(&manager, &bob, &100),
        Err(Ok(StakeError::Unauthorized))
    );
}

#[test]
fn only_admin_grants_and_revokes_roles() {
    let (env, client, admin, _) = setup();
    let mallory = Address::generate(&env);

    assert_eq!(
        client.try_grant_role(&mallory, &Role::Manager, &mallory),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(!client.has_role(&Role::Manager, &mallory));

    assert_eq!(
        client.try_revoke_role(&mallory, &Role::Pauser, &admin),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(client.has_role(&Role::Pauser, &admin));
}

#[test]
fn pauser_role_does_not_grant_manager_rights() {
    let (env, client, admin, _) = setup();
    let pauser = Address::generate(&env);
    client.grant_role(&admin, &Role::Pauser, &pauser);

    client.pause(&pauser);
    assert!(client.is_paused());
    assert_eq!(
        client.try_add_beneficiary(&pauser, &pauser, &1),
        Err(Ok(StakeError::Unauthorized))
    );
}

// ── pause / unpause ───────────────────────────────────────────

#[test]
fn pause_unauthorized() {
    let (env, client, admin, _) = setup();
    let attacker = Address::generate(&env);

    assert_eq!(
        client.try_pause(&attacker),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(!client.is_paused());
    client.pause(&admin);
    assert!(client.is_paused());
}

#[test]
fn unpause_unauthorized() {
    let (env, client, admin, _) = setup();
    client.pause(&admin);
    let attacker = Address::generate(&env);

    assert_eq!(
        client.try_unpause(&attacker),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(client.is_paused());
    client.unpause(&admin);
    assert!(!client.is_paused());
}

#[test]
fn pause_is_idempotent() {
    let (_env, client, admin, _) = setup();
    client.pause(&admin);
    client.pause(&admin);
    assert!(client.is_paused());
    client.unpause(&admin);
    client.unpause(&admin);
    assert!(!client.is_paused());
}

#[test]
fn pause_missing_signature_no_mutation() {
    let (env, client, admin, _) = setup();
    revoke_mocked_auths(&env);
    assert!(client.try_pause(&admin).is_err());
    assert!(!client.is_paused());
}

#[test]
fn revoked_pauser_cannot_unpause() {
    let (env, client, admin, _) = setup();
    let pauser = Address::generate(&env);
    client.grant_role(&admin, &Role::Pauser, &pauser);
    client.pause(&pauser);
    client.revoke_role(&admin, &Role::Pauser, &pauser);

    assert_eq!(
        client.try_unpause(&pauser),
        Err(Ok(StakeError::Unauthorized))
    );
    assert!(client.is_paused());
}

// ── pause scope ───────────────────────────────────────────────

#[test]
fn pause_does_not_gate_ledger_mutations() {
    let (env, client, admin, _) = setup();
    let alice = Address::generate(&env);
    client.pause(&admin);

    client.add_beneficiary(&admin, &alice, &100);
    client.update_beneficiary_stake(&admin, &alice, &100);
    assert_eq!(client.get_stake(&alice), 200);
}

#[test]
fn pause_gates_distribution_only() {
    let (env, client, admin, payout_token) = setup();
    let alice = Address::generate(&env);
    let funder = Address::generate(&env);
    token::StellarAssetClient::new(&env, &payout_token).mint(&funder, &1_000);

    client.pause(&admin);
    client.deposit(&funder, &1_000);
    client.add_beneficiary(&admin, &alice, &500_000_000);

    assert_eq!(
        client.try_distribute_funds(),
        Err(Ok(StakeError::SystemPaused))
    );
    assert_eq!(client.contract_balance(), 1_000);

    client.unpause(&admin);
    assert_eq!(client.distribute_funds(), 1_000);
    assert_eq!(client.contract_balance(), 0);
}

// ── distribution needs no signature ───────────────────────────

#[test]
fn anyone_can_distribute() {
    let (env, client, admin, payout_token) = setup();
    let alice = Address::generate(&env);
    let funder = Address::generate(&env);
    token::StellarAssetClient::new(&env, &payout_token).mint(&funder, &1_000);
    client.deposit(&funder, &1_000);
    client.add_beneficiary(&admin, &alice, &500_000_000);

    revoke_mocked_auths(&env);
    assert_eq!(client.distribute_funds(), 1_000);
    assert_eq!(
        token::Client::new(&env, &payout_token).balance(&alice),
        1_000
    );
}

#[test]
fn deposit_requires_depositor_signature() {
    let (env, client, _admin, payout_token) = setup();
    let funder = Address::generate(&env);
    token::StellarAssetClient::new(&env, &payout_token).mint(&funder, &1_000);

    revoke_mocked_auths(&env);
    assert!(client.try_deposit(&funder, &1_000).is_err());
    assert_eq!(client.contract_balance(), 0);
}
