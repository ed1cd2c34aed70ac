//! The provisioning orchestrator: one linear run from validated
//! configuration to a funded, distributing pool.
//!
//! Each step either returns data the next step needs or fails the run; there
//! is no retry and no partial-progress bookkeeping. A failed run leaves the
//! chain in whatever state the confirmed steps produced, and because every
//! step is idempotent or append-only, re-running with the same input
//! converges instead of duplicating work.

use crate::approvals::reconcile_approval;
use crate::config::ProvisioningSpec;
use crate::events::{self, POOL_CREATED};
use crate::rewards::bootstrap_rewards;
use crate::roles::{self, grant_token_roles, REWARD_TOKEN_ROLE, STAKING_TOKEN_ROLE};
use crate::{
    mask, ChainProvider, PoolCreationRequest, PoolRegistry, ProvisionError, Result, StakingPool,
};
use alloy_primitives::{Address, U256};
use tracing::info;

/// Outcome of one successful provisioning run, assembled exclusively from
/// on-chain event and accessor data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvisioningResult {
    pub pool: Address,
    pub reward_token: Address,
    pub staking_token: Address,
    /// Operator's reward-token balance at reconciliation time, registered
    /// for distribution.
    pub funded_reward_balance: U256,
}

/// Provision one pool end to end.
///
/// The run proceeds through nine steps, aborting on the first error:
///
/// 1. Validate the spec locally; nothing is submitted on failure.
/// 2. Compute the activity window from the latest block timestamp.
/// 3. Grant staking and reward eligibility roles to the flagged tokens.
/// 4. Encode both eligibility masks.
/// 5. Re-read the creation fee and submit pool creation, fee attached.
/// 6. Resolve the new pool's address from the creation event.
/// 7. Read the pool's reward and staking token addresses.
/// 8. Reconcile the operator's approvals toward the pool, capturing the
///    reward-token balance.
/// 9. Bootstrap rewards: register the balance, release the first tranche.
pub fn provision_pool<C: ChainProvider>(
    chain: &C,
    spec: &ProvisioningSpec,
    operator: Address,
) -> Result<ProvisioningResult> {
    spec.validate()?;

    let now = chain.current_timestamp()?;
    // One tick of margin: the pool requires a strictly future start.
    let start_timestamp = now + 1;
    let end_timestamp = start_timestamp
        .checked_add(spec.pool.duration_secs)
        .ok_or_else(|| {
            ProvisionError::Config(format!(
                "duration {} overflows the activity window",
                spec.pool.duration_secs
            ))
        })?;

    let registry = chain.registry()?;
    grant_token_roles(
        &registry,
        &spec.tokens.addresses,
        &spec.tokens.staking_flags,
        roles::role_id(STAKING_TOKEN_ROLE),
        operator,
    )?;
    grant_token_roles(
        &registry,
        &spec.tokens.addresses,
        &spec.tokens.reward_flags,
        roles::role_id(REWARD_TOKEN_ROLE),
        operator,
    )?;

    let staking_mask = mask::encode_flags(&spec.tokens.staking_flags)?;
    let reward_mask = mask::encode_flags(&spec.tokens.reward_flags)?;

    let request = PoolCreationRequest {
        prototype: spec.pool.prototype,
        start_timestamp,
        end_timestamp,
        min_stake: spec.pool.min_stake,
        max_stake: spec.pool.max_stake,
        min_lockup_secs: spec.pool.min_lockup_secs,
        early_withdrawal_fee_bps: spec.pool.early_withdrawal_fee_bps,
        deposit_withdraw_fee_bps: spec.pool.deposit_withdraw_fee_bps,
        reward_bps_per_distribution: spec.pool.reward_bps_per_distribution,
        staking_mask,
        reward_mask,
        custom_params: spec.pool.custom_params.clone(),
        tokens: spec.tokens.addresses.clone(),
        initial_rewards: spec.initial_rewards.clone(),
        initial_deposits: spec.initial_deposits.clone(),
    };

    // The registry can be repriced between runs; never reuse a cached fee.
    let fee = registry.pool_creation_fee()?;
    let receipt = registry.create_pool(&request, fee, operator)?;
    let pool_address = events::first_event(&receipt, POOL_CREATED)?.address_field("pool")?;
    info!(pool = %pool_address, tx = %receipt.tx_hash, "pool created");

    let pool = chain.pool(pool_address)?;
    let reward_token_address = pool.reward_token()?;
    let staking_token_address = pool.staking_token()?;

    let staking_token = chain.token(staking_token_address)?;
    reconcile_approval(&staking_token, operator, pool_address, U256::MAX)?;
    let reward_token = chain.token(reward_token_address)?;
    let reward_balance = reconcile_approval(&reward_token, operator, pool_address, U256::MAX)?;

    let bootstrap = bootstrap_rewards(&pool, reward_balance, operator)?;
    info!(
        pool = %pool_address,
        registered = %bootstrap.registered,
        first_tranche = %bootstrap.first_tranche,
        "pool provisioned"
    );

    Ok(ProvisioningResult {
        pool: pool_address,
        reward_token: reward_token_address,
        staking_token: staking_token_address,
        funded_reward_balance: bootstrap.registered,
    })
}
