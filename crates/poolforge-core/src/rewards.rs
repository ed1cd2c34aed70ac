//! Reward bootstrap: register the funded balance, then release the first
//! distribution tranche. Both steps are confirmed transactions whose results
//! are recovered from their own events.

use crate::events::{self, PART_DISTRIBUTED, REWARD_ADDED};
use crate::{Result, StakingPool};
use alloy_primitives::{Address, U256};
use tracing::info;

/// Amounts the pool acknowledged during bootstrap, as reported by its events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardBootstrap {
    /// Total reward balance the pool registered for distribution.
    pub registered: U256,
    /// Amount released by the first distribution tranche.
    pub first_tranche: U256,
}

/// Activate reward distribution on a freshly created pool.
///
/// Registers `reward_balance` for distribution, then releases the first
/// tranche. The tranche release depends on the registration having
/// committed, so the two run strictly in order.
pub fn bootstrap_rewards<P: StakingPool>(
    pool: &P,
    reward_balance: U256,
    acting: Address,
) -> Result<RewardBootstrap> {
    let receipt = pool.register_reward_balance(reward_balance, acting)?;
    let registered = events::first_event(&receipt, REWARD_ADDED)?.uint_field("amount")?;
    info!(pool = %pool.address(), %registered, "registered reward balance");

    let receipt = pool.release_distribution_tranche(acting)?;
    let first_tranche = events::first_event(&receipt, PART_DISTRIBUTED)?.uint_field("amount")?;
    info!(pool = %pool.address(), %first_tranche, "released first distribution tranche");

    Ok(RewardBootstrap {
        registered,
        first_tranche,
    })
}
