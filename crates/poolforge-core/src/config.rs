//! Caller-facing provisioning configuration.
//!
//! [`ProvisioningSpec`] aggregates everything one provisioning run needs and
//! validates it locally, so malformed input fails before the orchestrator
//! touches the chain.

use crate::{ProvisionError, Result, BPS_DENOM, DAY_SECS};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Static parameters of the pool to instantiate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfiguration {
    /// Index of the pool template/variant the registry should clone.
    pub prototype: u8,

    /// How long the pool accepts stakes and distributes rewards, in seconds.
    pub duration_secs: u64,

    /// Minimum reward lock-up period in seconds.
    pub min_lockup_secs: u64,

    /// Fee on withdrawals before the lock-up elapses, in basis points.
    pub early_withdrawal_fee_bps: u16,

    /// Fee on deposits and withdrawals, in basis points.
    pub deposit_withdraw_fee_bps: u16,

    /// Share of the registered reward total released per distribution
    /// cycle, in basis points.
    pub reward_bps_per_distribution: u16,

    pub min_stake: U256,
    pub max_stake: U256,

    /// Variant-specific parameters, opaque to the pipeline.
    pub custom_params: Vec<Address>,
}

impl PoolConfiguration {
    fn validate(&self) -> Result<()> {
        for (name, bps) in [
            ("early_withdrawal_fee_bps", self.early_withdrawal_fee_bps),
            ("deposit_withdraw_fee_bps", self.deposit_withdraw_fee_bps),
            (
                "reward_bps_per_distribution",
                self.reward_bps_per_distribution,
            ),
        ] {
            if u64::from(bps) > BPS_DENOM {
                return Err(ProvisionError::Config(format!(
                    "{name} is {bps}, above the {BPS_DENOM} bps denominator"
                )));
            }
        }
        if self.min_stake > self.max_stake {
            return Err(ProvisionError::Config(format!(
                "min stake {} exceeds max stake {}",
                self.min_stake, self.max_stake
            )));
        }
        Ok(())
    }
}

/// Ordered participating tokens with their per-token eligibility flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub addresses: Vec<Address>,
    pub staking_flags: Vec<bool>,
    pub reward_flags: Vec<bool>,
}

impl TokenSet {
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.staking_flags.len() != self.addresses.len() {
            return Err(ProvisionError::Config(format!(
                "lengths of addresses and staking flags are not equal: {} != {}",
                self.addresses.len(),
                self.staking_flags.len()
            )));
        }
        if self.reward_flags.len() != self.addresses.len() {
            return Err(ProvisionError::Config(format!(
                "lengths of addresses and reward flags are not equal: {} != {}",
                self.addresses.len(),
                self.reward_flags.len()
            )));
        }
        Ok(())
    }
}

/// One initial funding entry: an index into the token set and an amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub token_index: usize,
    pub amount: U256,
}

/// Complete input of one provisioning run.
///
/// Supplied per run and not persisted; the run's outcome is derived from
/// on-chain data only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSpec {
    pub pool: PoolConfiguration,
    pub tokens: TokenSet,
    /// Initial reward funding, indexed into `tokens`.
    pub initial_rewards: Vec<AllocationEntry>,
    /// Initial deposit seeding, indexed into `tokens`.
    pub initial_deposits: Vec<AllocationEntry>,
}

impl ProvisioningSpec {
    pub fn builder() -> ProvisioningSpecBuilder {
        ProvisioningSpecBuilder::default()
    }

    /// Check every local invariant. Must pass before any transaction is
    /// submitted.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.tokens.validate()?;
        for (name, entries) in [
            ("reward", &self.initial_rewards),
            ("deposit", &self.initial_deposits),
        ] {
            for entry in entries.iter() {
                if entry.token_index >= self.tokens.len() {
                    return Err(ProvisionError::Config(format!(
                        "initial {name} allocation references token index {} but only {} tokens are configured",
                        entry.token_index,
                        self.tokens.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`ProvisioningSpec`].
pub struct ProvisioningSpecBuilder {
    spec: ProvisioningSpec,
}

impl Default for ProvisioningSpecBuilder {
    fn default() -> Self {
        Self {
            spec: ProvisioningSpec {
                pool: PoolConfiguration {
                    prototype: 0,
                    duration_secs: 0,
                    min_lockup_secs: 0,
                    early_withdrawal_fee_bps: 0,
                    deposit_withdraw_fee_bps: 0,
                    reward_bps_per_distribution: 0,
                    min_stake: U256::ZERO,
                    max_stake: U256::MAX,
                    custom_params: Vec::new(),
                },
                tokens: TokenSet {
                    addresses: Vec::new(),
                    staking_flags: Vec::new(),
                    reward_flags: Vec::new(),
                },
                initial_rewards: Vec::new(),
                initial_deposits: Vec::new(),
            },
        }
    }
}

impl ProvisioningSpecBuilder {
    pub fn prototype(mut self, prototype: u8) -> Self {
        self.spec.pool.prototype = prototype;
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.spec.pool.duration_secs = secs;
        self
    }

    pub fn duration_days(self, days: u64) -> Self {
        self.duration_secs(days * DAY_SECS)
    }

    pub fn min_lockup_secs(mut self, secs: u64) -> Self {
        self.spec.pool.min_lockup_secs = secs;
        self
    }

    pub fn min_lockup_days(self, days: u64) -> Self {
        self.min_lockup_secs(days * DAY_SECS)
    }

    pub fn early_withdrawal_fee_bps(mut self, bps: u16) -> Self {
        self.spec.pool.early_withdrawal_fee_bps = bps;
        self
    }

    pub fn deposit_withdraw_fee_bps(mut self, bps: u16) -> Self {
        self.spec.pool.deposit_withdraw_fee_bps = bps;
        self
    }

    pub fn reward_bps_per_distribution(mut self, bps: u16) -> Self {
        self.spec.pool.reward_bps_per_distribution = bps;
        self
    }

    pub fn stake_bounds(mut self, min: U256, max: U256) -> Self {
        self.spec.pool.min_stake = min;
        self.spec.pool.max_stake = max;
        self
    }

    pub fn custom_param(mut self, param: Address) -> Self {
        self.spec.pool.custom_params.push(param);
        self
    }

    /// Append a participating token with its eligibility flags.
    pub fn token(mut self, address: Address, staking: bool, reward: bool) -> Self {
        self.spec.tokens.addresses.push(address);
        self.spec.tokens.staking_flags.push(staking);
        self.spec.tokens.reward_flags.push(reward);
        self
    }

    pub fn reward_allocation(mut self, token_index: usize, amount: U256) -> Self {
        self.spec.initial_rewards.push(AllocationEntry {
            token_index,
            amount,
        });
        self
    }

    pub fn deposit_allocation(mut self, token_index: usize, amount: U256) -> Self {
        self.spec.initial_deposits.push(AllocationEntry {
            token_index,
            amount,
        });
        self
    }

    /// Validate and return the spec.
    pub fn build(self) -> Result<ProvisioningSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn builder_creates_valid_spec() {
        let spec = ProvisioningSpec::builder()
            .duration_days(30)
            .min_lockup_days(5)
            .reward_bps_per_distribution(1000)
            .stake_bounds(U256::from(1u64), U256::from(100u64))
            .token(addr(1), true, true)
            .token(addr(2), true, false)
            .reward_allocation(0, U256::from(5u64))
            .build()
            .expect("spec should validate");

        assert_eq!(spec.pool.duration_secs, 30 * DAY_SECS);
        assert_eq!(spec.pool.min_lockup_secs, 5 * DAY_SECS);
        assert_eq!(spec.tokens.len(), 2);
        assert_eq!(spec.initial_rewards.len(), 1);
    }

    #[test]
    fn bps_above_denominator_rejected() {
        let result = ProvisioningSpec::builder()
            .reward_bps_per_distribution(10_001)
            .token(addr(1), true, true)
            .build();

        assert!(matches!(result, Err(ProvisionError::Config(_))));
    }

    #[test]
    fn inverted_stake_bounds_rejected() {
        let result = ProvisioningSpec::builder()
            .stake_bounds(U256::from(10u64), U256::from(1u64))
            .token(addr(1), true, true)
            .build();

        assert!(matches!(result, Err(ProvisionError::Config(_))));
    }

    #[test]
    fn mismatched_flag_lengths_rejected() {
        let mut spec = ProvisioningSpec::builder()
            .token(addr(1), true, true)
            .token(addr(2), true, false)
            .build()
            .unwrap();
        spec.tokens.staking_flags.pop();

        let err = spec.validate().unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
        assert!(err.to_string().contains("2 != 1"));
    }

    #[test]
    fn allocation_index_out_of_range_rejected() {
        let result = ProvisioningSpec::builder()
            .token(addr(1), true, true)
            .reward_allocation(1, U256::from(5u64))
            .build();

        assert!(matches!(result, Err(ProvisionError::Config(_))));
    }
}
