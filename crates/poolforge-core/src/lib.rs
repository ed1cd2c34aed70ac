//! Core pipeline for provisioning reward-staking pools.
//!
//! The pipeline drives an already-deployed pool registry through the ordered
//! sequence of on-chain operations that creates a pool, registers token
//! eligibility, funds it with rewards and releases the first distribution
//! tranche. The chain itself is reached through the trait seams defined in
//! this crate root; `poolforge-adapters` provides concrete environments.

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

pub mod approvals;
pub mod config;
pub mod events;
pub mod mask;
pub mod orchestrator;
pub mod rewards;
pub mod roles;

pub use config::{AllocationEntry, PoolConfiguration, ProvisioningSpec, TokenSet};
pub use events::{EmittedEvent, EventValue, TxReceipt};
pub use orchestrator::{provision_pool, ProvisioningResult};
pub use roles::RoleId;

/// Default fee attached as transferred value when creating a pool through
/// the registry: 0.1 ether in wei.
///
/// Registries can be repriced at runtime, so the orchestrator re-reads the
/// current fee before every submission instead of trusting this value.
pub const POOL_CREATION_FEE: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// Seconds per day, used to convert day-denominated durations.
pub const DAY_SECS: u64 = 86_400;

/// Basis-point denominator: 10_000 bps == 100%.
pub const BPS_DENOM: u64 = 10_000;

/// Placeholder used where no designated fee beneficiary applies.
pub const NO_BENEFICIARY: Address = Address::ZERO;

/// Conventional burn address; the classic pool variant takes it as its one
/// opaque custom parameter.
pub const DEAD_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xde, 0xad,
]);

/// Unified error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Invalid caller-supplied configuration, raised before any transaction
    /// is sent.
    #[error("configuration error: {0}")]
    Config(String),

    /// An expected event was not emitted by a confirmed transaction.
    #[error("event {event} not emitted by transaction {tx_hash}")]
    EventNotFound { event: String, tx_hash: B256 },

    /// An expected event was emitted but a field is absent or mistyped.
    #[error("event {event} is missing usable field {field}")]
    MalformedEvent { event: String, field: String },

    /// A submitted transaction reverted or failed to confirm.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// A read-only chain query failed.
    #[error("chain query failed: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Full argument set of the registry's create-pool entry point, as submitted
/// on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolCreationRequest {
    /// Index of the pool template/variant to instantiate.
    pub prototype: u8,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub min_stake: U256,
    pub max_stake: U256,
    pub min_lockup_secs: u64,
    pub early_withdrawal_fee_bps: u16,
    pub deposit_withdraw_fee_bps: u16,
    pub reward_bps_per_distribution: u16,
    pub staking_mask: U256,
    pub reward_mask: U256,
    /// Variant-specific parameters, carried through opaquely.
    pub custom_params: Vec<Address>,
    pub tokens: Vec<Address>,
    pub initial_rewards: Vec<AllocationEntry>,
    pub initial_deposits: Vec<AllocationEntry>,
}

/// ERC20-style handle bound to one token contract.
pub trait TokenHandle {
    fn address(&self) -> Address;

    fn symbol(&self) -> Result<String>;

    fn balance_of(&self, owner: Address) -> Result<U256>;

    fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;

    /// Set `spender`'s allowance over `owner`'s balance.
    ///
    /// Postconditions:
    /// - The returned receipt is for a mined, confirmed transaction.
    fn approve(&self, owner: Address, spender: Address, amount: U256) -> Result<TxReceipt>;
}

/// The pool registry/factory contract.
///
/// The registry is shared, append-only state accumulating role grants and
/// created pools across all runs; callers must re-read it before acting and
/// never mirror it locally.
pub trait PoolRegistry {
    /// Grant `role` to `grantee`.
    ///
    /// Postconditions:
    /// - Re-granting an already-held role succeeds (append-only registry).
    fn grant_role(&self, role: RoleId, grantee: Address, acting: Address) -> Result<TxReceipt>;

    /// Canonical on-chain mirror of [`mask::encode_flags`]; the two must
    /// always agree.
    fn generate_eligibility_mask(&self, flags: &[bool]) -> Result<U256>;

    /// Current fee to attach as transferred value on [`Self::create_pool`].
    fn pool_creation_fee(&self) -> Result<U256>;

    /// Submit pool creation, paying `fee` as transferred value.
    ///
    /// Preconditions:
    /// - Every token flagged in either mask already holds the corresponding
    ///   eligibility role; creation validates eligibility synchronously.
    fn create_pool(
        &self,
        request: &PoolCreationRequest,
        fee: U256,
        acting: Address,
    ) -> Result<TxReceipt>;
}

/// A deployed pool instance.
pub trait StakingPool {
    fn address(&self) -> Address;

    /// Address of the pool's reward token.
    fn reward_token(&self) -> Result<Address>;

    /// Address of the pool's staking token.
    fn staking_token(&self) -> Result<Address>;

    /// Register the reward-token balance available for distribution.
    /// Emits the reward-added event carrying the registered total.
    fn register_reward_balance(&self, amount: U256, acting: Address) -> Result<TxReceipt>;

    /// Release one distribution tranche, sized by the pool's per-cycle
    /// basis-point rate. Only valid once a reward balance has committed.
    /// Emits the part-distributed event carrying the released amount.
    fn release_distribution_tranche(&self, acting: Address) -> Result<TxReceipt>;
}

/// Chain-level reads plus construction of contract handles.
pub trait ChainProvider {
    type Registry: PoolRegistry;
    type Pool: StakingPool;
    type Token: TokenHandle;

    /// Timestamp of the latest block.
    fn current_timestamp(&self) -> Result<u64>;

    fn registry(&self) -> Result<Self::Registry>;

    fn pool(&self, address: Address) -> Result<Self::Pool>;

    fn token(&self, address: Address) -> Result<Self::Token>;
}
