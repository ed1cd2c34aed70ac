//! In-memory chain simulating the registry, pools and ERC20-style tokens.
//!
//! One shared [`ChainState`] behind a mutex plays the chain; every handle
//! clones the `Arc` and locks per call, mirroring how independent contract
//! handles share one node connection. Mutating entry points validate fully
//! before touching state, so a revert leaves the chain unchanged.

use alloy_primitives::{keccak256, Address, U256};
use poolforge_core::events::{
    EmittedEvent, EventValue, TxReceipt, PART_DISTRIBUTED, POOL_CREATED, REWARD_ADDED, STAKED,
    WITHDRAWN,
};
use poolforge_core::roles::{role_id, RoleId, REWARD_TOKEN_ROLE, STAKING_TOKEN_ROLE};
use poolforge_core::{
    mask, ChainProvider, PoolCreationRequest, PoolRegistry, ProvisionError, Result, StakingPool,
    TokenHandle, BPS_DENOM, NO_BENEFICIARY, POOL_CREATION_FEE,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// ============================================================
// Chain state
// ============================================================

#[derive(Debug)]
struct TokenState {
    symbol: String,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Debug)]
struct PoolState {
    request: PoolCreationRequest,
    staking_token: Address,
    reward_token: Address,
    /// Registered rewards not yet released.
    reward_reserve: U256,
    /// Lifetime total of registered rewards.
    total_registered: U256,
    /// Released and claimable by stakers.
    claimable: U256,
    staked: HashMap<Address, U256>,
}

#[derive(Debug)]
struct ChainState {
    timestamp: u64,
    next_entity: u64,
    next_tx: u64,
    fee_beneficiary: Address,
    creation_fee: U256,
    collected_fees: U256,
    roles: HashSet<(RoleId, Address)>,
    tokens: HashMap<Address, TokenState>,
    pools: HashMap<Address, PoolState>,
}

impl ChainState {
    fn next_address(&mut self) -> Address {
        let hash = keccak256(self.next_entity.to_be_bytes());
        self.next_entity += 1;
        Address::from_word(hash)
    }

    fn next_receipt(&mut self, events: Vec<EmittedEvent>) -> TxReceipt {
        let tx_hash = keccak256(self.next_tx.to_be_bytes());
        self.next_tx += 1;
        TxReceipt { tx_hash, events }
    }

    fn create_token(&mut self, symbol: &str, owner: Address, supply: U256) -> Address {
        let address = self.next_address();
        let mut balances = HashMap::new();
        balances.insert(owner, supply);
        self.tokens.insert(
            address,
            TokenState {
                symbol: symbol.to_owned(),
                balances,
                allowances: HashMap::new(),
            },
        );
        address
    }

    fn token(&self, address: Address) -> Result<&TokenState> {
        self.tokens
            .get(&address)
            .ok_or_else(|| ProvisionError::Query(format!("no token deployed at {address}")))
    }

    fn token_mut(&mut self, address: Address) -> Result<&mut TokenState> {
        self.tokens
            .get_mut(&address)
            .ok_or_else(|| ProvisionError::Query(format!("no token deployed at {address}")))
    }

    fn pool(&self, address: Address) -> Result<&PoolState> {
        self.pools
            .get(&address)
            .ok_or_else(|| ProvisionError::Query(format!("no pool deployed at {address}")))
    }

    fn pool_mut(&mut self, address: Address) -> Result<&mut PoolState> {
        self.pools
            .get_mut(&address)
            .ok_or_else(|| ProvisionError::Query(format!("no pool deployed at {address}")))
    }

    fn balance(&self, token: Address, owner: Address) -> Result<U256> {
        Ok(self
            .token(token)?
            .balances
            .get(&owner)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    fn credit(&mut self, token: Address, owner: Address, amount: U256) -> Result<()> {
        let entry = self
            .token_mut(token)?
            .balances
            .entry(owner)
            .or_insert(U256::ZERO);
        *entry += amount;
        Ok(())
    }

    fn debit(&mut self, token: Address, owner: Address, amount: U256) -> Result<()> {
        let state = self.token_mut(token)?;
        let balance = state.balances.entry(owner).or_insert(U256::ZERO);
        if *balance < amount {
            return Err(ProvisionError::Reverted(format!(
                "insufficient balance of {owner}: {balance} < {amount}"
            )));
        }
        *balance -= amount;
        Ok(())
    }

    /// Consume `amount` of `spender`'s allowance over `owner`'s balance.
    /// A maximal allowance is treated as unlimited and never decremented.
    fn spend_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        let state = self.token_mut(token)?;
        let allowance = state
            .allowances
            .entry((owner, spender))
            .or_insert(U256::ZERO);
        if *allowance < amount {
            return Err(ProvisionError::Reverted(format!(
                "allowance of {spender} over {owner} too small: {allowance} < {amount}"
            )));
        }
        if *allowance != U256::MAX {
            *allowance -= amount;
        }
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.spend_allowance(token, owner, spender, amount)?;
        self.debit(token, owner, amount)?;
        self.credit(token, to, amount)
    }
}

// ============================================================
// Chain handle
// ============================================================

/// An in-memory chain with a registry pre-deployed.
#[derive(Clone)]
pub struct InMemoryChain {
    state: Arc<Mutex<ChainState>>,
}

fn lock(state: &Arc<Mutex<ChainState>>) -> Result<MutexGuard<'_, ChainState>> {
    state
        .lock()
        .map_err(|_| ProvisionError::Query("chain state poisoned".to_owned()))
}

impl InMemoryChain {
    pub fn new(genesis_timestamp: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                timestamp: genesis_timestamp,
                next_entity: 0,
                next_tx: 0,
                fee_beneficiary: NO_BENEFICIARY,
                creation_fee: POOL_CREATION_FEE,
                collected_fees: U256::ZERO,
                roles: HashSet::new(),
                tokens: HashMap::new(),
                pools: HashMap::new(),
            })),
        }
    }

    /// Deploy a token with `supply` minted to `owner`.
    pub fn deploy_token(&self, symbol: &str, owner: Address, supply: U256) -> Result<Address> {
        let mut state = lock(&self.state)?;
        let address = state.create_token(symbol, owner, supply);
        debug!(%address, symbol, "deployed token");
        Ok(address)
    }

    /// Reprice pool creation and redirect its fee.
    pub fn set_payment_info(&self, beneficiary: Address, fee: U256) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        state.fee_beneficiary = beneficiary;
        state.creation_fee = fee;
        let receipt = state.next_receipt(vec![EmittedEvent::new("PaymentInfoSet")
            .field("beneficiary", EventValue::Address(beneficiary))
            .field("fee", EventValue::Uint(fee))]);
        Ok(receipt)
    }

    pub fn advance_time(&self, secs: u64) -> Result<()> {
        lock(&self.state)?.timestamp += secs;
        Ok(())
    }

    /// Number of transactions mined so far.
    pub fn tx_count(&self) -> Result<u64> {
        Ok(lock(&self.state)?.next_tx)
    }

    /// Creation fees collected by the registry to date.
    pub fn collected_fees(&self) -> Result<U256> {
        Ok(lock(&self.state)?.collected_fees)
    }
}

impl ChainProvider for InMemoryChain {
    type Registry = MemoryRegistry;
    type Pool = MemoryPool;
    type Token = MemoryToken;

    fn current_timestamp(&self) -> Result<u64> {
        Ok(lock(&self.state)?.timestamp)
    }

    fn registry(&self) -> Result<MemoryRegistry> {
        Ok(MemoryRegistry {
            state: self.state.clone(),
        })
    }

    fn pool(&self, address: Address) -> Result<MemoryPool> {
        lock(&self.state)?.pool(address)?;
        Ok(MemoryPool {
            state: self.state.clone(),
            address,
        })
    }

    fn token(&self, address: Address) -> Result<MemoryToken> {
        lock(&self.state)?.token(address)?;
        Ok(MemoryToken {
            state: self.state.clone(),
            address,
        })
    }
}

// ============================================================
// Registry handle
// ============================================================

pub struct MemoryRegistry {
    state: Arc<Mutex<ChainState>>,
}

impl MemoryRegistry {
    /// Check the request and collect the per-token debits it implies, before
    /// anything mutates.
    fn check_creation(
        state: &ChainState,
        request: &PoolCreationRequest,
        fee: U256,
        acting: Address,
    ) -> Result<HashMap<Address, U256>> {
        if fee != state.creation_fee {
            return Err(ProvisionError::Reverted(format!(
                "wrong provisioning fee: {} != {}",
                fee, state.creation_fee
            )));
        }
        if request.start_timestamp <= state.timestamp {
            return Err(ProvisionError::Reverted(format!(
                "pool start {} is not in the future (now {})",
                request.start_timestamp, state.timestamp
            )));
        }
        if request.end_timestamp <= request.start_timestamp {
            return Err(ProvisionError::Reverted(
                "pool ends before it starts".to_owned(),
            ));
        }

        let staking_flags = mask::decode_mask(request.staking_mask, request.tokens.len())?;
        let reward_flags = mask::decode_mask(request.reward_mask, request.tokens.len())?;
        for (kind, role, flags) in [
            ("staking", role_id(STAKING_TOKEN_ROLE), &staking_flags),
            ("reward", role_id(REWARD_TOKEN_ROLE), &reward_flags),
        ] {
            for (&token, &flag) in request.tokens.iter().zip(flags) {
                if flag && !state.roles.contains(&(role, token)) {
                    return Err(ProvisionError::Reverted(format!(
                        "token {token} lacks {kind} eligibility"
                    )));
                }
            }
        }

        let mut debits: HashMap<Address, U256> = HashMap::new();
        for entry in request
            .initial_rewards
            .iter()
            .chain(&request.initial_deposits)
        {
            let token = *request.tokens.get(entry.token_index).ok_or_else(|| {
                ProvisionError::Reverted(format!(
                    "allocation references token index {} out of range",
                    entry.token_index
                ))
            })?;
            *debits.entry(token).or_insert(U256::ZERO) += entry.amount;
        }
        for (&token, &required) in &debits {
            let held = state.balance(token, acting)?;
            if held < required {
                return Err(ProvisionError::Reverted(format!(
                    "insufficient balance of {acting}: {held} < {required}"
                )));
            }
        }
        Ok(debits)
    }
}

impl PoolRegistry for MemoryRegistry {
    fn grant_role(&self, role: RoleId, grantee: Address, _acting: Address) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        let mut events = Vec::new();
        // Re-granting is a no-op and emits nothing.
        if state.roles.insert((role, grantee)) {
            events.push(
                EmittedEvent::new("RoleGranted").field("grantee", EventValue::Address(grantee)),
            );
        }
        Ok(state.next_receipt(events))
    }

    fn generate_eligibility_mask(&self, flags: &[bool]) -> Result<U256> {
        mask::encode_flags(flags)
    }

    fn pool_creation_fee(&self) -> Result<U256> {
        Ok(lock(&self.state)?.creation_fee)
    }

    fn create_pool(
        &self,
        request: &PoolCreationRequest,
        fee: U256,
        acting: Address,
    ) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        Self::check_creation(&state, request, fee, acting)?;

        state.collected_fees += fee;
        let fee_beneficiary = state.fee_beneficiary;
        if fee_beneficiary != NO_BENEFICIARY {
            debug!(beneficiary = %fee_beneficiary, %fee, "creation fee forwarded");
        }

        let pool_address = state.next_address();
        let pool_index = state.pools.len();
        let staking_token =
            state.create_token(&format!("PFS-{pool_index}"), acting, U256::ZERO);
        let reward_token =
            state.create_token(&format!("PFR-{pool_index}"), acting, U256::ZERO);

        // The creation call itself authorizes the declared transfers: debit
        // each funded underlying and mint the matching synthetic token.
        for (entries, synthetic) in [
            (&request.initial_rewards, reward_token),
            (&request.initial_deposits, staking_token),
        ] {
            for entry in entries.iter() {
                if entry.amount == U256::ZERO {
                    continue;
                }
                let underlying = request.tokens[entry.token_index];
                state.debit(underlying, acting, entry.amount)?;
                state.credit(synthetic, acting, entry.amount)?;
            }
        }

        state.pools.insert(
            pool_address,
            PoolState {
                request: request.clone(),
                staking_token,
                reward_token,
                reward_reserve: U256::ZERO,
                total_registered: U256::ZERO,
                claimable: U256::ZERO,
                staked: HashMap::new(),
            },
        );

        let receipt = state.next_receipt(vec![EmittedEvent::new(POOL_CREATED)
            .field("pool", EventValue::Address(pool_address))]);
        debug!(pool = %pool_address, "pool created");
        Ok(receipt)
    }
}

// ============================================================
// Pool handle
// ============================================================

#[derive(Debug)]
pub struct MemoryPool {
    state: Arc<Mutex<ChainState>>,
    address: Address,
}

impl MemoryPool {
    /// Stake into the pool; requires a prior approval toward the pool.
    pub fn stake(&self, amount: U256, acting: Address) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        let pool = state.pool(self.address)?;
        if amount < pool.request.min_stake || amount > pool.request.max_stake {
            return Err(ProvisionError::Reverted(format!(
                "stake {amount} outside bounds [{}, {}]",
                pool.request.min_stake, pool.request.max_stake
            )));
        }
        let staking_token = pool.staking_token;
        state.transfer_from(staking_token, acting, self.address, self.address, amount)?;
        *state
            .pool_mut(self.address)?
            .staked
            .entry(acting)
            .or_insert(U256::ZERO) += amount;
        let receipt = state.next_receipt(vec![EmittedEvent::new(STAKED)
            .field("staker", EventValue::Address(acting))
            .field("amount", EventValue::Uint(amount))]);
        Ok(receipt)
    }

    /// Withdraw a staked amount back to the staker.
    pub fn withdraw(&self, amount: U256, acting: Address) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        let pool = state.pool_mut(self.address)?;
        let staked = pool.staked.entry(acting).or_insert(U256::ZERO);
        if *staked < amount {
            return Err(ProvisionError::Reverted(format!(
                "withdrawal {amount} exceeds staked {staked}"
            )));
        }
        *staked -= amount;
        let staking_token = pool.staking_token;
        state.debit(staking_token, self.address, amount)?;
        state.credit(staking_token, acting, amount)?;
        let receipt = state.next_receipt(vec![EmittedEvent::new(WITHDRAWN)
            .field("staker", EventValue::Address(acting))
            .field("amount", EventValue::Uint(amount))]);
        Ok(receipt)
    }

    /// Rewards released so far and claimable by stakers.
    pub fn claimable(&self) -> Result<U256> {
        Ok(lock(&self.state)?.pool(self.address)?.claimable)
    }

    pub fn staked_balance(&self, staker: Address) -> Result<U256> {
        Ok(lock(&self.state)?
            .pool(self.address)?
            .staked
            .get(&staker)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    pub fn start_timestamp(&self) -> Result<u64> {
        Ok(lock(&self.state)?.pool(self.address)?.request.start_timestamp)
    }

    pub fn end_timestamp(&self) -> Result<u64> {
        Ok(lock(&self.state)?.pool(self.address)?.request.end_timestamp)
    }
}

impl StakingPool for MemoryPool {
    fn address(&self) -> Address {
        self.address
    }

    fn reward_token(&self) -> Result<Address> {
        Ok(lock(&self.state)?.pool(self.address)?.reward_token)
    }

    fn staking_token(&self) -> Result<Address> {
        Ok(lock(&self.state)?.pool(self.address)?.staking_token)
    }

    fn register_reward_balance(&self, amount: U256, acting: Address) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        let reward_token = state.pool(self.address)?.reward_token;
        state.transfer_from(reward_token, acting, self.address, self.address, amount)?;
        let pool = state.pool_mut(self.address)?;
        pool.reward_reserve += amount;
        pool.total_registered += amount;
        let receipt = state.next_receipt(vec![EmittedEvent::new(REWARD_ADDED)
            .field("amount", EventValue::Uint(amount))]);
        Ok(receipt)
    }

    fn release_distribution_tranche(&self, _acting: Address) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        let pool = state.pool_mut(self.address)?;
        if pool.total_registered == U256::ZERO {
            return Err(ProvisionError::Reverted(
                "no reward balance registered".to_owned(),
            ));
        }
        let tranche = pool
            .reward_reserve
            .checked_mul(U256::from(pool.request.reward_bps_per_distribution))
            .ok_or_else(|| ProvisionError::Reverted("tranche size overflow".to_owned()))?
            / U256::from(BPS_DENOM);
        pool.reward_reserve -= tranche;
        pool.claimable += tranche;
        let receipt = state.next_receipt(vec![EmittedEvent::new(PART_DISTRIBUTED)
            .field("amount", EventValue::Uint(tranche))]);
        Ok(receipt)
    }
}

// ============================================================
// Token handle
// ============================================================

pub struct MemoryToken {
    state: Arc<Mutex<ChainState>>,
    address: Address,
}

impl TokenHandle for MemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn symbol(&self) -> Result<String> {
        Ok(lock(&self.state)?.token(self.address)?.symbol.clone())
    }

    fn balance_of(&self, owner: Address) -> Result<U256> {
        lock(&self.state)?.balance(self.address, owner)
    }

    fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        Ok(lock(&self.state)?
            .token(self.address)?
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    fn approve(&self, owner: Address, spender: Address, amount: U256) -> Result<TxReceipt> {
        let mut state = lock(&self.state)?;
        state
            .token_mut(self.address)?
            .allowances
            .insert((owner, spender), amount);
        let receipt = state.next_receipt(vec![EmittedEvent::new("Approval")
            .field("owner", EventValue::Address(owner))
            .field("spender", EventValue::Address(spender))
            .field("amount", EventValue::Uint(amount))]);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolforge_core::AllocationEntry;

    fn operator() -> Address {
        Address::repeat_byte(0x11)
    }

    fn chain_with_token() -> (InMemoryChain, Address) {
        let chain = InMemoryChain::new(1_000);
        let token = chain
            .deploy_token("ABC", operator(), U256::from(1_000_000u64))
            .unwrap();
        (chain, token)
    }

    fn basic_request(token: Address, start: u64) -> PoolCreationRequest {
        PoolCreationRequest {
            prototype: 0,
            start_timestamp: start,
            end_timestamp: start + 100,
            min_stake: U256::ZERO,
            max_stake: U256::MAX,
            min_lockup_secs: 0,
            early_withdrawal_fee_bps: 0,
            deposit_withdraw_fee_bps: 0,
            reward_bps_per_distribution: 1_000,
            staking_mask: U256::from(1u64),
            reward_mask: U256::from(1u64),
            custom_params: Vec::new(),
            tokens: vec![token],
            initial_rewards: vec![AllocationEntry {
                token_index: 0,
                amount: U256::from(500u64),
            }],
            initial_deposits: Vec::new(),
        }
    }

    fn grant_both_roles(registry: &MemoryRegistry, token: Address) {
        for role in [role_id(STAKING_TOKEN_ROLE), role_id(REWARD_TOKEN_ROLE)] {
            registry.grant_role(role, token, operator()).unwrap();
        }
    }

    #[test]
    fn wrong_fee_reverts_without_state_change() {
        let (chain, token) = chain_with_token();
        let registry = chain.registry().unwrap();
        grant_both_roles(&registry, token);

        let err = registry
            .create_pool(&basic_request(token, 1_001), U256::ZERO, operator())
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Reverted(_)));
        assert_eq!(chain.collected_fees().unwrap(), U256::ZERO);
    }

    #[test]
    fn creation_requires_eligibility_roles() {
        let (chain, token) = chain_with_token();
        let registry = chain.registry().unwrap();

        let err = registry
            .create_pool(&basic_request(token, 1_001), POOL_CREATION_FEE, operator())
            .unwrap_err();

        match err {
            ProvisionError::Reverted(msg) => assert!(msg.contains("eligibility")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn creation_requires_future_start() {
        let (chain, token) = chain_with_token();
        let registry = chain.registry().unwrap();
        grant_both_roles(&registry, token);

        let err = registry
            .create_pool(&basic_request(token, 1_000), POOL_CREATION_FEE, operator())
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Reverted(_)));
    }

    #[test]
    fn unknown_pool_address_is_a_query_error() {
        let chain = InMemoryChain::new(1_000);
        let err = chain.pool(Address::repeat_byte(0x99)).unwrap_err();
        assert!(matches!(err, ProvisionError::Query(_)));
    }

    #[test]
    fn reward_registration_requires_allowance() {
        let (chain, token) = chain_with_token();
        let registry = chain.registry().unwrap();
        grant_both_roles(&registry, token);

        let receipt = registry
            .create_pool(&basic_request(token, 1_001), POOL_CREATION_FEE, operator())
            .unwrap();
        let pool_address = poolforge_core::events::first_event(&receipt, POOL_CREATED)
            .unwrap()
            .address_field("pool")
            .unwrap();
        let pool = chain.pool(pool_address).unwrap();

        // No approval toward the pool yet.
        let err = pool
            .register_reward_balance(U256::from(500u64), operator())
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Reverted(_)));
    }

    #[test]
    fn payment_info_repricing_takes_effect() {
        let (chain, token) = chain_with_token();
        let registry = chain.registry().unwrap();
        grant_both_roles(&registry, token);

        let new_fee = U256::from(7u64);
        chain
            .set_payment_info(Address::repeat_byte(0x55), new_fee)
            .unwrap();

        assert_eq!(registry.pool_creation_fee().unwrap(), new_fee);
        registry
            .create_pool(&basic_request(token, 1_001), new_fee, operator())
            .unwrap();
        assert_eq!(chain.collected_fees().unwrap(), new_fee);
    }
}
