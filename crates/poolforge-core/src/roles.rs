//! Token eligibility roles.
//!
//! Before a pool can reference a token as stakeable or reward-bearing, the
//! registry must hold a role grant for that token. Role identifiers follow
//! the access-control convention: the keccak256 hash of the role's name.

use crate::{PoolRegistry, Result};
use alloy_primitives::{keccak256, Address, B256};
use tracing::debug;

/// Name of the role marking a token as stakeable.
pub const STAKING_TOKEN_ROLE: &str = "STAKING_TOKEN_ROLE";

/// Name of the role marking a token as reward-bearing.
pub const REWARD_TOKEN_ROLE: &str = "REWARD_TOKEN_ROLE";

/// Identifier of an eligibility role: keccak256 of its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleId(pub B256);

/// Derive the role identifier from a role name.
pub fn role_id(name: &str) -> RoleId {
    RoleId(keccak256(name.as_bytes()))
}

/// Grant `role` to every token whose flag is set.
///
/// Grants are issued sequentially, each confirmed before the next, and the
/// first failure aborts the remainder. Re-granting an already-held role is a
/// registry-level no-op, so re-runs are safe.
pub fn grant_token_roles<R: PoolRegistry>(
    registry: &R,
    tokens: &[Address],
    flags: &[bool],
    role: RoleId,
    acting: Address,
) -> Result<()> {
    if tokens.len() != flags.len() {
        return Err(crate::ProvisionError::Config(format!(
            "lengths of tokens and flags are not equal: {} != {}",
            tokens.len(),
            flags.len()
        )));
    }
    for (&token, &flag) in tokens.iter().zip(flags) {
        if !flag {
            continue;
        }
        let receipt = registry.grant_role(role, token, acting)?;
        debug!(role = %role.0, %token, tx = %receipt.tx_hash, "granted token role");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TxReceipt;
    use crate::{PoolCreationRequest, ProvisionError};
    use alloy_primitives::U256;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRegistry {
        grants: Mutex<Vec<(RoleId, Address)>>,
    }

    impl PoolRegistry for RecordingRegistry {
        fn grant_role(&self, role: RoleId, grantee: Address, _acting: Address) -> Result<TxReceipt> {
            self.grants.lock().unwrap().push((role, grantee));
            Ok(TxReceipt {
                tx_hash: B256::ZERO,
                events: Vec::new(),
            })
        }

        fn generate_eligibility_mask(&self, flags: &[bool]) -> Result<U256> {
            crate::mask::encode_flags(flags)
        }

        fn pool_creation_fee(&self) -> Result<U256> {
            Ok(U256::ZERO)
        }

        fn create_pool(
            &self,
            _request: &PoolCreationRequest,
            _fee: U256,
            _acting: Address,
        ) -> Result<TxReceipt> {
            unimplemented!("not exercised here")
        }
    }

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn grants_only_flagged_tokens_in_order() {
        let registry = RecordingRegistry::default();
        let tokens = [addr(1), addr(2), addr(3)];
        let role = role_id(STAKING_TOKEN_ROLE);

        grant_token_roles(&registry, &tokens, &[true, false, true], role, addr(0xaa)).unwrap();

        let grants = registry.grants.lock().unwrap();
        assert_eq!(&*grants, &[(role, addr(1)), (role, addr(3))]);
    }

    #[test]
    fn length_mismatch_rejected_before_any_grant() {
        let registry = RecordingRegistry::default();
        let err =
            grant_token_roles(&registry, &[addr(1)], &[true, false], role_id("X"), addr(0xaa))
                .unwrap_err();

        assert!(matches!(err, ProvisionError::Config(_)));
        assert!(registry.grants.lock().unwrap().is_empty());
    }

    #[test]
    fn regranting_is_accepted() {
        let registry = RecordingRegistry::default();
        let role = role_id(REWARD_TOKEN_ROLE);
        for _ in 0..2 {
            grant_token_roles(&registry, &[addr(1)], &[true], role, addr(0xaa)).unwrap();
        }
        assert_eq!(registry.grants.lock().unwrap().len(), 2);
    }

    #[test]
    fn role_ids_are_deterministic_and_distinct() {
        assert_eq!(role_id(STAKING_TOKEN_ROLE), role_id(STAKING_TOKEN_ROLE));
        assert_ne!(role_id(STAKING_TOKEN_ROLE), role_id(REWARD_TOKEN_ROLE));
    }
}
