//! Token approval reconciliation.
//!
//! Allowances are shared on-chain state; whether an approval is needed is
//! decided by reading the current allowance, never by remembering past runs.

use crate::{Result, TokenHandle};
use alloy_primitives::{Address, U256};
use tracing::{debug, info};

/// Ensure `spender` may move at least `required` of `owner`'s tokens, and
/// report `owner`'s current balance.
///
/// The balance is read and returned unconditionally, whether or not an
/// approval was submitted. If the current allowance already covers
/// `required`, no transaction is sent; otherwise the allowance is set to
/// `U256::MAX` so later consumption does not force re-approval.
pub fn reconcile_approval<T: TokenHandle>(
    token: &T,
    owner: Address,
    spender: Address,
    required: U256,
) -> Result<U256> {
    let balance = token.balance_of(owner)?;
    let allowance = token.allowance(owner, spender)?;
    if allowance < required {
        let receipt = token.approve(owner, spender, U256::MAX)?;
        info!(
            token = %token.symbol()?,
            %spender,
            tx = %receipt.tx_hash,
            "approved spender"
        );
    } else {
        debug!(token = %token.symbol()?, %spender, "allowance already sufficient");
    }
    Ok(balance)
}
