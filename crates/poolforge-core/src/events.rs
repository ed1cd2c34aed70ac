//! Confirmed-transaction receipts and emitted events.
//!
//! Every state-changing call in the pipeline returns a [`TxReceipt`] that
//! carries only the events emitted by that transaction. Scoping events to
//! their receipt means a lookup never sees another transaction's emissions,
//! so within a receipt the first event with a matching name is taken.

use crate::{ProvisionError, Result};
use alloy_primitives::{Address, B256, U256};

/// Event emitted by the registry when a pool is created; carries the new
/// pool's address.
pub const POOL_CREATED: &str = "PoolCreated";

/// Event emitted when a reward balance is registered for distribution.
pub const REWARD_ADDED: &str = "RewardAdded";

/// Event emitted when one distribution tranche is released.
pub const PART_DISTRIBUTED: &str = "PartDistributed";

/// Event emitted when a participant stakes into a pool.
pub const STAKED: &str = "Staked";

/// Event emitted when a participant withdraws from a pool.
pub const WITHDRAWN: &str = "Withdrawn";

/// A decoded event field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

/// One decoded event with its named fields, in emission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedEvent {
    pub name: String,
    pub fields: Vec<(String, EventValue)>,
}

impl EmittedEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: &str, value: EventValue) -> Self {
        self.fields.push((key.to_owned(), value));
        self
    }

    fn lookup(&self, key: &str) -> Option<&EventValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Read a named field as an address.
    pub fn address_field(&self, key: &str) -> Result<Address> {
        match self.lookup(key) {
            Some(EventValue::Address(addr)) => Ok(*addr),
            _ => Err(ProvisionError::MalformedEvent {
                event: self.name.clone(),
                field: key.to_owned(),
            }),
        }
    }

    /// Read a named field as an unsigned integer.
    pub fn uint_field(&self, key: &str) -> Result<U256> {
        match self.lookup(key) {
            Some(EventValue::Uint(value)) => Ok(*value),
            _ => Err(ProvisionError::MalformedEvent {
                event: self.name.clone(),
                field: key.to_owned(),
            }),
        }
    }
}

/// Receipt of a mined, confirmed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    /// Events emitted by this transaction only.
    pub events: Vec<EmittedEvent>,
}

/// Find the first event named `name` in the receipt.
///
/// A confirmed transaction that did not emit an expected event is treated as
/// fatal, not retried: the receipt is final.
pub fn first_event<'r>(receipt: &'r TxReceipt, name: &str) -> Result<&'r EmittedEvent> {
    receipt
        .events
        .iter()
        .find(|event| event.name == name)
        .ok_or_else(|| ProvisionError::EventNotFound {
            event: name.to_owned(),
            tx_hash: receipt.tx_hash,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(events: Vec<EmittedEvent>) -> TxReceipt {
        TxReceipt {
            tx_hash: B256::repeat_byte(0x42),
            events,
        }
    }

    #[test]
    fn missing_event_reports_tx_hash() {
        let err = first_event(&receipt(vec![]), POOL_CREATED).unwrap_err();
        match err {
            ProvisionError::EventNotFound { event, tx_hash } => {
                assert_eq!(event, POOL_CREATED);
                assert_eq!(tx_hash, B256::repeat_byte(0x42));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_of_multiple_matches_wins() {
        let first = EmittedEvent::new(REWARD_ADDED)
            .field("amount", EventValue::Uint(U256::from(1u64)));
        let second = EmittedEvent::new(REWARD_ADDED)
            .field("amount", EventValue::Uint(U256::from(2u64)));
        let receipt = receipt(vec![first.clone(), second]);

        assert_eq!(first_event(&receipt, REWARD_ADDED).unwrap(), &first);
    }

    #[test]
    fn typed_accessors_read_fields() {
        let event = EmittedEvent::new(POOL_CREATED)
            .field("pool", EventValue::Address(Address::repeat_byte(0x01)))
            .field("amount", EventValue::Uint(U256::from(7u64)));

        assert_eq!(
            event.address_field("pool").unwrap(),
            Address::repeat_byte(0x01)
        );
        assert_eq!(event.uint_field("amount").unwrap(), U256::from(7u64));
    }

    #[test]
    fn wrong_type_or_absent_field_is_malformed() {
        let event = EmittedEvent::new(POOL_CREATED)
            .field("pool", EventValue::Bool(true));

        assert!(matches!(
            event.address_field("pool"),
            Err(ProvisionError::MalformedEvent { .. })
        ));
        assert!(matches!(
            event.uint_field("absent"),
            Err(ProvisionError::MalformedEvent { .. })
        ));
    }
}
