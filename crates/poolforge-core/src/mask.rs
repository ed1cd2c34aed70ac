//! Eligibility bitmask encoding.
//!
//! Token eligibility is submitted to the registry as a 256-bit mask: bit `i`
//! (LSB-first) corresponds to flag `i` of the token set. The registry exposes
//! a canonical on-chain encoder; this offline encoder must always agree with
//! it, and the pipeline uses this one to save a round trip.

use crate::{ProvisionError, Result};
use alloy_primitives::U256;

/// A 256-bit mask can address at most this many flags.
pub const MAX_FLAGS: usize = 256;

/// Encode a flag sequence into its bitmask, LSB-first.
///
/// An empty sequence encodes to zero. More than [`MAX_FLAGS`] flags cannot be
/// represented and is a configuration error.
pub fn encode_flags(flags: &[bool]) -> Result<U256> {
    if flags.len() > MAX_FLAGS {
        return Err(ProvisionError::Config(format!(
            "{} flags cannot be encoded in a {MAX_FLAGS}-bit mask",
            flags.len()
        )));
    }
    let mut mask = U256::ZERO;
    for (i, &flag) in flags.iter().enumerate() {
        if flag {
            mask |= U256::from(1u64) << i;
        }
    }
    Ok(mask)
}

/// Decode the low `len` bits of a mask back into flags.
pub fn decode_mask(mask: U256, len: usize) -> Result<Vec<bool>> {
    if len > MAX_FLAGS {
        return Err(ProvisionError::Config(format!(
            "cannot decode {len} flags from a {MAX_FLAGS}-bit mask"
        )));
    }
    Ok((0..len).map(|i| mask.bit(i)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_sequence_encodes_to_zero() {
        assert_eq!(encode_flags(&[]).unwrap(), U256::ZERO);
    }

    #[test]
    fn known_vector() {
        // bits 0 and 2 set
        let mask = encode_flags(&[true, false, true]).unwrap();
        assert_eq!(mask, U256::from(5u64));
    }

    #[test]
    fn all_false_encodes_to_zero() {
        assert_eq!(encode_flags(&[false; 8]).unwrap(), U256::ZERO);
    }

    #[test]
    fn highest_bit_is_representable() {
        let mut flags = vec![false; MAX_FLAGS];
        flags[MAX_FLAGS - 1] = true;
        let mask = encode_flags(&flags).unwrap();
        assert!(mask.bit(MAX_FLAGS - 1));
    }

    #[test]
    fn oversized_sequence_rejected() {
        let flags = vec![true; MAX_FLAGS + 1];
        assert!(matches!(
            encode_flags(&flags),
            Err(ProvisionError::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn round_trip(flags in proptest::collection::vec(any::<bool>(), 0..=MAX_FLAGS)) {
            let mask = encode_flags(&flags).unwrap();
            let decoded = decode_mask(mask, flags.len()).unwrap();
            prop_assert_eq!(decoded, flags);
        }
    }
}
