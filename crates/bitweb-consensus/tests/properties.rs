//! Property tests for the compact codec and work derivation.

use bitweb_consensus::{big_to_compact, calc_work, compact_to_big};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use proptest::prelude::*;

/// Compact values whose decoded target stays below 2^120, where distinct
/// targets always map to distinct work values.
fn arb_small_positive_bits() -> impl Strategy<Value = u32> {
    (1u32..=15, 1u32..=0x007f_ffff).prop_map(|(exp, mant)| (exp << 24) | mant)
}

proptest! {
    #[test]
    fn decode_encode_decode_is_stable(bits in any::<u32>()) {
        let once = compact_to_big(bits);
        let canonical = big_to_compact(&once);
        prop_assert_eq!(compact_to_big(canonical), once);
        prop_assert_eq!(big_to_compact(&compact_to_big(canonical)), canonical);
    }

    #[test]
    fn encode_never_sets_sign_for_non_negative(value in any::<u128>()) {
        let bits = big_to_compact(&BigInt::from(value));
        prop_assert_eq!(bits & 0x0080_0000, 0);
    }

    #[test]
    fn negation_only_flips_sign_bit(value in 1u64..) {
        let positive = big_to_compact(&BigInt::from(value));
        let negative = big_to_compact(&-BigInt::from(value));
        prop_assert_eq!(positive | 0x0080_0000, negative);
    }

    #[test]
    fn non_positive_targets_have_zero_work(bits in any::<u32>().prop_map(|b| b | 0x0080_0000)) {
        let target = compact_to_big(bits);
        prop_assume!(!target.is_positive());
        prop_assert!(calc_work(bits).is_zero());
    }

    #[test]
    fn lower_target_has_more_work(a in arb_small_positive_bits(), b in arb_small_positive_bits()) {
        let (ta, tb) = (compact_to_big(a), compact_to_big(b));
        prop_assume!(ta.is_positive() && tb.is_positive() && ta != tb);
        let (low, high) = if ta < tb { (ta, tb) } else { (tb, ta) };
        prop_assert!(calc_work(big_to_compact(&low)) > calc_work(big_to_compact(&high)));
    }

    #[test]
    fn work_never_increases_with_target(a in any::<u32>(), b in any::<u32>()) {
        let (ta, tb) = (compact_to_big(a), compact_to_big(b));
        prop_assume!(ta.is_positive() && tb.is_positive());
        if ta < tb {
            prop_assert!(calc_work(a) >= calc_work(b));
        }
    }
}

#[test]
fn zero_is_fixed_point() {
    assert_eq!(compact_to_big(0), BigInt::zero());
    assert_eq!(big_to_compact(&BigInt::zero()), 0);
}
