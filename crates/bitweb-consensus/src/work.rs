use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

use crate::compact::compact_to_big;

/// Work represented by a block with the given difficulty bits.
///
/// Work is the inverse of the target: `floor(2^256 / (target + 1))`.
/// Bits that decode to a zero or negative target contribute no work rather
/// than failing, since historical or adversarial headers may carry them.
pub fn calc_work(bits: u32) -> BigUint {
	let target = compact_to_big(bits);
	if !target.is_positive() {
		return BigUint::zero();
	}

	let denominator = (target + BigInt::one()).magnitude().clone();
	let numerator = BigUint::one() << 256usize;
	numerator / denominator
}
