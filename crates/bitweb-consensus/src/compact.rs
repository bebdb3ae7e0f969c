//! Compact ("nBits") number encoding.
//!
//! A compact value packs a signed integer into 32 bits much like a
//! floating point number:
//!
//! ```text
//! | exponent (bits 31-24) | sign (bit 23) | mantissa (bits 22-00) |
//! ```
//!
//! `N = (-1^sign) * mantissa * 256^(exponent-3)`
//!
//! Only 23 bits of precision survive an encode, so `compact_to_big` and
//! `big_to_compact` are inverses only for values that were themselves
//! produced by `compact_to_big`.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

const MANTISSA_MASK: u32 = 0x007f_ffff;
const SIGN_BIT: u32 = 0x0080_0000;

/// Decode a compact value into a signed big integer.
///
/// A zero magnitude yields zero even when the sign bit is set.
pub fn compact_to_big(compact: u32) -> BigInt {
	let mut mantissa = compact & MANTISSA_MASK;
	let is_negative = compact & SIGN_BIT != 0;
	let exponent = compact >> 24;

	// The exponent counts bytes, so shift the mantissa by whole bytes.
	let magnitude = if exponent <= 3 {
		mantissa >>= 8 * (3 - exponent);
		BigUint::from(mantissa)
	} else {
		BigUint::from(mantissa) << (8 * (exponent - 3) as usize)
	};

	if magnitude.is_zero() {
		return BigInt::zero();
	}
	let sign = if is_negative { Sign::Minus } else { Sign::Plus };
	BigInt::from_biguint(sign, magnitude)
}

/// Interpret a hash, stored little-endian, as an unsigned integer so it can
/// be compared against a decoded target.
pub fn hash_to_big(hash: &[u8; 32]) -> BigInt {
	BigInt::from_bytes_le(Sign::Plus, hash)
}

/// Encode a signed big integer into its compact form, keeping only the
/// most significant 23 bits of the magnitude.
pub fn big_to_compact(n: &BigInt) -> u32 {
	if n.is_zero() {
		return 0;
	}

	let magnitude = n.magnitude();
	let mut exponent = magnitude.to_bytes_be().len() as u32;
	let mut mantissa = if exponent <= 3 {
		// Fits in three bytes, so the low digit is the whole value.
		magnitude.to_u32().unwrap_or(0) << (8 * (3 - exponent))
	} else {
		let shifted = magnitude >> (8 * (exponent - 3) as usize);
		shifted.iter_u32_digits().next().unwrap_or(0)
	};

	// A mantissa with bit 23 set would read back as negative; give up a
	// byte of precision instead.
	if mantissa & SIGN_BIT != 0 {
		mantissa >>= 8;
		exponent += 1;
	}

	let mut compact = (exponent << 24) | mantissa;
	if n.is_negative() {
		compact |= SIGN_BIT;
	}
	compact
}
