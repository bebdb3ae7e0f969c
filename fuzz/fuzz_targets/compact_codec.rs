#![no_main]

use bitweb_consensus::{big_to_compact, calc_work, compact_to_big};
use libfuzzer_sys::fuzz_target;
use num_bigint::{BigInt, Sign};

fuzz_target!(|data: &[u8]| {
    if data.len() >= 4 {
        let bits = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let target = compact_to_big(bits);
        let canonical = big_to_compact(&target);
        assert_eq!(compact_to_big(canonical), target);
        let _ = calc_work(bits);
    }

    let sign = if data.first().is_some_and(|b| b & 1 == 1) { Sign::Minus } else { Sign::Plus };
    let bytes = data.get(1..).unwrap_or_default();
    // keep the exponent within one byte
    let value = BigInt::from_bytes_be(sign, &bytes[..bytes.len().min(32)]);
    let bits = big_to_compact(&value);
    assert_eq!(big_to_compact(&compact_to_big(bits)), bits);
});
