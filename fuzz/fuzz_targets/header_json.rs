#![no_main]

use bitweb_consensus::{calc_work, compact_to_big, hash_to_big, header_hash, BlockHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = serde_json::from_slice::<BlockHeader>(data) {
        let hash = hash_to_big(&header_hash(&header));
        let _ = hash <= compact_to_big(header.bits);
        let _ = calc_work(header.bits);
    }
});
