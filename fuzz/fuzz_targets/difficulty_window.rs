#![no_main]

use bitweb_chain::{calc_easiest_difficulty, ChainState};
use bitweb_consensus::{compact_to_big, header_hash, BlockHeader, ChainParams};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

// Each input byte pair is one block: a solve time and a bits perturbation.
fuzz_target!(|data: &[u8]| {
    let params = ChainParams::regtest();
    let Ok(state) = ChainState::new(params.clone()) else {
        return;
    };
    let mut prev = params.genesis.clone();
    for (nonce, chunk) in data.chunks_exact(2).take(400).enumerate() {
        let time = prev.time.saturating_add(u32::from(chunk[0]) * 4);
        let Ok(mut bits) = state.next_required_difficulty(i64::from(time)) else {
            panic!("retarget failed on a well-formed chain");
        };
        if chunk[1] & 0x80 != 0 {
            bits = bits.saturating_sub(u32::from(chunk[1] & 0x7f));
        }
        let header = BlockHeader {
            version: 1,
            prev_block_hash: header_hash(&prev),
            merkle_root: [0u8; 32],
            time,
            bits,
            nonce: nonce as u32,
        };
        if state.connect_header(&header, false).is_err() {
            return;
        }
        prev = header;
    }

    if let Ok(bits) = state.next_required_difficulty(0) {
        assert!(compact_to_big(bits) <= params.pow_limit);
    }
    let easiest = calc_easiest_difficulty(&params, prev.bits, Duration::from_secs(u64::from(prev.time)));
    assert!(compact_to_big(easiest) <= params.pow_limit);
});
