use bitweb_chain::{get_skip_height, ChainState, ChainView};
use bitweb_consensus::{compact_to_big, BlockHeader, ChainParams};
use num_traits::Signed;
use proptest::prelude::*;

fn grow(spacings: &[u32]) -> ChainState {
    let state = ChainState::new(ChainParams::regtest()).unwrap();
    for (nonce, spacing) in spacings.iter().enumerate() {
        let mut guard = state.write();
        let tip = guard.tip().unwrap();
        let node = guard.view().node(tip).unwrap().clone();
        let time = (node.timestamp + i64::from(*spacing)) as u32;
        let bits = guard.calc_next_required_difficulty(tip, i64::from(time)).unwrap();
        let header = BlockHeader {
            version: 1,
            prev_block_hash: node.hash,
            merkle_root: [1u8; 32],
            time,
            bits,
            nonce: nonce as u32,
        };
        guard.connect_header(&header, true).unwrap();
    }
    state
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn retarget_stays_within_pow_limit(spacings in prop::collection::vec(1u32..600, 95..160)) {
        let state = grow(&spacings);
        let limit = compact_to_big(state.params().pow_limit_bits);
        let bits = state.next_required_difficulty(0).unwrap();
        let target = compact_to_big(bits);
        prop_assert!(target.is_positive());
        prop_assert!(target <= limit);
    }

    #[test]
    fn retarget_ignores_candidate_time(
        spacings in prop::collection::vec(1u32..600, 95..130),
        a in any::<i64>(),
        b in any::<i64>(),
    ) {
        let state = grow(&spacings);
        prop_assert_eq!(
            state.next_required_difficulty(a).unwrap(),
            state.next_required_difficulty(b).unwrap()
        );
    }

    #[test]
    fn ancestor_heights_are_exact(len in 2usize..400, pick in any::<prop::sample::Index>()) {
        let state = grow(&vec![60; len - 1]);
        let guard = state.read();
        let index = guard.view();
        let tip = index.tip().unwrap();
        let height = pick.index(len) as i32;
        let found = index.ancestor(tip, height).unwrap();
        prop_assert_eq!(index.node(found).unwrap().height, height);
        prop_assert!(get_skip_height(height) <= height);
    }
}
