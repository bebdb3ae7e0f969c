//! Header chain bookkeeping and proof-of-work retargeting for Bitweb.

mod block_index;
mod difficulty;
mod error;
mod state;

pub use block_index::{get_skip_height, BlockIndex, BlockNode, ChainView, NodeId, MEDIAN_TIME_BLOCKS};
pub use difficulty::{
    calc_easiest_difficulty, calc_next_required_difficulty, find_prev_testnet_difficulty,
    LWMA_TARGET_SPACING, LWMA_WINDOW, MAX_EASIEST_DURATION_SECS,
};
pub use error::ChainError;
pub use state::{ChainReadGuard, ChainState, ChainWriteGuard};
