//! Difficulty retargeting.
//!
//! Heights up to the activation height retarget once per fixed interval.
//! Above it every block is retargeted from a linearly weighted moving
//! average (LWMA) of the last [`LWMA_WINDOW`] solve times.

use std::time::Duration;

use bitweb_consensus::{big_to_compact, compact_to_big, ChainParams, ConsensusError};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};
use tracing::{debug, trace, warn};

use crate::block_index::{BlockNode, ChainView, NodeId};
use crate::error::ChainError;

/// Number of blocks averaged by the LWMA retarget.
pub const LWMA_WINDOW: i32 = 90;
/// Desired LWMA solve time in seconds.
pub const LWMA_TARGET_SPACING: i64 = 60;
/// Normalizing constant `N * (N + 1) / 2 * T`.
const LWMA_K: i64 = LWMA_WINDOW as i64 * (LWMA_WINDOW as i64 + 1) / 2 * LWMA_TARGET_SPACING;

/// Longest duration `calc_easiest_difficulty` considers, in seconds.
pub const MAX_EASIEST_DURATION_SECS: i64 = i64::MAX / 1_000_000_000;

fn invariant(msg: String) -> ChainError {
    warn!("{msg}");
    ChainError::InvariantViolation(msg)
}

fn checked_blocks_per_retarget(params: &ChainParams) -> Result<i32, ChainError> {
    let blocks = params.blocks_per_retarget();
    if blocks <= 0 {
        return Err(ConsensusError::InvalidParams("blocks per retarget must be positive".to_string()).into());
    }
    Ok(blocks)
}

/// Required difficulty bits for the block following `last`.
///
/// `new_block_time` is the timestamp of the candidate block; neither
/// algorithm weighs it, it only appears in the retarget log.
pub fn calc_next_required_difficulty<V: ChainView + ?Sized>(
    view: &V,
    params: &ChainParams,
    last: NodeId,
    new_block_time: i64,
) -> Result<u32, ChainError> {
    let last_node = view.node(last).ok_or(ChainError::UnknownNode(last))?;
    if last_node.height > params.lwma_activation_height {
        return lwma_next_required_difficulty(view, params, last, last_node, new_block_time);
    }
    legacy_next_required_difficulty(view, params, last, last_node, new_block_time)
}

fn legacy_next_required_difficulty<V: ChainView + ?Sized>(
    view: &V,
    params: &ChainParams,
    last: NodeId,
    last_node: &BlockNode,
    new_block_time: i64,
) -> Result<u32, ChainError> {
    let blocks_per_retarget = checked_blocks_per_retarget(params)?;

    // Difficulty only changes on interval boundaries.
    if (last_node.height + 1) % blocks_per_retarget != 0 {
        return Ok(last_node.bits);
    }

    let first_height = last_node.height - (blocks_per_retarget - 1);
    let first_node = view
        .ancestor(last, first_height)
        .and_then(|id| view.node(id))
        .ok_or_else(|| {
            invariant(format!(
                "unable to obtain previous retarget block at height {first_height}"
            ))
        })?;

    if last_node.bits != first_node.bits {
        debug!(
            height = last_node.height + 1,
            "interval start bits {:08x} differ from tip bits {:08x}, keeping tip bits",
            first_node.bits,
            last_node.bits
        );
        return Ok(last_node.bits);
    }

    let actual_timespan = last_node.timestamp.saturating_sub(first_node.timestamp);
    let adjusted_timespan = if actual_timespan < params.min_retarget_timespan() {
        params.min_retarget_timespan()
    } else if actual_timespan > params.max_retarget_timespan() {
        params.max_retarget_timespan()
    } else {
        actual_timespan
    };

    let old_target = compact_to_big(last_node.bits);
    let target_timespan =
        params.target_time_per_block.as_secs() as i64 * i64::from(blocks_per_retarget);
    if target_timespan <= 0 {
        return Err(ConsensusError::InvalidParams("target time per block must be at least one second".to_string()).into());
    }
    let mut new_target =
        (&old_target * BigInt::from(adjusted_timespan)).div_floor(&BigInt::from(target_timespan));
    if new_target > params.pow_limit {
        new_target = params.pow_limit.clone();
    }
    let new_bits = big_to_compact(&new_target);

    debug!(height = last_node.height + 1, new_block_time, "difficulty retarget");
    debug!("old target {:08x} ({:064x})", last_node.bits, old_target);
    debug!("new target {:08x} ({:064x})", new_bits, compact_to_big(new_bits));
    debug!(
        "actual timespan {actual_timespan}s, adjusted timespan {adjusted_timespan}s, target timespan {target_timespan}s"
    );
    Ok(new_bits)
}

fn lwma_next_required_difficulty<V: ChainView + ?Sized>(
    view: &V,
    params: &ChainParams,
    last: NodeId,
    last_node: &BlockNode,
    new_block_time: i64,
) -> Result<u32, ChainError> {
    let height = last_node.height;
    if height <= LWMA_WINDOW {
        debug!(height, "not enough history for lwma, using pow limit");
        return Ok(params.pow_limit_bits);
    }

    let max_solvetime = 6 * LWMA_TARGET_SPACING;
    let divisor = BigInt::from(LWMA_K * i64::from(LWMA_WINDOW));
    let mut weighted_solvetime_sum: i64 = 0;
    let mut sum_target = BigInt::zero();

    for (weight, block_height) in (1i64..).zip(height - LWMA_WINDOW + 1..=height) {
        let block_id = view.ancestor(last, block_height).ok_or_else(|| {
            invariant(format!("missing lwma window block at height {block_height}"))
        })?;
        let block = view
            .node(block_id)
            .ok_or_else(|| invariant(format!("dangling node id {block_id}")))?;
        let prev_median = view
            .ancestor(block_id, block_height - 1)
            .and_then(|id| view.median_time_past(id))
            .ok_or_else(|| {
                invariant(format!("missing parent of lwma window block {block_height}"))
            })?;

        let solvetime = block
            .timestamp
            .saturating_sub(prev_median)
            .clamp(-max_solvetime, max_solvetime);
        weighted_solvetime_sum += solvetime * weight;

        let target = compact_to_big(block.bits);
        sum_target += target.div_floor(&divisor);
        trace!(height = block.height, solvetime, target = %target, "lwma window block");
    }

    // Keep the weighted sum at or above a tenth of its expected value.
    if weighted_solvetime_sum < LWMA_K / 10 {
        weighted_solvetime_sum = LWMA_K / 10;
    }

    let mut next_target = BigInt::from(weighted_solvetime_sum) * sum_target;
    let pow_limit = compact_to_big(params.pow_limit_bits);
    if next_target > pow_limit {
        next_target = pow_limit;
    }
    let next_bits = big_to_compact(&next_target);
    debug!(
        height = height + 1,
        new_block_time,
        weighted_solvetime_sum,
        "lwma retarget to {next_bits:08x}"
    );
    Ok(next_bits)
}

/// Easiest difficulty a block could legitimately claim `duration` after a
/// block with `bits`. Used to sanity check headers against a checkpoint.
pub fn calc_easiest_difficulty(params: &ChainParams, bits: u32, duration: Duration) -> u32 {
    let mut remaining = i64::try_from(duration.as_secs())
        .unwrap_or(i64::MAX)
        .min(MAX_EASIEST_DURATION_SECS);

    // Test networks allow minimum difficulty blocks once the reduction time
    // has elapsed.
    if params.reduce_min_difficulty
        && remaining > params.min_diff_reduction_time.as_secs() as i64
    {
        return params.pow_limit_bits;
    }

    let adjustment_factor = BigInt::from(params.retarget_adjustment_factor);
    let max_retarget_timespan = params.max_retarget_timespan().max(1);
    let mut new_target = compact_to_big(bits);
    // Scaling cannot move a non-positive target toward the limit.
    if !new_target.is_positive() {
        return bits;
    }
    while remaining > 0 && new_target < params.pow_limit {
        new_target *= &adjustment_factor;
        remaining -= max_retarget_timespan;
    }

    if new_target > params.pow_limit {
        new_target = params.pow_limit.clone();
    }
    big_to_compact(&new_target)
}

/// Bits of the nearest block at or below `start` that was not mined under
/// the test network minimum difficulty rule.
///
/// The chain write lock must be held for the whole walk. Prefer
/// [`crate::ChainWriteGuard::find_prev_testnet_difficulty`], which makes that
/// impossible to forget.
pub fn find_prev_testnet_difficulty<V: ChainView + ?Sized>(
    view: &V,
    params: &ChainParams,
    start: Option<NodeId>,
) -> u32 {
    let blocks_per_retarget = params.blocks_per_retarget().max(1);
    let mut cursor = start.and_then(|id| view.node(id));
    while let Some(node) = cursor {
        if node.height % blocks_per_retarget == 0 || node.bits != params.pow_limit_bits {
            return node.bits;
        }
        cursor = node.parent.and_then(|id| view.node(id));
    }
    params.pow_limit_bits
}
