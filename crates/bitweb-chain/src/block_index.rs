//! Append-only arena of block nodes.
//!
//! Nodes never move once inserted and refer to each other by `NodeId`, so
//! parent and skip links are plain indices rather than shared pointers.

use std::collections::HashMap;

use bitweb_consensus::{header_hash, BlockHeader};
use tracing::debug;

use crate::error::ChainError;

/// Position of a node inside a [`BlockIndex`].
pub type NodeId = usize;

/// Number of previous blocks, the node included, whose timestamps form the
/// median time past.
pub const MEDIAN_TIME_BLOCKS: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub hash: [u8; 32],
    pub parent: Option<NodeId>,
    /// Far ancestor used to speed up `ancestor` lookups.
    pub skip: Option<NodeId>,
    pub height: i32,
    pub version: i32,
    pub bits: u32,
    pub timestamp: i64,
}

/// Read-only navigation over a block index.
pub trait ChainView {
    /// Head of the active chain.
    fn tip(&self) -> Option<NodeId>;

    fn node(&self, id: NodeId) -> Option<&BlockNode>;

    /// Ancestor of `id` at `height`, or `None` when `height` is outside
    /// `[0, node.height]`.
    fn ancestor(&self, id: NodeId, height: i32) -> Option<NodeId>;

    /// Median timestamp of `id` and up to ten of its ancestors.
    fn median_time_past(&self, id: NodeId) -> Option<i64>;
}

#[derive(Debug, Default)]
pub struct BlockIndex {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<[u8; 32], NodeId>,
    tip: Option<NodeId>,
}

fn invert_lowest_one(value: i32) -> i32 {
    value & value.saturating_sub(1)
}

/// Height a node's skip pointer refers to. Any height works; this choice
/// keeps lookups logarithmic.
pub fn get_skip_height(height: i32) -> i32 {
    if height < 2 {
        0
    } else if (height & 1) != 0 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index holding only `genesis`, which becomes the tip.
    pub fn with_genesis(genesis: &BlockHeader) -> Result<Self, ChainError> {
        let mut index = Self::new();
        let id = index.insert_header(genesis)?;
        index.set_tip(id)?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup(&self, hash: &[u8; 32]) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn tip_node(&self) -> Option<&BlockNode> {
        self.tip.and_then(|id| self.nodes.get(id))
    }

    /// Link a header under its (already indexed) parent. The tip is left
    /// untouched; see [`BlockIndex::set_tip`].
    pub fn insert_header(&mut self, header: &BlockHeader) -> Result<NodeId, ChainError> {
        let hash = header_hash(header);
        if self.by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateHeader(hash));
        }

        let parent = if header.is_genesis() && self.nodes.is_empty() {
            None
        } else {
            let parent = self
                .lookup(&header.prev_block_hash)
                .ok_or(ChainError::UnknownParent(header.prev_block_hash))?;
            Some(parent)
        };
        let height = match parent {
            Some(id) => self.nodes[id].height + 1,
            None => 0,
        };
        let skip = parent.and_then(|id| self.ancestor(id, get_skip_height(height)));

        let id = self.nodes.len();
        self.nodes.push(BlockNode {
            hash,
            parent,
            skip,
            height,
            version: header.version,
            bits: header.bits,
            timestamp: i64::from(header.time),
        });
        self.by_hash.insert(hash, id);
        debug!(height, bits = format_args!("{:08x}", header.bits), "indexed header");
        Ok(id)
    }

    /// Make `id` the head of the active chain.
    pub fn set_tip(&mut self, id: NodeId) -> Result<(), ChainError> {
        if id >= self.nodes.len() {
            return Err(ChainError::UnknownNode(id));
        }
        self.tip = Some(id);
        Ok(())
    }
}

impl ChainView for BlockIndex {
    fn tip(&self) -> Option<NodeId> {
        self.tip
    }

    fn node(&self, id: NodeId) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    fn ancestor(&self, id: NodeId, height: i32) -> Option<NodeId> {
        let start = self.nodes.get(id)?;
        if height < 0 || height > start.height {
            return None;
        }

        let mut current = id;
        let mut height_walk = start.height;
        while height_walk > height {
            let node = self.nodes.get(current)?;
            let height_skip = get_skip_height(height_walk);
            let height_skip_prev = get_skip_height(height_walk - 1);
            // Take the skip unless it overshoots, or the parent's skip would
            // land closer to the target.
            let take_skip = height_skip == height
                || (height_skip > height
                    && !(height_skip_prev < height_skip - 2 && height_skip_prev >= height));
            match node.skip {
                Some(skip) if take_skip => {
                    current = skip;
                    height_walk = height_skip;
                }
                _ => {
                    current = node.parent?;
                    height_walk -= 1;
                }
            }
        }
        Some(current)
    }

    fn median_time_past(&self, id: NodeId) -> Option<i64> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_BLOCKS);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if timestamps.len() == MEDIAN_TIME_BLOCKS {
                break;
            }
            let node = self.nodes.get(current)?;
            timestamps.push(node.timestamp);
            cursor = node.parent;
        }
        timestamps.sort_unstable();
        timestamps.get(timestamps.len() / 2).copied()
    }
}
