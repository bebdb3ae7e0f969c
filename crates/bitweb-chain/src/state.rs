//! Lock-guarded chain state.
//!
//! The block index sits behind a single reader/writer lock. Difficulty
//! queries hold it for the whole tip read and ancestor walk so the window
//! they consult cannot change underneath them.

use bitweb_consensus::{BlockHeader, ChainParams};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::block_index::{BlockIndex, BlockNode, ChainView, NodeId};
use crate::difficulty::{calc_next_required_difficulty, find_prev_testnet_difficulty};
use crate::error::ChainError;

pub struct ChainState {
    params: ChainParams,
    index: RwLock<BlockIndex>,
}

impl ChainState {
    /// Chain holding only the network's genesis block.
    pub fn new(params: ChainParams) -> Result<Self, ChainError> {
        let genesis = params.genesis.clone();
        Self::with_genesis(params, &genesis)
    }

    /// Chain rooted at a caller supplied genesis header.
    pub fn with_genesis(params: ChainParams, genesis: &BlockHeader) -> Result<Self, ChainError> {
        params.validate()?;
        let index = BlockIndex::with_genesis(genesis)?;
        info!(network = %params.network, "chain state initialized");
        Ok(Self {
            params,
            index: RwLock::new(index),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Snapshot of the current tip.
    pub fn tip(&self) -> Option<BlockNode> {
        let index = self.index.read();
        index.tip_node().cloned()
    }

    /// Required bits for a block extending the current best chain.
    ///
    /// This function is safe for concurrent access.
    pub fn next_required_difficulty(&self, timestamp: i64) -> Result<u32, ChainError> {
        self.read().calc_next_required_difficulty(None, timestamp)
    }

    pub fn read(&self) -> ChainReadGuard<'_> {
        ChainReadGuard {
            params: &self.params,
            index: self.index.read(),
        }
    }

    pub fn write(&self) -> ChainWriteGuard<'_> {
        ChainWriteGuard {
            params: &self.params,
            index: self.index.write(),
        }
    }

    /// Append `header` to the tip under the write lock.
    pub fn connect_header(&self, header: &BlockHeader, check_bits: bool) -> Result<NodeId, ChainError> {
        self.write().connect_header(header, check_bits)
    }
}

fn tip_of(index: &BlockIndex) -> Result<NodeId, ChainError> {
    index
        .tip()
        .ok_or_else(|| ChainError::InvariantViolation("block index has no tip".to_string()))
}

/// Shared access to the block index. Blocks writers while alive.
pub struct ChainReadGuard<'a> {
    params: &'a ChainParams,
    index: RwLockReadGuard<'a, BlockIndex>,
}

impl ChainReadGuard<'_> {
    pub fn view(&self) -> &BlockIndex {
        &self.index
    }

    /// Required bits for the block after `last`, or after the tip when
    /// `last` is `None`.
    pub fn calc_next_required_difficulty(
        &self,
        last: Option<NodeId>,
        timestamp: i64,
    ) -> Result<u32, ChainError> {
        let last = match last {
            Some(id) => id,
            None => tip_of(&self.index)?,
        };
        calc_next_required_difficulty(&*self.index, self.params, last, timestamp)
    }
}

/// Exclusive access to the block index.
pub struct ChainWriteGuard<'a> {
    params: &'a ChainParams,
    index: RwLockWriteGuard<'a, BlockIndex>,
}

impl ChainWriteGuard<'_> {
    pub fn view(&self) -> &BlockIndex {
        &self.index
    }

    pub fn tip(&self) -> Result<NodeId, ChainError> {
        tip_of(&self.index)
    }

    pub fn calc_next_required_difficulty(
        &self,
        last: NodeId,
        timestamp: i64,
    ) -> Result<u32, ChainError> {
        calc_next_required_difficulty(&*self.index, self.params, last, timestamp)
    }

    /// See [`crate::find_prev_testnet_difficulty`]; holding this guard
    /// satisfies its locking requirement.
    pub fn find_prev_testnet_difficulty(&self, start: Option<NodeId>) -> u32 {
        find_prev_testnet_difficulty(&*self.index, self.params, start)
    }

    pub fn insert_header(&mut self, header: &BlockHeader) -> Result<NodeId, ChainError> {
        self.index.insert_header(header)
    }

    pub fn set_tip(&mut self, id: NodeId) -> Result<(), ChainError> {
        self.index.set_tip(id)?;
        debug!(id, "tip moved");
        Ok(())
    }

    /// Index `header` and make it the tip. It must build on the current tip.
    /// With `check_bits` the header's bits must equal the retarget result.
    pub fn connect_header(&mut self, header: &BlockHeader, check_bits: bool) -> Result<NodeId, ChainError> {
        let tip = tip_of(&self.index)?;
        let tip_hash = self
            .index
            .node(tip)
            .map(|node| node.hash)
            .ok_or(ChainError::UnknownNode(tip))?;
        if header.prev_block_hash != tip_hash {
            return Err(ChainError::NotExtendingTip);
        }
        if check_bits {
            let expected = self.calc_next_required_difficulty(tip, i64::from(header.time))?;
            if header.bits != expected {
                return Err(ChainError::UnexpectedBits {
                    expected,
                    got: header.bits,
                });
            }
        }
        let id = self.index.insert_header(header)?;
        self.index.set_tip(id)?;
        Ok(id)
    }
}
