use bitweb_consensus::ConsensusError;

use crate::block_index::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The block index is inconsistent: a node that must exist by height
    /// arithmetic could not be found.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("unknown parent header: {}", hex_hash(.0))]
    UnknownParent([u8; 32]),
    #[error("duplicate header: {}", hex_hash(.0))]
    DuplicateHeader([u8; 32]),
    #[error("header does not extend the current tip")]
    NotExtendingTip,
    #[error("unknown block node: {0}")]
    UnknownNode(NodeId),
    #[error("unexpected difficulty bits: expected {expected:08x}, got {got:08x}")]
    UnexpectedBits { expected: u32, got: u32 },
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

impl ChainError {
    /// True when the error signals a corrupted index rather than a bad
    /// header. Callers typically halt instead of rejecting one block.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::InvariantViolation(_))
    }
}

/// Display form of a hash: reversed byte order, as block explorers show it.
pub(crate) fn hex_hash(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}
