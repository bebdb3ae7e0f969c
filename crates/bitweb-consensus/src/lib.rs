//! Bitweb consensus primitives
//!
//! Block headers, the compact difficulty codec, per-block work and the
//! per-network consensus parameters consumed by the difficulty engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod compact;
mod params;
mod work;

pub use compact::{big_to_compact, compact_to_big, hash_to_big};
pub use params::{
	ChainParams, Network, LWMA_ACTIVATION_HEIGHT, MAINNET_GENESIS_BITS, REGTEST_GENESIS_BITS,
	TESTNET_GENESIS_BITS,
};
pub use work::calc_work;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
	pub version: i32,
	pub prev_block_hash: [u8; 32],
	pub merkle_root: [u8; 32],
	pub time: u32,
	pub bits: u32,
	pub nonce: u32,
}

impl BlockHeader {
	pub fn is_genesis(&self) -> bool {
		self.prev_block_hash == [0u8; 32]
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
	#[error("invalid bits")]
	InvalidBits,
	#[error("unknown network: {0}")]
	UnknownNetwork(String),
	#[error("invalid chain parameters: {0}")]
	InvalidParams(String),
}

/// Double-SHA256 over the 80-byte wire serialization of the header.
pub fn header_hash(header: &BlockHeader) -> [u8; 32] {
	let mut bytes = Vec::with_capacity(4 + 32 + 32 + 4 + 4 + 4);
	bytes.extend_from_slice(&header.version.to_le_bytes());
	bytes.extend_from_slice(&header.prev_block_hash);
	bytes.extend_from_slice(&header.merkle_root);
	bytes.extend_from_slice(&header.time.to_le_bytes());
	bytes.extend_from_slice(&header.bits.to_le_bytes());
	bytes.extend_from_slice(&header.nonce.to_le_bytes());
	let first = Sha256::digest(&bytes);
	let second = Sha256::digest(&first);
	let mut out = [0u8; 32];
	out.copy_from_slice(&second);
	out
}
