use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use num_bigint::BigInt;
use num_traits::{One, Signed};
use serde::{Deserialize, Serialize};

use crate::compact::big_to_compact;
use crate::{BlockHeader, ConsensusError};

/// Height above which the windowed weighted-average retarget replaces the
/// fixed-interval one.
pub const LWMA_ACTIVATION_HEIGHT: i32 = 90;

pub const MAINNET_GENESIS_BITS: u32 = 0x1f1f_ffff;
pub const TESTNET_GENESIS_BITS: u32 = 0x1e3f_ffff;
pub const REGTEST_GENESIS_BITS: u32 = 0x207f_ffff;

const TARGET_TIME_PER_BLOCK_SECS: u64 = 60;
const TARGET_TIMESPAN_SECS: u64 = 60 * 60;
const RETARGET_ADJUSTMENT_FACTOR: i64 = 4;

/// Merkle root shared by every network's genesis block (internal byte order).
const GENESIS_MERKLE_ROOT: [u8; 32] = [
	0xe0, 0xaa, 0xc3, 0x44, 0xbf, 0x21, 0x8b, 0xbb, 0x5e, 0xee, 0x3d, 0x1d, 0x5c, 0xa0, 0x07,
	0x57, 0xa7, 0x86, 0x59, 0x85, 0x83, 0x78, 0x1c, 0x60, 0xc5, 0x5e, 0x8f, 0xf0, 0x30, 0x33,
	0x36, 0x04,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Mainnet,
	Testnet3,
	Regtest,
	Simnet,
	Signet,
}

impl Network {
	pub const ALL: [Network; 5] = [
		Network::Mainnet,
		Network::Testnet3,
		Network::Regtest,
		Network::Simnet,
		Network::Signet,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Network::Mainnet => "mainnet",
			Network::Testnet3 => "testnet3",
			Network::Regtest => "regtest",
			Network::Simnet => "simnet",
			Network::Signet => "signet",
		}
	}

	pub fn params(self) -> ChainParams {
		match self {
			Network::Mainnet => ChainParams::mainnet(),
			Network::Testnet3 => ChainParams::testnet3(),
			Network::Regtest => ChainParams::regtest(),
			Network::Simnet => ChainParams::simnet(),
			Network::Signet => ChainParams::signet(),
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Network {
	type Err = ConsensusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"mainnet" | "main" => Ok(Network::Mainnet),
			"testnet3" | "testnet" | "test" => Ok(Network::Testnet3),
			"regtest" => Ok(Network::Regtest),
			"simnet" => Ok(Network::Simnet),
			"signet" => Ok(Network::Signet),
			other => Err(ConsensusError::UnknownNetwork(other.to_string())),
		}
	}
}

/// Consensus parameters for one network. Immutable for the lifetime of the
/// process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
	pub network: Network,
	pub genesis: BlockHeader,
	/// Highest (easiest) permitted target.
	pub pow_limit: BigInt,
	/// Compact encoding of `pow_limit`.
	pub pow_limit_bits: u32,
	/// Multiplier applied once per retarget interval by the easiest
	/// difficulty calculation, and the clamp ratio of the legacy retarget.
	pub retarget_adjustment_factor: i64,
	pub reduce_min_difficulty: bool,
	pub min_diff_reduction_time: Duration,
	pub target_timespan: Duration,
	pub target_time_per_block: Duration,
	pub lwma_activation_height: i32,
}

impl ChainParams {
	pub fn mainnet() -> Self {
		Self {
			network: Network::Mainnet,
			genesis: genesis_header(1_619_971_700, MAINNET_GENESIS_BITS, 651),
			pow_limit: pow_limit(245),
			pow_limit_bits: MAINNET_GENESIS_BITS,
			retarget_adjustment_factor: RETARGET_ADJUSTMENT_FACTOR,
			reduce_min_difficulty: false,
			min_diff_reduction_time: Duration::ZERO,
			target_timespan: Duration::from_secs(TARGET_TIMESPAN_SECS),
			target_time_per_block: Duration::from_secs(TARGET_TIME_PER_BLOCK_SECS),
			lwma_activation_height: LWMA_ACTIVATION_HEIGHT,
		}
	}

	pub fn testnet3() -> Self {
		Self {
			network: Network::Testnet3,
			genesis: genesis_header(1_619_971_765, TESTNET_GENESIS_BITS, 18_156),
			pow_limit: pow_limit(238),
			pow_limit_bits: TESTNET_GENESIS_BITS,
			reduce_min_difficulty: true,
			min_diff_reduction_time: Duration::from_secs(TARGET_TIME_PER_BLOCK_SECS * 2),
			..Self::mainnet()
		}
	}

	pub fn regtest() -> Self {
		Self {
			network: Network::Regtest,
			genesis: genesis_header(1_619_971_818, REGTEST_GENESIS_BITS, 1),
			pow_limit: pow_limit(255),
			pow_limit_bits: REGTEST_GENESIS_BITS,
			reduce_min_difficulty: true,
			min_diff_reduction_time: Duration::from_secs(TARGET_TIME_PER_BLOCK_SECS * 2),
			..Self::mainnet()
		}
	}

	pub fn simnet() -> Self {
		Self {
			network: Network::Simnet,
			..Self::regtest()
		}
	}

	pub fn signet() -> Self {
		Self {
			network: Network::Signet,
			reduce_min_difficulty: false,
			min_diff_reduction_time: Duration::ZERO,
			..Self::testnet3()
		}
	}

	/// Number of blocks between legacy retargets.
	pub fn blocks_per_retarget(&self) -> i32 {
		let per_block = self.target_time_per_block.as_secs().max(1);
		(self.target_timespan.as_secs() / per_block) as i32
	}

	/// Lower clamp of the legacy observed timespan, in seconds.
	pub fn min_retarget_timespan(&self) -> i64 {
		self.target_timespan.as_secs() as i64 / self.retarget_adjustment_factor
	}

	/// Upper clamp of the legacy observed timespan, in seconds.
	pub fn max_retarget_timespan(&self) -> i64 {
		self.target_timespan.as_secs() as i64 * self.retarget_adjustment_factor
	}

	pub fn validate(&self) -> Result<(), ConsensusError> {
		if !self.pow_limit.is_positive() {
			return Err(ConsensusError::InvalidParams(
				"pow limit must be positive".to_string(),
			));
		}
		if big_to_compact(&self.pow_limit) != self.pow_limit_bits {
			return Err(ConsensusError::InvalidBits);
		}
		if self.target_time_per_block.as_secs() == 0 {
			return Err(ConsensusError::InvalidParams(
				"target time per block must be at least one second".to_string(),
			));
		}
		if self.retarget_adjustment_factor <= 0 {
			return Err(ConsensusError::InvalidParams(
				"retarget adjustment factor must be positive".to_string(),
			));
		}
		if self.blocks_per_retarget() <= 0 || self.min_retarget_timespan() <= 0 {
			return Err(ConsensusError::InvalidParams(
				"target timespan shorter than the adjustment factor allows".to_string(),
			));
		}
		if self.lwma_activation_height < 0 {
			return Err(ConsensusError::InvalidParams(
				"negative activation height".to_string(),
			));
		}
		Ok(())
	}
}

fn pow_limit(bits: usize) -> BigInt {
	(BigInt::one() << bits) - BigInt::one()
}

fn genesis_header(time: u32, bits: u32, nonce: u32) -> BlockHeader {
	BlockHeader {
		version: 1,
		prev_block_hash: [0u8; 32],
		merkle_root: GENESIS_MERKLE_ROOT,
		time,
		bits,
		nonce,
	}
}
