use crate::store::StoreError;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Block height recorded for transactions that are not yet in a block.
pub const TX_UNCONFIRMED: u32 = 0;

macro_rules! hash_newtype {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		pub struct $name(pub [u8; 32]);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&hex::encode(self.0))
			}
		}

		impl FromStr for $name {
			type Err = hex::FromHexError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let mut bytes = [0u8; 32];
				hex::decode_to_slice(s, &mut bytes)?;
				Ok(Self(bytes))
			}
		}
	};
}

hash_newtype!(TxHash);
hash_newtype!(BlockHash);

/// Reference to a prior transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
	pub hash: TxHash,
	pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
	/// Amount in the smallest currency unit.
	pub amount: u64,
	/// Destination script.
	pub script: Vec<u8>,
}

/// Asset operation carried by a transaction, classified once from the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetOperation {
	Issuance,
	Reissuance,
	Transfer,
	Unknown(u8),
}

impl AssetOperation {
	pub const ISSUANCE_CODE: u8 = 1;
	pub const REISSUANCE_CODE: u8 = 2;
	pub const TRANSFER_CODE: u8 = 3;

	pub fn from_code(code: u8) -> Self {
		match code {
			Self::ISSUANCE_CODE => Self::Issuance,
			Self::REISSUANCE_CODE => Self::Reissuance,
			Self::TRANSFER_CODE => Self::Transfer,
			other => Self::Unknown(other),
		}
	}

	pub fn is_recognized(&self) -> bool {
		!matches!(self, Self::Unknown(_))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetMetadata {
	pub reissuable: bool,
	/// IPFS-style content hash associated with the asset.
	pub ipfs_hash: Option<String>,
}

/// Asset payload embedded in a base-currency transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPayload {
	pub operation: AssetOperation,
	/// Raw asset name; empty when the payload did not carry one.
	pub name: Vec<u8>,
	pub amount: u64,
	pub metadata: Option<AssetMetadata>,
}

impl AssetPayload {
	pub fn new(operation: AssetOperation, name: impl Into<Vec<u8>>, amount: u64) -> Self {
		Self {
			operation,
			name: name.into(),
			amount,
			metadata: None,
		}
	}

	pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
		self.metadata = Some(metadata);
		self
	}

	/// Asset name as displayed; invalid UTF-8 is replaced lossily.
	pub fn display_name(&self) -> String {
		String::from_utf8_lossy(&self.name).into_owned()
	}
}

/// A transaction as observed from the network or loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub hash: TxHash,
	pub inputs: Vec<OutPoint>,
	pub outputs: Vec<TxOutput>,
	/// `TX_UNCONFIRMED` while pending.
	pub block_height: u32,
	/// Zero while pending.
	pub timestamp: u32,
	pub asset: Option<AssetPayload>,
	/// Entries bundled by an issuance or reissuance, in source order.
	pub constituents: Vec<Transaction>,
}

impl Transaction {
	pub fn new(hash: TxHash) -> Self {
		Self {
			hash,
			inputs: Vec::new(),
			outputs: Vec::new(),
			block_height: TX_UNCONFIRMED,
			timestamp: 0,
			asset: None,
			constituents: Vec::new(),
		}
	}

	pub fn is_confirmed(&self) -> bool {
		self.block_height != TX_UNCONFIRMED
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	pub hash: BlockHash,
	pub height: u32,
	pub timestamp: u32,
	/// Validated header bytes, opaque to the engine.
	pub header: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
	pub address: IpAddr,
	pub port: u16,
	pub timestamp: u64,
	pub services: u64,
}

/// Direction of a transaction from the managed key-set's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxDirection {
	Received,
	Sent,
	/// Funds moved between owned scripts.
	Moved,
}

/// Owned destination scripts for one managed key-set.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
	pub scripts: HashSet<Vec<u8>>,
	/// Next unused receive address.
	pub receive_address: String,
}

impl KeySet {
	pub fn new(scripts: impl IntoIterator<Item = Vec<u8>>, receive_address: impl Into<String>) -> Self {
		Self {
			scripts: scripts.into_iter().collect(),
			receive_address: receive_address.into(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.scripts.is_empty()
	}

	pub fn owns(&self, script: &[u8]) -> bool {
		self.scripts.contains(script)
	}
}

/// Errors surfaced by the wallet manager to its caller.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("no usable key material for {0}")]
	NoKeyMaterial(String),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("wallet context has shut down")]
	ChannelClosed,

	#[error("Wipe failed: {0}")]
	WipeFailed(String),

	#[error("Config error: {0}")]
	Config(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hash_hex_roundtrip() {
		let hash = TxHash([0xab; 32]);
		let parsed: TxHash = hash.to_string().parse().expect("valid hex");
		assert_eq!(parsed, hash);
		assert!("zz".parse::<TxHash>().is_err());
	}

	#[test]
	fn test_operation_codes() {
		assert_eq!(AssetOperation::from_code(1), AssetOperation::Issuance);
		assert_eq!(AssetOperation::from_code(2), AssetOperation::Reissuance);
		assert_eq!(AssetOperation::from_code(3), AssetOperation::Transfer);
		assert_eq!(AssetOperation::from_code(9), AssetOperation::Unknown(9));
		assert!(!AssetOperation::Unknown(9).is_recognized());
	}
}
