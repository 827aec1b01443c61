use crate::wallet::{
	AssetOperation, AssetPayload, Block, Peer, Transaction, TxDirection, TxHash,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// On-disk format version of `StoreSnapshot`.
pub const STORE_VERSION: u32 = 2;

/// Sync bookkeeping kept alongside the four tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreMeta {
	/// Last block height fully processed by a prior sync session.
	pub sync_watermark: u32,
	pub rescan_recommended: bool,
}

/// Wallet-side information needed to apply an asset entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetWalletContext {
	pub direction: TxDirection,
}

/// One row of the asset-metadata table, keyed by asset name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
	pub name: String,
	pub total_supply: u64,
	/// Amount held by the managed key-set.
	pub owned_amount: u64,
	/// Units moved by the most recent operation.
	pub last_units: u64,
	pub reissuable: bool,
	pub ipfs_hash: Option<String>,
	pub last_tx: Option<TxHash>,
	pub block_height: u32,
	pub rejected: bool,
	applied: BTreeMap<TxHash, AppliedEntry>,
}

/// What one applied entry changed, so it can be undone when its transaction is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct AppliedEntry {
	operation: AssetOperation,
	supply_added: u64,
	owned_added: u64,
	owned_removed: u64,
}

impl AssetRecord {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			total_supply: 0,
			owned_amount: 0,
			last_units: 0,
			reissuable: false,
			ipfs_hash: None,
			last_tx: None,
			block_height: 0,
			rejected: false,
			applied: BTreeMap::new(),
		}
	}

	pub fn has_applied(&self, hash: &TxHash) -> bool {
		self.applied.contains_key(hash)
	}

	/// Apply one asset entry. Returns false when `tx` was already applied.
	pub(crate) fn apply(
		&mut self,
		tx: &Transaction,
		payload: &AssetPayload,
		ctx: &AssetWalletContext,
	) -> bool {
		if self.applied.contains_key(&tx.hash) {
			return false;
		}

		let supply_before = self.total_supply;
		let owned_before = self.owned_amount;
		let credited = ctx.direction != TxDirection::Sent;
		match payload.operation {
			AssetOperation::Issuance => {
				self.total_supply = payload.amount;
				if let Some(meta) = &payload.metadata {
					self.reissuable = meta.reissuable;
					self.ipfs_hash = meta.ipfs_hash.clone();
				}
				if credited {
					self.owned_amount = self.owned_amount.saturating_add(payload.amount);
				}
			}
			AssetOperation::Reissuance => {
				self.total_supply = self.total_supply.saturating_add(payload.amount);
				if let Some(meta) = &payload.metadata {
					self.reissuable = meta.reissuable;
					if meta.ipfs_hash.is_some() {
						self.ipfs_hash = meta.ipfs_hash.clone();
					}
				}
				if credited {
					self.owned_amount = self.owned_amount.saturating_add(payload.amount);
				}
			}
			AssetOperation::Transfer => match ctx.direction {
				TxDirection::Received => {
					self.owned_amount = self.owned_amount.saturating_add(payload.amount)
				}
				TxDirection::Sent => {
					self.owned_amount = self.owned_amount.saturating_sub(payload.amount)
				}
				TxDirection::Moved => {}
			},
			AssetOperation::Unknown(_) => {}
		}

		// issuance sets the supply outright; only reissuance adds to it
		let supply_added = match payload.operation {
			AssetOperation::Reissuance => self.total_supply - supply_before,
			_ => 0,
		};
		self.applied.insert(
			tx.hash,
			AppliedEntry {
				operation: payload.operation,
				supply_added,
				owned_added: self.owned_amount.saturating_sub(owned_before),
				owned_removed: owned_before.saturating_sub(self.owned_amount),
			},
		);

		self.last_units = payload.amount;
		self.last_tx = Some(tx.hash);
		self.block_height = tx.block_height;
		self.rejected = false;
		true
	}

	/// Undo the entry applied for `hash`. Returns false if no such entry was applied.
	///
	/// Undoing the issuance marks the asset rejected; undoing a reissuance or transfer only
	/// reverses its supply and ownership changes. The hash may be applied again afterwards.
	pub(crate) fn revert(&mut self, hash: &TxHash) -> bool {
		let Some(entry) = self.applied.remove(hash) else {
			return false;
		};

		self.total_supply = self.total_supply.saturating_sub(entry.supply_added);
		self.owned_amount = self
			.owned_amount
			.saturating_sub(entry.owned_added)
			.saturating_add(entry.owned_removed);
		if entry.operation == AssetOperation::Issuance {
			self.rejected = true;
		}
		if self.last_tx == Some(*hash) {
			self.last_tx = None;
		}
		true
	}
}

/// Everything stored for one currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
	pub version: u32,
	pub meta: StoreMeta,
	pub transactions: BTreeMap<TxHash, Transaction>,
	pub blocks: BTreeMap<crate::wallet::BlockHash, Block>,
	pub peers: BTreeMap<IpAddr, Peer>,
	pub assets: BTreeMap<String, AssetRecord>,
}

impl Default for StoreSnapshot {
	fn default() -> Self {
		Self {
			version: STORE_VERSION,
			meta: StoreMeta::default(),
			transactions: BTreeMap::new(),
			blocks: BTreeMap::new(),
			peers: BTreeMap::new(),
			assets: BTreeMap::new(),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Encoding error: {0}")]
	Encode(#[from] bincode::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("store is closed")]
	Closed,
}
