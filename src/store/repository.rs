use crate::store::types::{AssetRecord, AssetWalletContext, StoreError, StoreMeta};
use crate::wallet::{Block, Peer, Transaction, TxHash};

/// Durable storage for one currency's transactions, blocks, peers and asset metadata.
///
/// Bulk loads are fail-soft and never return errors; a missing or corrupt store reads as empty.
/// Mutations are applied atomically: readers observe either the state before a call or after it.
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
	async fn load_transactions(&self) -> Vec<Transaction>;
	async fn load_blocks(&self) -> Vec<Block>;
	async fn load_peers(&self) -> Vec<Peer>;
	async fn load_assets(&self) -> Vec<AssetRecord>;
	async fn load_meta(&self) -> StoreMeta;

	/// Replace the whole blocks table when `replace` is set, otherwise upsert by hash.
	async fn save_blocks(&self, replace: bool, blocks: &[Block]) -> Result<(), StoreError>;
	/// Replace the whole peers table when `replace` is set, otherwise upsert by address.
	async fn save_peers(&self, replace: bool, peers: &[Peer]) -> Result<(), StoreError>;

	async fn tx_added(&self, tx: &Transaction) -> Result<(), StoreError>;
	async fn tx_updated(
		&self,
		hashes: &[TxHash],
		block_height: u32,
		timestamp: u32,
	) -> Result<(), StoreError>;
	async fn tx_deleted(
		&self,
		hash: &TxHash,
		notify_user: bool,
		recommend_rescan: bool,
	) -> Result<(), StoreError>;

	/// Record a validated asset entry.
	async fn asset_added(
		&self,
		tx: &Transaction,
		ctx: &AssetWalletContext,
	) -> Result<(), StoreError>;
	async fn update_asset_data(&self, asset: AssetRecord) -> Result<(), StoreError>;
	/// Undo the asset entry `hash` applied to `name` after its transaction was deleted.
	/// Undoing the issuance marks the asset rejected until the issuance is applied again.
	async fn reject_asset_tx(&self, name: &str, hash: &TxHash) -> Result<(), StoreError>;

	/// Persist a new sync watermark and clear the rescan flag.
	async fn save_watermark(&self, height: u32) -> Result<(), StoreError>;

	/// Flush and stop accepting mutations.
	async fn close(&self) -> Result<(), StoreError>;
	/// Close and remove the backing file.
	async fn delete(&self) -> Result<(), StoreError>;
}
