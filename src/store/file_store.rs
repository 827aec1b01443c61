//! File-backed wallet store.
//!
//! All four tables live in one `bincode` snapshot per currency. Every mutation is applied to a
//! copy of the snapshot, written to a temporary sibling file, and renamed over the original, so a
//! crash mid-write leaves the previous snapshot intact and concurrent readers never see partial
//! state. The tokio mutex serializes writers: one mutation is in flight at a time.

use crate::asset::classify;
use crate::store::repository::WalletStore;
use crate::store::types::{
	AssetRecord, AssetWalletContext, STORE_VERSION, StoreError, StoreMeta, StoreSnapshot,
};
use crate::wallet::{Block, Peer, Transaction, TxHash};

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct Inner {
	snapshot: StoreSnapshot,
	closed: bool,
}

pub struct FileWalletStore {
	path: PathBuf,
	inner: Mutex<Inner>,
}

impl FileWalletStore {
	/// Open the store at `path`.
	///
	/// Never fails: a missing file opens empty, and an unreadable or undecodable file is moved
	/// aside to `<path>.corrupt` and replaced with an empty store.
	pub async fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let snapshot = match tokio::fs::read(&path).await {
			Ok(bytes) => match decode(&bytes) {
				Ok(snapshot) => {
					info!(
						"Loaded store {:?}: {} transactions, {} blocks, {} peers, {} assets",
						path,
						snapshot.transactions.len(),
						snapshot.blocks.len(),
						snapshot.peers.len(),
						snapshot.assets.len()
					);
					snapshot
				}
				Err(e) => {
					warn!("Store {:?} is corrupt ({}), recreating", path, e);
					recreate(&path).await
				}
			},
			Err(e) if e.kind() == ErrorKind::NotFound => {
				info!("No store at {:?}, starting empty", path);
				StoreSnapshot::default()
			}
			Err(e) => {
				warn!("Failed to read store {:?} ({}), recreating", path, e);
				recreate(&path).await
			}
		};

		Self {
			path,
			inner: Mutex::new(Inner {
				snapshot,
				closed: false,
			}),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Apply `f` to a copy of the snapshot and persist it if `f` reports a change.
	async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
	where
		F: FnOnce(&mut StoreSnapshot) -> bool + Send,
	{
		let mut inner = self.inner.lock().await;
		if inner.closed {
			return Err(StoreError::Closed);
		}

		let mut next = inner.snapshot.clone();
		if !f(&mut next) {
			return Ok(());
		}

		write_atomic(&self.path, &next).await?;
		inner.snapshot = next;
		Ok(())
	}

	async fn read<T, F>(&self, f: F) -> T
	where
		F: FnOnce(&StoreSnapshot) -> T + Send,
	{
		let inner = self.inner.lock().await;
		f(&inner.snapshot)
	}
}

#[async_trait::async_trait]
impl WalletStore for FileWalletStore {
	async fn load_transactions(&self) -> Vec<Transaction> {
		self.read(|s| s.transactions.values().cloned().collect()).await
	}

	async fn load_blocks(&self) -> Vec<Block> {
		self.read(|s| {
			let mut blocks: Vec<Block> = s.blocks.values().cloned().collect();
			blocks.sort_by_key(|b| b.height);
			blocks
		})
		.await
	}

	async fn load_peers(&self) -> Vec<Peer> {
		self.read(|s| s.peers.values().cloned().collect()).await
	}

	async fn load_assets(&self) -> Vec<AssetRecord> {
		self.read(|s| s.assets.values().cloned().collect()).await
	}

	async fn load_meta(&self) -> StoreMeta {
		self.read(|s| s.meta).await
	}

	async fn save_blocks(&self, replace: bool, blocks: &[Block]) -> Result<(), StoreError> {
		debug!("Saving {} blocks (replace: {})", blocks.len(), replace);
		self.mutate(|s| {
			if replace {
				s.blocks.clear();
			}
			s.blocks.extend(blocks.iter().map(|b| (b.hash, b.clone())));
			true
		})
		.await
	}

	async fn save_peers(&self, replace: bool, peers: &[Peer]) -> Result<(), StoreError> {
		debug!("Saving {} peers (replace: {})", peers.len(), replace);
		self.mutate(|s| {
			if replace {
				s.peers.clear();
			}
			s.peers.extend(peers.iter().map(|p| (p.address, p.clone())));
			true
		})
		.await
	}

	async fn tx_added(&self, tx: &Transaction) -> Result<(), StoreError> {
		self.mutate(|s| {
			s.transactions.insert(tx.hash, tx.clone());
			true
		})
		.await
	}

	async fn tx_updated(
		&self,
		hashes: &[TxHash],
		block_height: u32,
		timestamp: u32,
	) -> Result<(), StoreError> {
		self.mutate(|s| {
			let mut changed = false;
			for hash in hashes {
				if let Some(tx) = s.transactions.get_mut(hash) {
					tx.block_height = block_height;
					tx.timestamp = timestamp;
					changed = true;
				}
			}
			for record in s.assets.values_mut() {
				if hashes.iter().any(|h| record.last_tx.as_ref() == Some(h)) {
					record.block_height = block_height;
					changed = true;
				}
			}
			changed
		})
		.await
	}

	async fn tx_deleted(
		&self,
		hash: &TxHash,
		_notify_user: bool,
		recommend_rescan: bool,
	) -> Result<(), StoreError> {
		self.mutate(|s| {
			let removed = s.transactions.remove(hash).is_some();
			if recommend_rescan && !s.meta.rescan_recommended {
				s.meta.rescan_recommended = true;
				return true;
			}
			removed
		})
		.await
	}

	async fn asset_added(
		&self,
		tx: &Transaction,
		ctx: &AssetWalletContext,
	) -> Result<(), StoreError> {
		let Some(payload) = tx.asset.as_ref().filter(|_| classify(tx.asset.as_ref()).is_some())
		else {
			debug!("Skipping invalid asset entry {}", tx.hash);
			return Ok(());
		};
		if payload.name.is_empty() {
			debug!("Skipping unnamed {:?} entry {}", payload.operation, tx.hash);
			return Ok(());
		}

		let name = payload.display_name();
		self.mutate(|s| {
			s.assets
				.entry(name.clone())
				.or_insert_with(|| AssetRecord::new(name))
				.apply(tx, payload, ctx)
		})
		.await
	}

	async fn update_asset_data(&self, asset: AssetRecord) -> Result<(), StoreError> {
		self.mutate(|s| {
			s.assets.insert(asset.name.clone(), asset);
			true
		})
		.await
	}

	async fn reject_asset_tx(&self, name: &str, hash: &TxHash) -> Result<(), StoreError> {
		self.mutate(|s| match s.assets.get_mut(name) {
			Some(record) => {
				let reverted = record.revert(hash);
				if reverted && record.rejected {
					info!("Rejecting asset {} created by {}", name, hash);
				} else if reverted {
					debug!("Reverted asset {} entry {}", name, hash);
				}
				reverted
			}
			None => false,
		})
		.await
	}

	async fn save_watermark(&self, height: u32) -> Result<(), StoreError> {
		self.mutate(|s| {
			s.meta = StoreMeta {
				sync_watermark: height,
				rescan_recommended: false,
			};
			true
		})
		.await?;
		write_meta_sidecar(&self.path, height).await;
		Ok(())
	}

	async fn close(&self) -> Result<(), StoreError> {
		let mut inner = self.inner.lock().await;
		inner.closed = true;
		info!("Closed store {:?}", self.path);
		Ok(())
	}

	async fn delete(&self) -> Result<(), StoreError> {
		let mut inner = self.inner.lock().await;
		// the store file goes last, so a failure leaves the data readable
		for path in [
			sibling(&self.path, ".tmp"),
			sibling(&self.path, ".meta.json"),
			self.path.clone(),
		] {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => {}
				Err(e) if e.kind() == ErrorKind::NotFound => {}
				Err(e) => return Err(e.into()),
			}
		}
		inner.snapshot = StoreSnapshot::default();
		inner.closed = true;
		info!("Deleted store {:?}", self.path);
		Ok(())
	}
}

fn decode(bytes: &[u8]) -> Result<StoreSnapshot, String> {
	let snapshot: StoreSnapshot = bincode::deserialize(bytes).map_err(|e| e.to_string())?;
	if snapshot.version != STORE_VERSION {
		return Err(format!("unsupported store version {}", snapshot.version));
	}
	Ok(snapshot)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
	let mut name = OsString::from(path.as_os_str());
	name.push(suffix);
	PathBuf::from(name)
}

/// Move a damaged store aside and write an empty one in its place.
async fn recreate(path: &Path) -> StoreSnapshot {
	let quarantine = sibling(path, ".corrupt");
	if let Err(e) = tokio::fs::rename(path, &quarantine).await {
		warn!("Failed to move corrupt store {:?} aside: {}", path, e);
	}

	let snapshot = StoreSnapshot::default();
	if let Err(e) = write_atomic(path, &snapshot).await {
		warn!("Failed to recreate store {:?}: {}", path, e);
	}
	snapshot
}

async fn write_atomic(path: &Path, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
	let bytes = bincode::serialize(snapshot)?;

	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent).await?;
	}

	let tmp = sibling(path, ".tmp");
	let mut file = tokio::fs::File::create(&tmp).await?;
	file.write_all(&bytes).await?;
	file.sync_all().await?;
	drop(file);

	tokio::fs::rename(&tmp, path).await?;
	Ok(())
}

/// Human-readable sync metadata next to the store, for diagnostics only.
async fn write_meta_sidecar(path: &Path, height: u32) {
	let metadata = serde_json::json!({
		"sync_height": height,
		"timestamp": chrono::Utc::now().to_rfc3339(),
	});

	let result = match serde_json::to_string_pretty(&metadata) {
		Ok(content) => tokio::fs::write(sibling(path, ".meta.json"), content)
			.await
			.map_err(StoreError::from),
		Err(e) => Err(e.into()),
	};
	if let Err(e) = result {
		warn!("Failed to write store metadata for {:?}: {}", path, e);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::{AssetOperation, AssetPayload, BlockHash, TxDirection};
	use std::net::{IpAddr, Ipv4Addr};

	fn block(id: u8, height: u32) -> Block {
		Block {
			hash: BlockHash([id; 32]),
			height,
			timestamp: height * 600,
			header: vec![id; 80],
		}
	}

	fn peer(last: u8) -> Peer {
		Peer {
			address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
			port: 8767,
			timestamp: 0,
			services: 1,
		}
	}

	#[tokio::test]
	async fn test_missing_file_opens_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileWalletStore::open(dir.path().join("rvn.db")).await;
		assert!(store.load_transactions().await.is_empty());
		assert!(store.load_blocks().await.is_empty());
		assert_eq!(store.load_meta().await, StoreMeta::default());
	}

	#[tokio::test]
	async fn test_corrupt_file_is_replaced() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rvn.db");
		std::fs::write(&path, b"not a snapshot").unwrap();

		let store = FileWalletStore::open(&path).await;
		assert!(store.load_peers().await.is_empty());
		assert!(sibling(&path, ".corrupt").exists());

		store.save_peers(false, &[peer(1)]).await.unwrap();
		let reopened = FileWalletStore::open(&path).await;
		assert_eq!(reopened.load_peers().await, vec![peer(1)]);
	}

	#[tokio::test]
	async fn test_blocks_replace_and_upsert() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rvn.db");
		let store = FileWalletStore::open(&path).await;

		store.save_blocks(false, &[block(1, 1), block(2, 2)]).await.unwrap();
		store.save_blocks(false, &[block(3, 3)]).await.unwrap();
		assert_eq!(store.load_blocks().await.len(), 3);

		store.save_blocks(true, &[block(9, 9)]).await.unwrap();
		let reopened = FileWalletStore::open(&path).await;
		assert_eq!(reopened.load_blocks().await, vec![block(9, 9)]);
	}

	#[tokio::test]
	async fn test_transaction_lifecycle() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rvn.db");
		let store = FileWalletStore::open(&path).await;
		let tx = Transaction::new(TxHash([1; 32]));

		store.tx_added(&tx).await.unwrap();
		store.tx_updated(&[tx.hash], 120, 5_000).await.unwrap();
		let loaded = FileWalletStore::open(&path).await.load_transactions().await;
		assert_eq!(loaded[0].block_height, 120);
		assert_eq!(loaded[0].timestamp, 5_000);

		store.tx_deleted(&tx.hash, true, true).await.unwrap();
		let reopened = FileWalletStore::open(&path).await;
		assert!(reopened.load_transactions().await.is_empty());
		assert!(reopened.load_meta().await.rescan_recommended);

		store.save_watermark(130).await.unwrap();
		let meta = FileWalletStore::open(&path).await.load_meta().await;
		assert_eq!(meta.sync_watermark, 130);
		assert!(!meta.rescan_recommended);
	}

	#[tokio::test]
	async fn test_asset_added_and_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileWalletStore::open(dir.path().join("rvn.db")).await;
		let ctx = AssetWalletContext {
			direction: TxDirection::Received,
		};

		let mut tx = Transaction::new(TxHash([1; 32]));
		tx.asset = Some(AssetPayload::new(AssetOperation::Issuance, "ROSE", 100));
		store.asset_added(&tx, &ctx).await.unwrap();
		store.asset_added(&tx, &ctx).await.unwrap();

		let mut bad = Transaction::new(TxHash([2; 32]));
		bad.asset = Some(AssetPayload::new(AssetOperation::Unknown(7), "JUNK", 1));
		store.asset_added(&bad, &ctx).await.unwrap();

		let assets = store.load_assets().await;
		assert_eq!(assets.len(), 1);
		assert_eq!(assets[0].owned_amount, 100);

		store.reject_asset_tx("ROSE", &tx.hash).await.unwrap();
		let assets = store.load_assets().await;
		assert!(assets[0].rejected);
		assert_eq!(assets[0].owned_amount, 0);

		// a reorg that re-includes the issuance restores the asset
		store.asset_added(&tx, &ctx).await.unwrap();
		let assets = store.load_assets().await;
		assert!(!assets[0].rejected);
		assert_eq!(assets[0].owned_amount, 100);
	}

	#[tokio::test]
	async fn test_rejecting_transfer_reverts_only_that_transfer() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileWalletStore::open(dir.path().join("rvn.db")).await;
		let ctx = AssetWalletContext {
			direction: TxDirection::Received,
		};

		let mut issue = Transaction::new(TxHash([1; 32]));
		issue.asset = Some(AssetPayload::new(AssetOperation::Issuance, "ROSE", 1_000));
		let mut transfer = Transaction::new(TxHash([2; 32]));
		transfer.asset = Some(AssetPayload::new(AssetOperation::Transfer, "ROSE", 10));
		store.asset_added(&issue, &ctx).await.unwrap();
		store.asset_added(&transfer, &ctx).await.unwrap();

		store.reject_asset_tx("ROSE", &transfer.hash).await.unwrap();
		let assets = store.load_assets().await;
		assert!(!assets[0].rejected);
		assert_eq!(assets[0].owned_amount, 1_000);
		assert!(!assets[0].has_applied(&transfer.hash));
	}

	#[tokio::test]
	async fn test_failed_delete_keeps_store() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rvn.db");
		let store = FileWalletStore::open(&path).await;
		store.tx_added(&Transaction::new(TxHash([1; 32]))).await.unwrap();

		// a directory in place of the sidecar cannot be removed as a file
		let sidecar = sibling(&path, ".meta.json");
		std::fs::create_dir(&sidecar).unwrap();
		std::fs::write(sidecar.join("keep"), b"x").unwrap();

		assert!(store.delete().await.is_err());
		assert!(path.exists());
		assert_eq!(store.load_transactions().await.len(), 1);
		assert!(store.tx_added(&Transaction::new(TxHash([2; 32]))).await.is_ok());
	}

	#[tokio::test]
	async fn test_delete_removes_file_and_closes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rvn.db");
		let store = FileWalletStore::open(&path).await;
		store.save_watermark(10).await.unwrap();
		assert!(path.exists());

		store.delete().await.unwrap();
		assert!(!path.exists());
		assert!(!sibling(&path, ".meta.json").exists());
		assert!(!sibling(&path, ".tmp").exists());
		assert!(matches!(
			store.tx_added(&Transaction::new(TxHash([1; 32]))).await,
			Err(StoreError::Closed)
		));
	}
}
