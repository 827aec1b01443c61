//! Wallet ledger for one managed key-set.
//!
//! The ledger keeps every known transaction in an arena addressed by stable ids, recomputes the
//! balance from scratch on each mutation, maintains the asset side-ledger through the store, and
//! publishes a debounced, ordered transaction history.

use crate::asset::{classify, decompose, decompose_list, is_valid_asset};
use crate::config::WalletConfig;
use crate::store::{AssetWalletContext, WalletStore};
use crate::sync::{DeferredTask, SyncState, TimerEvent, WalletMessage, WalletSender};
use crate::utils::format_token_amount;
use crate::wallet::state::{StatePublisher, StateUpdate, WalletNotification};
use crate::wallet::view::{
	AssetView, TransactionView, TxStatus, confirmations, order_for_display,
};
use crate::wallet::{KeySet, OutPoint, Transaction, TxDirection, TxHash, TxOutput};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Display precision of the base currency.
pub const COIN_DECIMALS: u32 = 8;

/// Stable index of a transaction record in a `TxArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(usize);

/// Transaction records addressed by stable id or by hash, iterated in first-seen order.
#[derive(Debug, Default)]
pub struct TxArena {
	records: Vec<Option<Transaction>>,
	by_hash: HashMap<TxHash, TxId>,
}

impl TxArena {
	/// Insert `tx`, replacing the record with the same hash in place.
	pub fn insert(&mut self, tx: Transaction) -> TxId {
		if let Some(&id) = self.by_hash.get(&tx.hash) {
			self.records[id.0] = Some(tx);
			return id;
		}
		let id = TxId(self.records.len());
		self.by_hash.insert(tx.hash, id);
		self.records.push(Some(tx));
		id
	}

	pub fn id_of(&self, hash: &TxHash) -> Option<TxId> {
		self.by_hash.get(hash).copied()
	}

	pub fn get(&self, id: TxId) -> Option<&Transaction> {
		self.records.get(id.0).and_then(Option::as_ref)
	}

	pub fn get_by_hash(&self, hash: &TxHash) -> Option<&Transaction> {
		self.id_of(hash).and_then(|id| self.get(id))
	}

	pub fn get_mut_by_hash(&mut self, hash: &TxHash) -> Option<&mut Transaction> {
		let id = self.id_of(hash)?;
		self.records.get_mut(id.0).and_then(Option::as_mut)
	}

	pub fn remove(&mut self, hash: &TxHash) -> Option<Transaction> {
		let id = self.by_hash.remove(hash)?;
		self.records[id.0].take()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
		self.records.iter().flatten()
	}

	pub fn len(&self) -> usize {
		self.by_hash.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_hash.is_empty()
	}

	pub fn clear(&mut self) {
		self.records.clear();
		self.by_hash.clear();
	}
}

/// Sum of unspent outputs paying `keys`, with spentness judged against the same transaction set.
///
/// Outputs are keyed by outpoint, so a transaction listed more than once counts once.
pub fn compute_balance<'a, I>(keys: &KeySet, transactions: I) -> u64
where
	I: IntoIterator<Item = &'a Transaction>,
{
	let mut unspent: HashMap<OutPoint, u64> = HashMap::new();
	let mut spent: HashSet<OutPoint> = HashSet::new();

	for tx in transactions {
		spent.extend(tx.inputs.iter().copied());
		for (index, output) in tx.outputs.iter().enumerate() {
			if keys.owns(&output.script) {
				let outpoint = OutPoint {
					hash: tx.hash,
					index: index as u32,
				};
				unspent.insert(outpoint, output.amount);
			}
		}
	}

	unspent
		.iter()
		.filter(|(outpoint, _)| !spent.contains(outpoint))
		.fold(0u64, |sum, (_, amount)| sum.saturating_add(*amount))
}

/// Direction and display amount of `tx` for `keys`.
///
/// `previous_output` resolves input references against known transactions.
pub fn direction_of<'a, F>(keys: &KeySet, tx: &Transaction, previous_output: F) -> (TxDirection, u64)
where
	F: Fn(&OutPoint) -> Option<&'a TxOutput>,
{
	let received = tx
		.outputs
		.iter()
		.filter(|o| keys.owns(&o.script))
		.fold(0u64, |sum, o| sum.saturating_add(o.amount));
	let sent = tx
		.inputs
		.iter()
		.filter_map(&previous_output)
		.filter(|o| keys.owns(&o.script))
		.fold(0u64, |sum, o| sum.saturating_add(o.amount));

	if sent == 0 {
		(TxDirection::Received, received)
	} else if !tx.outputs.is_empty() && tx.outputs.iter().all(|o| keys.owns(&o.script)) {
		(TxDirection::Moved, 0)
	} else {
		(TxDirection::Sent, sent.saturating_sub(received))
	}
}

/// History rows for `transactions`: decomposed, ordered for display, and mapped to views.
pub fn transaction_views<'a, I>(
	keys: &KeySet,
	transactions: I,
	tip: u32,
	reorg_safety_depth: u32,
) -> Vec<TransactionView>
where
	I: IntoIterator<Item = &'a Transaction>,
{
	let txs: Vec<&Transaction> = transactions.into_iter().collect();
	let by_hash: HashMap<TxHash, &Transaction> = txs.iter().map(|t| (t.hash, *t)).collect();
	let lookup = |op: &OutPoint| {
		by_hash
			.get(&op.hash)
			.and_then(|t| t.outputs.get(op.index as usize))
	};

	let mut entries = decompose_list(txs.iter().copied());
	order_for_display(&mut entries);

	entries
		.iter()
		.map(|tx| {
			let (direction, amount) = direction_of(keys, tx, lookup);
			let confirmations = confirmations(tx.block_height, tip);
			let status = if !tx.is_confirmed() {
				TxStatus::Pending
			} else if confirmations >= reorg_safety_depth {
				TxStatus::Final
			} else {
				TxStatus::Confirmed
			};
			let asset = classify(tx.asset.as_ref()).and_then(|operation| {
				tx.asset.as_ref().map(|payload| AssetView {
					name: payload.display_name(),
					operation,
					amount: payload.amount,
				})
			});

			TransactionView {
				hash: tx.hash,
				direction,
				amount,
				timestamp: tx.timestamp,
				block_height: tx.block_height,
				confirmations,
				status,
				asset,
			}
		})
		.collect()
}

pub struct WalletLedger {
	keys: KeySet,
	arena: TxArena,
	/// Recomputed balance, as published.
	balance: u64,
	/// Last balance reported by the peer manager.
	reported_balance: u64,

	store: Arc<dyn WalletStore>,
	publisher: StatePublisher,
	wakeups: WalletSender,

	view_timer: DeferredTask,
	view_debounce: Duration,
	reorg_safety_depth: u32,
}

impl WalletLedger {
	pub fn new(
		config: &WalletConfig,
		keys: KeySet,
		store: Arc<dyn WalletStore>,
		publisher: StatePublisher,
		wakeups: WalletSender,
	) -> Self {
		Self {
			keys,
			arena: TxArena::default(),
			balance: 0,
			reported_balance: 0,
			store,
			publisher,
			wakeups,
			view_timer: DeferredTask::new("transaction view rebuild"),
			view_debounce: config.view_debounce(),
			reorg_safety_depth: config.reorg_safety_depth,
		}
	}

	/// Seed the ledger from transactions loaded at startup.
	pub fn load(&mut self, transactions: Vec<Transaction>) {
		for tx in transactions {
			self.arena.insert(tx);
		}
		self.balance = compute_balance(&self.keys, self.arena.iter());
		self.reported_balance = self.balance;
		info!(
			"Ledger loaded {} transactions, balance {}",
			self.arena.len(),
			format_token_amount(self.balance, COIN_DECIMALS)
		);

		self.publisher.publish(StateUpdate::Balance(self.balance));
		self.publisher
			.publish(StateUpdate::ReceiveAddress(self.keys.receive_address.clone()));
		self.request_view_rebuild();
	}

	pub fn balance(&self) -> u64 {
		self.balance
	}

	pub fn receive_address(&self) -> &str {
		&self.keys.receive_address
	}

	pub fn transactions(&self) -> &TxArena {
		&self.arena
	}

	fn recompute_balance(&mut self) {
		let balance = compute_balance(&self.keys, self.arena.iter());
		if balance != self.balance {
			debug!("Balance {} -> {}", self.balance, balance);
			self.balance = balance;
			self.publisher.publish(StateUpdate::Balance(balance));
		}
	}

	/// Handle a balance report from the peer manager.
	///
	/// Returns the amount announced as received, if any. Announcements only happen once sync has
	/// succeeded, so the initial catch-up does not replay every historical receive.
	pub fn balance_changed(&mut self, new_balance: u64, sync_state: &SyncState) -> Option<u64> {
		let previous = self.reported_balance;
		self.reported_balance = new_balance;
		self.recompute_balance();

		if self.balance != new_balance {
			debug!(
				"Reported balance {} differs from recomputed {}",
				new_balance, self.balance
			);
		}

		if new_balance > previous && *sync_state == SyncState::Success {
			let amount = new_balance - previous;
			info!(
				"Funds received: {}",
				format_token_amount(amount, COIN_DECIMALS)
			);
			self.publisher.publish(StateUpdate::Notification(
				WalletNotification::FundsReceived { amount },
			));
			return Some(amount);
		}
		None
	}

	fn direction(&self, tx: &Transaction) -> TxDirection {
		let arena = &self.arena;
		direction_of(&self.keys, tx, |op| {
			arena
				.get_by_hash(&op.hash)
				.and_then(|t| t.outputs.get(op.index as usize))
		})
		.0
	}

	/// Record every valid asset entry `tx` decomposes into.
	async fn record_assets(&self, tx: &Transaction) {
		for entry in decompose(tx) {
			if !is_valid_asset(entry.asset.as_ref()) {
				continue;
			}
			let ctx = AssetWalletContext {
				direction: self.direction(&entry),
			};
			if let Err(e) = self.store.asset_added(&entry, &ctx).await {
				warn!("Failed to record asset entry {}: {}", entry.hash, e);
			}
		}
	}

	/// Carry the confirmation height of `tx` onto the asset rows its entries last touched.
	async fn confirm_assets(&self, tx: &Transaction) {
		let entries: HashSet<TxHash> = decompose(tx)
			.iter()
			.filter(|e| is_valid_asset(e.asset.as_ref()))
			.map(|e| e.hash)
			.collect();
		if entries.is_empty() {
			return;
		}

		for mut record in self.store.load_assets().await {
			if record.last_tx.is_some_and(|h| entries.contains(&h))
				&& record.block_height != tx.block_height
			{
				record.block_height = tx.block_height;
				let name = record.name.clone();
				if let Err(e) = self.store.update_asset_data(record).await {
					warn!("Failed to update asset {}: {}", name, e);
				}
			}
		}
	}

	pub async fn tx_added(&mut self, tx: Transaction) {
		debug!("Transaction added: {}", tx.hash);
		if let Err(e) = self.store.tx_added(&tx).await {
			warn!("Failed to store transaction {}: {}", tx.hash, e);
		}

		let id = self.arena.insert(tx);
		if let Some(tx) = self.arena.get(id) {
			self.record_assets(tx).await;
		}
		self.recompute_balance();
		self.request_view_rebuild();
	}

	pub async fn tx_updated(&mut self, hashes: &[TxHash], block_height: u32, timestamp: u32) {
		debug!(
			"{} transaction(s) updated to height {}",
			hashes.len(),
			block_height
		);
		if let Err(e) = self.store.tx_updated(hashes, block_height, timestamp).await {
			warn!("Failed to update {} transactions: {}", hashes.len(), e);
		}

		for hash in hashes {
			if let Some(tx) = self.arena.get_mut_by_hash(hash) {
				tx.block_height = block_height;
				tx.timestamp = timestamp;
			}
		}
		for hash in hashes {
			if let Some(tx) = self.arena.get_by_hash(hash) {
				self.record_assets(tx).await;
				self.confirm_assets(tx).await;
			}
		}
		self.recompute_balance();
		self.request_view_rebuild();
	}

	pub async fn tx_deleted(&mut self, hash: TxHash, notify_user: bool, recommend_rescan: bool) {
		info!(
			"Transaction deleted: {} (notify: {}, rescan: {})",
			hash, notify_user, recommend_rescan
		);
		if let Err(e) = self
			.store
			.tx_deleted(&hash, notify_user, recommend_rescan)
			.await
		{
			warn!("Failed to delete transaction {}: {}", hash, e);
		}

		if let Some(tx) = self.arena.remove(&hash) {
			for entry in decompose(&tx) {
				let Some(payload) = entry.asset.as_ref() else {
					continue;
				};
				if !is_valid_asset(Some(payload)) {
					continue;
				}
				if let Err(e) = self
					.store
					.reject_asset_tx(&payload.display_name(), &entry.hash)
					.await
				{
					warn!("Failed to reject asset entry {}: {}", entry.hash, e);
				}
			}
		}

		self.recompute_balance();
		if notify_user {
			self.publisher.publish(StateUpdate::Notification(
				WalletNotification::TransactionInvalidated { hash },
			));
		}
		if recommend_rescan {
			self.publisher.publish(StateUpdate::RescanRecommended(true));
		}
		self.request_view_rebuild();
	}

	/// Arm the debounced rebuild; a rebuild already pending absorbs this request.
	pub fn request_view_rebuild(&mut self) {
		let wakeups = self.wakeups.clone();
		self.view_timer.schedule(self.view_debounce, async move {
			let _ = wakeups.send(WalletMessage::Timer(TimerEvent::RebuildViews));
		});
	}

	/// Rebuild and publish the history. An empty result never replaces a published history.
	pub fn rebuild_views(&self, tip: u32) -> bool {
		let views = transaction_views(&self.keys, self.arena.iter(), tip, self.reorg_safety_depth);
		if views.is_empty() {
			debug!("Transaction view rebuild produced no rows, keeping current history");
			return false;
		}
		debug!("Publishing {} transaction views", views.len());
		self.publisher.publish(StateUpdate::Transactions(views));
		true
	}

	/// Drop all in-memory state.
	pub fn clear(&mut self) {
		self.view_timer.cancel();
		self.arena.clear();
		self.balance = 0;
		self.reported_balance = 0;
	}
}
