//! Wallet manager: the single integration point for one currency.
//!
//! `WalletManager::start` opens the store, wires the peer manager to a `PeerEventSender`, and
//! spawns the wallet context. The context is one task that owns the store, the sync engine and
//! the ledger, and handles every `WalletMessage` in arrival order. The manager itself is only a
//! handle: it posts commands and hands out subscriptions to published state.

use crate::config::WalletConfig;
use crate::store::{FileWalletStore, WalletStore};
use crate::sync::{
	NetworkReachability, PeerEvent, PeerEventSender, PeerManager, PeerManagerContext, SyncEngine,
	SyncState, TimerEvent, WalletCommand, WalletMessage, WalletReceiver, WalletSender,
};
use crate::wallet::ledger::WalletLedger;
use crate::wallet::state::{StatePublisher, StateUpdate};
use crate::wallet::{KeySet, WalletError};

use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct WalletManager {
	currency: String,
	sender: WalletSender,
	publisher: StatePublisher,
	reachability: Arc<NetworkReachability>,
	/// Subscription opened before the context published its initial state.
	initial_updates: Mutex<Option<broadcast::Receiver<StateUpdate>>>,
	task: Option<JoinHandle<()>>,
}

impl WalletManager {
	/// Open the store for `config.currency` and start its wallet context.
	///
	/// `peer_manager` builds the peer manager from the loaded chain data and the listener it must
	/// report to. Fails with `NoKeyMaterial` when `keys` is empty; in that case nothing is
	/// spawned, and a store holding no transactions is deleted as abandoned.
	pub async fn start<F>(
		config: WalletConfig,
		keys: KeySet,
		reachability: Arc<NetworkReachability>,
		peer_manager: F,
	) -> Result<Self, WalletError>
	where
		F: FnOnce(PeerManagerContext) -> Arc<dyn PeerManager>,
	{
		let store = Arc::new(FileWalletStore::open(config.store_path()).await);

		if keys.is_empty() {
			warn!("No key material for {}, not starting sync", config.currency);
			if store.load_transactions().await.is_empty() {
				if let Err(e) = store.delete().await {
					warn!("Failed to delete abandoned store {:?}: {}", store.path(), e);
				}
			} else {
				warn!(
					"Store {:?} holds transactions, keeping it despite missing keys",
					store.path()
				);
				store.close().await?;
			}
			return Err(WalletError::NoKeyMaterial(config.currency));
		}

		let transactions = store.load_transactions().await;
		let blocks = store.load_blocks().await;
		let peers = store.load_peers().await;
		let meta = store.load_meta().await;
		info!(
			"Starting {} wallet: {} transactions, {} blocks, {} peers, watermark {}",
			config.currency,
			transactions.len(),
			blocks.len(),
			peers.len(),
			meta.sync_watermark
		);

		let publisher = StatePublisher::new(config.state_buffer);
		let initial_updates = publisher.subscribe();
		let (sender, receiver) = mpsc::unbounded_channel();

		let listener = Arc::new(PeerEventSender::new(sender.clone(), reachability.clone()));
		let peer_manager = peer_manager(PeerManagerContext {
			listener,
			transactions: transactions.clone(),
			blocks,
			peers,
			watermark: meta.sync_watermark,
		});

		let store: Arc<dyn WalletStore> = store;
		let engine = SyncEngine::new(
			&config,
			peer_manager,
			reachability.clone(),
			store.clone(),
			publisher.clone(),
			sender.clone(),
			meta.sync_watermark,
		);
		let mut ledger = WalletLedger::new(
			&config,
			keys,
			store.clone(),
			publisher.clone(),
			sender.clone(),
		);
		ledger.load(transactions);
		if meta.rescan_recommended {
			publisher.publish(StateUpdate::RescanRecommended(true));
		}

		let context = WalletContext {
			currency: config.currency.clone(),
			engine,
			ledger,
			store,
			publisher: publisher.clone(),
			receiver,
		};
		let task = tokio::spawn(context.run());

		Ok(Self {
			currency: config.currency,
			sender,
			publisher,
			reachability,
			initial_updates: Mutex::new(Some(initial_updates)),
			task: Some(task),
		})
	}

	pub fn currency(&self) -> &str {
		&self.currency
	}

	/// Subscribe to published state. The first subscriber also sees the startup state.
	pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
		self.initial_updates
			.lock()
			.ok()
			.and_then(|mut initial| initial.take())
			.unwrap_or_else(|| self.publisher.subscribe())
	}

	fn send(&self, command: WalletCommand) -> Result<(), WalletError> {
		self.sender
			.send(WalletMessage::Command(command))
			.map_err(|_| WalletError::ChannelClosed)
	}

	pub fn connect(&self) -> Result<(), WalletError> {
		self.send(WalletCommand::Connect)
	}

	pub fn disconnect(&self) -> Result<(), WalletError> {
		self.send(WalletCommand::Disconnect)
	}

	pub fn enter_background(&self) -> Result<(), WalletError> {
		self.send(WalletCommand::EnterBackground)
	}

	pub fn enter_foreground(&self) -> Result<(), WalletError> {
		self.send(WalletCommand::EnterForeground)
	}

	/// Record the platform's reachability; a change is forwarded to the context.
	pub fn set_network_reachable(&self, reachable: bool) -> Result<(), WalletError> {
		if self.reachability.set(reachable) == reachable {
			return Ok(());
		}
		self.send(WalletCommand::NetworkReachabilityChanged(reachable))
	}

	/// Disconnect, delete the store and discard all wallet state.
	///
	/// On success the context has stopped and this manager accepts no further commands. On
	/// failure the store and in-memory state are left as they were.
	pub async fn wipe(&self) -> Result<(), WalletError> {
		let (reply, done) = oneshot::channel();
		self.send(WalletCommand::Wipe(reply))?;
		done.await.map_err(|_| WalletError::ChannelClosed)?
	}

	/// Stop syncing, close the store and wait for the context to exit.
	pub async fn shutdown(mut self) -> Result<(), WalletError> {
		let (ack, done) = oneshot::channel();
		self.send(WalletCommand::Shutdown(Some(ack)))?;
		let _ = done.await;
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				error!("Wallet context for {} panicked: {}", self.currency, e);
			}
		}
		Ok(())
	}
}

impl Drop for WalletManager {
	fn drop(&mut self) {
		if self.task.is_some() {
			let _ = self
				.sender
				.send(WalletMessage::Command(WalletCommand::Shutdown(None)));
		}
	}
}

/// State owned by the wallet context task.
struct WalletContext {
	currency: String,
	engine: SyncEngine,
	ledger: WalletLedger,
	store: Arc<dyn WalletStore>,
	publisher: StatePublisher,
	receiver: WalletReceiver,
}

impl WalletContext {
	async fn run(mut self) {
		info!("Wallet context for {} running", self.currency);

		while let Some(message) = self.receiver.recv().await {
			match message {
				WalletMessage::Peer(event) => self.handle_peer_event(event).await,
				WalletMessage::Timer(timer) => self.handle_timer(timer).await,
				WalletMessage::Command(WalletCommand::Shutdown(ack)) => {
					self.shutdown().await;
					if let Some(ack) = ack {
						let _ = ack.send(());
					}
					break;
				}
				WalletMessage::Command(WalletCommand::Wipe(reply)) => {
					let result = self.wipe().await;
					let wiped = result.is_ok();
					let _ = reply.send(result);
					if wiped {
						break;
					}
				}
				WalletMessage::Command(command) => self.handle_command(command).await,
			}
		}

		info!("Wallet context for {} stopped", self.currency);
	}

	async fn handle_peer_event(&mut self, event: PeerEvent) {
		match event {
			PeerEvent::SyncStarted => self.engine.on_sync_started(),
			PeerEvent::SyncStopped(error) => {
				self.engine.on_sync_stopped(error).await;
				if *self.engine.state() == SyncState::Success {
					self.ledger.request_view_rebuild();
				}
			}
			PeerEvent::BalanceChanged(balance) => {
				self.ledger.balance_changed(balance, self.engine.state());
			}
			PeerEvent::TxAdded(tx) => {
				self.engine.tracker_mut().record_added();
				self.ledger.tx_added(tx).await;
			}
			PeerEvent::TxUpdated {
				hashes,
				block_height,
				timestamp,
			} => {
				self.engine.tracker_mut().record_updated(hashes.len());
				self.ledger
					.tx_updated(&hashes, block_height, timestamp)
					.await;
			}
			PeerEvent::TxDeleted {
				hash,
				notify_user,
				recommend_rescan,
			} => {
				self.engine.tracker_mut().record_deleted();
				self.ledger
					.tx_deleted(hash, notify_user, recommend_rescan)
					.await;
			}
			PeerEvent::TxStatusUpdate => self.ledger.request_view_rebuild(),
			PeerEvent::SaveBlocks { replace, blocks } => {
				self.engine.save_blocks(replace, &blocks).await;
				if let Some(height) = blocks.iter().map(|b| b.height).max() {
					self.engine.tracker_mut().record_height(height);
				}
				self.engine.request_progress_update();
			}
			PeerEvent::SavePeers { replace, peers } => {
				self.engine.save_peers(replace, &peers).await;
			}
		}
	}

	async fn handle_timer(&mut self, timer: TimerEvent) {
		match timer {
			TimerEvent::RetryConnect => self.engine.on_retry_timer().await,
			TimerEvent::SampleProgress => self.engine.sample_progress(),
			TimerEvent::RebuildViews => {
				self.ledger.rebuild_views(self.engine.tip_height());
			}
		}
	}

	async fn handle_command(&mut self, command: WalletCommand) {
		debug!("Wallet command: {:?}", command);
		match command {
			WalletCommand::Connect | WalletCommand::EnterForeground => self.engine.start().await,
			WalletCommand::Disconnect => self.engine.stop().await,
			WalletCommand::EnterBackground => self.engine.enter_background().await,
			WalletCommand::NetworkReachabilityChanged(reachable) => {
				self.engine.on_reachability_changed(reachable).await
			}
			WalletCommand::Wipe(_) | WalletCommand::Shutdown(_) => {}
		}
	}

	async fn wipe(&mut self) -> Result<(), WalletError> {
		info!("Wiping {} wallet", self.currency);
		self.engine.stop().await;

		if let Err(e) = self.store.delete().await {
			error!("Failed to wipe {} wallet: {}", self.currency, e);
			return Err(WalletError::WipeFailed(e.to_string()));
		}

		self.ledger.clear();
		self.publisher.publish(StateUpdate::Balance(0));
		self.publisher.publish(StateUpdate::Transactions(Vec::new()));
		self.publisher.publish(StateUpdate::RescanRecommended(false));
		info!("Wiped {} wallet", self.currency);
		Ok(())
	}

	async fn shutdown(&mut self) {
		self.engine.stop().await;
		self.ledger.clear();
		if let Err(e) = self.store.close().await {
			warn!("Failed to close store for {}: {}", self.currency, e);
		}
	}
}
