//! Messages flowing into the wallet context.
//!
//! The wallet context is a single task that owns the store, the sync engine and the ledger. Every
//! input reaches it as a `WalletMessage` on one channel, so store mutations and peer-manager
//! calls are serialized without further locking:
//!
//! - `PeerEvent`s are posted by the peer manager through `PeerEventSender`, its
//!   `PeerManagerListener` implementation.
//! - `WalletCommand`s come from the `WalletManager` handle held by the application.
//! - `TimerEvent`s are posted by the engine's and ledger's own deferred tasks when they fire.

use crate::wallet::{Block, Peer, Transaction, TxHash, WalletError};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Error reported by the peer manager when a sync session stops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
	/// Transient socket or connectivity failure, carrying the POSIX error code.
	#[error("network error {code}: {message}")]
	Network { code: i32, message: String },

	#[error("fatal peer error: {0}")]
	Fatal(String),
}

impl PeerError {
	pub fn is_recoverable(&self) -> bool {
		matches!(self, PeerError::Network { .. })
	}
}

/// Callbacks raised by the peer manager.
#[derive(Debug)]
pub enum PeerEvent {
	SyncStarted,
	SyncStopped(Option<PeerError>),
	BalanceChanged(u64),
	TxAdded(Transaction),
	TxUpdated {
		hashes: Vec<TxHash>,
		block_height: u32,
		timestamp: u32,
	},
	TxDeleted {
		hash: TxHash,
		notify_user: bool,
		recommend_rescan: bool,
	},
	TxStatusUpdate,
	SaveBlocks {
		replace: bool,
		blocks: Vec<Block>,
	},
	SavePeers {
		replace: bool,
		peers: Vec<Peer>,
	},
}

/// Requests from the application.
#[derive(Debug)]
pub enum WalletCommand {
	Connect,
	Disconnect,
	EnterBackground,
	EnterForeground,
	NetworkReachabilityChanged(bool),
	Wipe(oneshot::Sender<Result<(), WalletError>>),
	Shutdown(Option<oneshot::Sender<()>>),
}

/// Deferred work coming due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
	RetryConnect,
	SampleProgress,
	RebuildViews,
}

#[derive(Debug)]
pub enum WalletMessage {
	Peer(PeerEvent),
	Command(WalletCommand),
	Timer(TimerEvent),
}

pub type WalletSender = mpsc::UnboundedSender<WalletMessage>;
pub type WalletReceiver = mpsc::UnboundedReceiver<WalletMessage>;

/// Network reachability as observed by the platform.
pub trait Reachability: Send + Sync {
	fn is_reachable(&self) -> bool;
}

/// Reachability flag flipped by the application.
#[derive(Debug)]
pub struct NetworkReachability(AtomicBool);

impl NetworkReachability {
	pub fn new(reachable: bool) -> Self {
		Self(AtomicBool::new(reachable))
	}

	/// Store the new value and return the previous one.
	pub fn set(&self, reachable: bool) -> bool {
		self.0.swap(reachable, Ordering::SeqCst)
	}
}

impl Reachability for NetworkReachability {
	fn is_reachable(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// The peer manager the engine drives. It already speaks the wire protocol.
#[async_trait::async_trait]
pub trait PeerManager: Send + Sync {
	async fn connect(&self);
	async fn disconnect(&self);
	/// Height of the last block the peer manager has processed.
	fn last_block_height(&self) -> u32;
	/// Best chain height advertised by connected peers.
	fn estimated_block_height(&self) -> u32;
}

/// Capability set the peer manager calls back into.
///
/// Callbacks may be raised from any thread; implementations must not block.
pub trait PeerManagerListener: Send + Sync {
	fn sync_started(&self);
	fn sync_stopped(&self, error: Option<PeerError>);
	fn balance_changed(&self, balance: u64);
	fn tx_added(&self, tx: Transaction);
	fn tx_updated(&self, hashes: Vec<TxHash>, block_height: u32, timestamp: u32);
	fn tx_deleted(&self, hash: TxHash, notify_user: bool, recommend_rescan: bool);
	fn tx_status_update(&self);
	fn save_blocks(&self, replace: bool, blocks: Vec<Block>);
	fn save_peers(&self, replace: bool, peers: Vec<Peer>);
	fn network_is_reachable(&self) -> bool;
}

/// Everything the peer manager needs at construction.
pub struct PeerManagerContext {
	pub listener: Arc<dyn PeerManagerListener>,
	pub transactions: Vec<Transaction>,
	pub blocks: Vec<Block>,
	pub peers: Vec<Peer>,
	/// Last block height fully processed by a prior session.
	pub watermark: u32,
}

/// `PeerManagerListener` that posts each callback to the wallet context.
pub struct PeerEventSender {
	sender: WalletSender,
	reachability: Arc<dyn Reachability>,
}

impl PeerEventSender {
	pub fn new(sender: WalletSender, reachability: Arc<dyn Reachability>) -> Self {
		Self {
			sender,
			reachability,
		}
	}

	fn post(&self, event: PeerEvent) {
		if self.sender.send(WalletMessage::Peer(event)).is_err() {
			warn!("Wallet context is gone, dropping peer event");
		}
	}
}

impl PeerManagerListener for PeerEventSender {
	fn sync_started(&self) {
		self.post(PeerEvent::SyncStarted);
	}

	fn sync_stopped(&self, error: Option<PeerError>) {
		self.post(PeerEvent::SyncStopped(error));
	}

	fn balance_changed(&self, balance: u64) {
		self.post(PeerEvent::BalanceChanged(balance));
	}

	fn tx_added(&self, tx: Transaction) {
		self.post(PeerEvent::TxAdded(tx));
	}

	fn tx_updated(&self, hashes: Vec<TxHash>, block_height: u32, timestamp: u32) {
		self.post(PeerEvent::TxUpdated {
			hashes,
			block_height,
			timestamp,
		});
	}

	fn tx_deleted(&self, hash: TxHash, notify_user: bool, recommend_rescan: bool) {
		self.post(PeerEvent::TxDeleted {
			hash,
			notify_user,
			recommend_rescan,
		});
	}

	fn tx_status_update(&self) {
		self.post(PeerEvent::TxStatusUpdate);
	}

	fn save_blocks(&self, replace: bool, blocks: Vec<Block>) {
		self.post(PeerEvent::SaveBlocks { replace, blocks });
	}

	fn save_peers(&self, replace: bool, peers: Vec<Peer>) {
		self.post(PeerEvent::SavePeers { replace, peers });
	}

	fn network_is_reachable(&self) -> bool {
		self.reachability.is_reachable()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_recoverable_classification() {
		let network = PeerError::Network {
			code: 54,
			message: "connection reset by peer".into(),
		};
		assert!(network.is_recoverable());
		assert!(!PeerError::Fatal("bad genesis".into()).is_recoverable());
	}

	#[test]
	fn test_listener_posts_events_in_order() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let reachability = Arc::new(NetworkReachability::new(true));
		let listener = PeerEventSender::new(tx, reachability.clone());

		listener.sync_started();
		listener.balance_changed(42);
		listener.sync_stopped(None);

		assert!(matches!(
			rx.try_recv(),
			Ok(WalletMessage::Peer(PeerEvent::SyncStarted))
		));
		assert!(matches!(
			rx.try_recv(),
			Ok(WalletMessage::Peer(PeerEvent::BalanceChanged(42)))
		));
		assert!(matches!(
			rx.try_recv(),
			Ok(WalletMessage::Peer(PeerEvent::SyncStopped(None)))
		));

		assert!(listener.network_is_reachable());
		reachability.set(false);
		assert!(!listener.network_is_reachable());
	}
}
