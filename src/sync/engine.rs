//! Sync engine: owns the peer-manager lifecycle.
//!
//! States move `Idle -> Connecting -> Syncing -> Success`. A recoverable network error while
//! syncing drops back to `Connecting` and arms the single retry timer; any other error is
//! surfaced as `Error`. The engine also persists blocks and peers on behalf of the peer manager
//! and samples sync progress while a session runs.

use crate::config::WalletConfig;
use crate::store::WalletStore;
use crate::sync::events::{
	PeerError, PeerManager, Reachability, TimerEvent, WalletMessage, WalletSender,
};
use crate::sync::progress::{SyncProgressTracker, sync_progress};
use crate::sync::scheduler::DeferredTask;
use crate::wallet::state::{StatePublisher, StateUpdate};
use crate::wallet::{Block, BlockHash, Peer};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
	#[default]
	Idle,
	Connecting,
	Syncing,
	Success,
	Error(PeerError),
}

pub struct SyncEngine {
	state: SyncState,
	peer_manager: Arc<dyn PeerManager>,
	reachability: Arc<dyn Reachability>,
	store: Arc<dyn WalletStore>,
	publisher: StatePublisher,
	wakeups: WalletSender,

	retry_timer: DeferredTask,
	progress_timer: DeferredTask,
	backoff: ExponentialBackoff,
	progress_interval: Duration,

	watermark: u32,
	tracker: SyncProgressTracker,

	/// Incremental block saves not yet written to the store.
	pending_blocks: BTreeMap<BlockHash, Block>,
	block_batch_size: usize,
}

impl SyncEngine {
	pub fn new(
		config: &WalletConfig,
		peer_manager: Arc<dyn PeerManager>,
		reachability: Arc<dyn Reachability>,
		store: Arc<dyn WalletStore>,
		publisher: StatePublisher,
		wakeups: WalletSender,
		watermark: u32,
	) -> Self {
		let backoff = ExponentialBackoff {
			current_interval: config.retry_initial(),
			initial_interval: config.retry_initial(),
			max_interval: config.retry_max(),
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		Self {
			state: SyncState::Idle,
			peer_manager,
			reachability,
			store,
			publisher,
			wakeups,
			retry_timer: DeferredTask::new("retry timer"),
			progress_timer: DeferredTask::new("progress sampler"),
			backoff,
			progress_interval: config.progress_interval(),
			watermark,
			tracker: SyncProgressTracker::new(watermark),
			pending_blocks: BTreeMap::new(),
			block_batch_size: config.block_batch_size.max(1),
		}
	}

	pub fn state(&self) -> &SyncState {
		&self.state
	}

	pub fn watermark(&self) -> u32 {
		self.watermark
	}

	pub fn is_retry_pending(&self) -> bool {
		self.retry_timer.is_armed()
	}

	/// Height of the last block processed by the peer manager.
	pub fn tip_height(&self) -> u32 {
		self.peer_manager.last_block_height()
	}

	pub fn tracker_mut(&mut self) -> &mut SyncProgressTracker {
		&mut self.tracker
	}

	/// Current progress fraction relative to the watermark.
	pub fn progress(&self) -> f64 {
		if self.state == SyncState::Success {
			return 1.0;
		}
		sync_progress(
			self.watermark,
			self.peer_manager.last_block_height(),
			self.peer_manager.estimated_block_height(),
		)
	}

	fn set_state(&mut self, state: SyncState) {
		if self.state != state {
			debug!("Sync state {:?} -> {:?}", self.state, state);
			self.state = state.clone();
			self.publisher.publish(StateUpdate::SyncState(state));
		}
	}

	fn publish_progress(&self, fraction: f64) {
		self.publisher.publish(StateUpdate::Progress {
			fraction,
			at: chrono::Utc::now(),
		});
	}

	/// Begin (or re-arm) a connection attempt.
	pub async fn start(&mut self) {
		self.retry_timer.cancel();
		if self.state != SyncState::Syncing {
			self.set_state(SyncState::Connecting);
		}
		info!("Connecting peer manager from watermark {}", self.watermark);
		self.peer_manager.connect().await;
	}

	/// Disconnect and go idle, leaving no timers behind.
	pub async fn stop(&mut self) {
		self.retry_timer.cancel();
		self.progress_timer.cancel();
		self.peer_manager.disconnect().await;
		self.flush_blocks().await;
		self.set_state(SyncState::Idle);
	}

	pub fn on_sync_started(&mut self) {
		info!("Sync started from watermark {}", self.watermark);
		self.tracker = SyncProgressTracker::new(self.watermark);
		self.set_state(SyncState::Syncing);
		self.request_progress_update();
	}

	pub async fn on_sync_stopped(&mut self, error: Option<PeerError>) {
		self.progress_timer.cancel();
		self.flush_blocks().await;

		match error {
			None => {
				self.retry_timer.cancel();
				self.backoff.reset();

				let height = self.peer_manager.last_block_height();
				self.tracker.record_height(height);
				info!("Sync succeeded: {}", self.tracker.summary());

				self.watermark = height;
				if let Err(e) = self.store.save_watermark(height).await {
					warn!("Failed to persist sync watermark {}: {}", height, e);
				}

				self.set_state(SyncState::Success);
				self.publish_progress(1.0);
				self.publisher.publish(StateUpdate::RescanRecommended(false));
			}
			Some(e) if e.is_recoverable() => {
				warn!("Sync stopped with recoverable error: {}", e);
				self.set_state(SyncState::Connecting);
				if self.reachability.is_reachable() {
					self.schedule_retry();
				} else {
					info!("Network unreachable, waiting for reachability before retrying");
				}
			}
			Some(e) => {
				error!("Sync stopped with fatal error: {}", e);
				self.retry_timer.cancel();
				self.set_state(SyncState::Error(e));
			}
		}
	}

	/// Arm the retry timer. Returns false if one is already pending.
	pub fn schedule_retry(&mut self) -> bool {
		if self.retry_timer.is_armed() {
			return false;
		}

		let delay = self
			.backoff
			.next_backoff()
			.unwrap_or(self.backoff.max_interval);
		info!("Retrying connection in {:?}", delay);

		let wakeups = self.wakeups.clone();
		self.retry_timer.schedule(delay, async move {
			let _ = wakeups.send(WalletMessage::Timer(TimerEvent::RetryConnect));
		})
	}

	pub async fn on_retry_timer(&mut self) {
		if self.state != SyncState::Connecting {
			debug!("Ignoring retry timer in state {:?}", self.state);
			return;
		}
		if !self.reachability.is_reachable() {
			info!("Network unreachable, deferring reconnect");
			return;
		}
		self.start().await;
	}

	/// React to a reachability change reported by the platform.
	pub async fn on_reachability_changed(&mut self, reachable: bool) {
		if reachable && self.state == SyncState::Connecting {
			info!("Network reachable again, reconnecting");
			self.start().await;
		}
	}

	/// Suspend: disconnect a finished session and drop all timers.
	pub async fn enter_background(&mut self) {
		self.retry_timer.cancel();
		self.progress_timer.cancel();
		self.flush_blocks().await;
		if self.state == SyncState::Success {
			self.peer_manager.disconnect().await;
			self.set_state(SyncState::Idle);
		}
	}

	/// Ask for a progress sample; coalesces with one already pending.
	pub fn request_progress_update(&mut self) {
		if self.state != SyncState::Syncing {
			return;
		}
		let wakeups = self.wakeups.clone();
		self.progress_timer
			.schedule(self.progress_interval, async move {
				let _ = wakeups.send(WalletMessage::Timer(TimerEvent::SampleProgress));
			});
	}

	/// Publish the latest progress and keep sampling while syncing.
	pub fn sample_progress(&mut self) {
		if self.state != SyncState::Syncing {
			return;
		}
		self.tracker.record_height(self.peer_manager.last_block_height());
		self.tracker.log_progress(false);
		self.publish_progress(self.progress());
		self.request_progress_update();
	}

	/// Persist blocks for the peer manager.
	///
	/// A replace is written at once and supersedes buffered blocks. Incremental saves are
	/// buffered and written in batches, and whenever the session stops.
	pub async fn save_blocks(&mut self, replace: bool, blocks: &[Block]) {
		if replace {
			self.pending_blocks.clear();
			if let Err(e) = self.store.save_blocks(true, blocks).await {
				warn!("Failed to save {} blocks: {}", blocks.len(), e);
			}
			return;
		}

		self.pending_blocks
			.extend(blocks.iter().map(|b| (b.hash, b.clone())));
		if self.pending_blocks.len() >= self.block_batch_size {
			self.flush_blocks().await;
		}
	}

	/// Write buffered blocks to the store.
	pub async fn flush_blocks(&mut self) {
		if self.pending_blocks.is_empty() {
			return;
		}
		let blocks: Vec<Block> = std::mem::take(&mut self.pending_blocks)
			.into_values()
			.collect();
		debug!("Flushing {} buffered blocks", blocks.len());
		if let Err(e) = self.store.save_blocks(false, &blocks).await {
			warn!("Failed to save {} blocks: {}", blocks.len(), e);
		}
	}

	pub async fn save_peers(&self, replace: bool, peers: &[Peer]) {
		if let Err(e) = self.store.save_peers(replace, peers).await {
			warn!("Failed to save {} peers: {}", peers.len(), e);
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::store::FileWalletStore;
	use crate::sync::events::{NetworkReachability, WalletReceiver};
	use crate::wallet::state::WalletProjection;
	use std::sync::Mutex;
	use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
	use tokio::sync::mpsc;

	#[derive(Default)]
	pub(crate) struct MockPeerManager {
		pub connects: AtomicUsize,
		pub disconnects: AtomicUsize,
		pub height: AtomicU32,
		pub tip: AtomicU32,
		pub calls: Mutex<Vec<&'static str>>,
	}

	#[async_trait::async_trait]
	impl PeerManager for MockPeerManager {
		async fn connect(&self) {
			self.connects.fetch_add(1, Ordering::SeqCst);
			self.calls.lock().unwrap().push("connect");
		}

		async fn disconnect(&self) {
			self.disconnects.fetch_add(1, Ordering::SeqCst);
			self.calls.lock().unwrap().push("disconnect");
		}

		fn last_block_height(&self) -> u32 {
			self.height.load(Ordering::SeqCst)
		}

		fn estimated_block_height(&self) -> u32 {
			self.tip.load(Ordering::SeqCst)
		}
	}

	struct Harness {
		engine: SyncEngine,
		peers: Arc<MockPeerManager>,
		reachability: Arc<NetworkReachability>,
		store: Arc<FileWalletStore>,
		wakeups: WalletReceiver,
		publisher: StatePublisher,
		_dir: tempfile::TempDir,
	}

	async fn harness(watermark: u32) -> Harness {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileWalletStore::open(dir.path().join("rvn.db")).await);
		let peers = Arc::new(MockPeerManager::default());
		let reachability = Arc::new(NetworkReachability::new(true));
		let publisher = StatePublisher::new(64);
		let (tx, rx) = mpsc::unbounded_channel();

		let engine = SyncEngine::new(
			&WalletConfig::default(),
			peers.clone(),
			reachability.clone(),
			store.clone(),
			publisher.clone(),
			tx,
			watermark,
		);

		Harness {
			engine,
			peers,
			reachability,
			store,
			wakeups: rx,
			publisher,
			_dir: dir,
		}
	}

	fn network_error() -> PeerError {
		PeerError::Network {
			code: 61,
			message: "connection refused".into(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_successful_session_persists_watermark() {
		let mut h = harness(100).await;
		let mut updates = h.publisher.subscribe();

		h.engine.start().await;
		assert_eq!(h.engine.state(), &SyncState::Connecting);
		h.engine.on_sync_started();
		assert_eq!(h.engine.state(), &SyncState::Syncing);

		h.peers.height.store(250, Ordering::SeqCst);
		h.engine.on_sync_stopped(None).await;

		assert_eq!(h.engine.state(), &SyncState::Success);
		assert_eq!(h.engine.watermark(), 250);
		assert_eq!(h.store.load_meta().await.sync_watermark, 250);

		let mut projection = WalletProjection::default();
		projection.drain(&mut updates);
		assert_eq!(projection.sync_state, SyncState::Success);
		assert_eq!(projection.progress, 1.0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_recoverable_error_arms_single_retry() {
		let mut h = harness(0).await;
		h.engine.start().await;
		h.engine.on_sync_started();
		h.engine.on_sync_stopped(Some(network_error())).await;

		assert_eq!(h.engine.state(), &SyncState::Connecting);
		assert!(h.engine.is_retry_pending());
		assert!(!h.engine.schedule_retry());

		// drain sampler wakeups queued before the failure
		while h.wakeups.try_recv().is_ok() {}

		tokio::time::sleep(Duration::from_secs(120)).await;
		let mut retries = 0;
		while let Ok(msg) = h.wakeups.try_recv() {
			if matches!(msg, WalletMessage::Timer(TimerEvent::RetryConnect)) {
				retries += 1;
			}
		}
		assert_eq!(retries, 1);

		h.engine.on_retry_timer().await;
		assert_eq!(h.peers.connects.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_unreachable_network_waits_for_reachability() {
		let mut h = harness(0).await;
		h.reachability.set(false);
		h.engine.start().await;
		h.engine.on_sync_stopped(Some(network_error())).await;

		assert_eq!(h.engine.state(), &SyncState::Connecting);
		assert!(!h.engine.is_retry_pending());

		h.reachability.set(true);
		h.engine.on_reachability_changed(true).await;
		assert_eq!(h.peers.connects.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_fatal_error_is_surfaced() {
		let mut h = harness(0).await;
		h.engine.start().await;
		h.engine
			.on_sync_stopped(Some(PeerError::Fatal("checkpoint mismatch".into())))
			.await;
		assert_eq!(
			h.engine.state(),
			&SyncState::Error(PeerError::Fatal("checkpoint mismatch".into()))
		);
		assert!(!h.engine.is_retry_pending());
	}

	#[tokio::test(start_paused = true)]
	async fn test_background_disconnects_only_after_success() {
		let mut h = harness(0).await;
		h.engine.start().await;
		h.engine.on_sync_stopped(Some(network_error())).await;
		h.engine.enter_background().await;
		assert_eq!(h.peers.disconnects.load(Ordering::SeqCst), 0);
		assert!(!h.engine.is_retry_pending());

		h.engine.start().await;
		h.engine.on_sync_started();
		h.engine.on_sync_stopped(None).await;
		h.engine.enter_background().await;
		assert_eq!(h.peers.disconnects.load(Ordering::SeqCst), 1);
		assert_eq!(h.engine.state(), &SyncState::Idle);
	}

	fn block(id: u8, height: u32) -> Block {
		Block {
			hash: BlockHash([id; 32]),
			height,
			timestamp: height * 600,
			header: vec![id; 80],
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_incremental_blocks_are_batched() {
		let mut h = harness(0).await;
		h.engine.block_batch_size = 3;

		h.engine.save_blocks(false, &[block(1, 1), block(2, 2)]).await;
		assert!(h.store.load_blocks().await.is_empty());

		h.engine.save_blocks(false, &[block(3, 3)]).await;
		assert_eq!(h.store.load_blocks().await.len(), 3);

		h.engine.save_blocks(false, &[block(4, 4)]).await;
		h.engine.on_sync_stopped(None).await;
		assert_eq!(h.store.load_blocks().await.len(), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_block_replace_drops_buffered_blocks() {
		let mut h = harness(0).await;
		h.engine.save_blocks(false, &[block(1, 1), block(2, 2)]).await;
		h.engine.save_blocks(true, &[block(9, 9)]).await;
		h.engine.stop().await;

		let blocks = h.store.load_blocks().await;
		assert_eq!(blocks, vec![block(9, 9)]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_progress_sampling_coalesces() {
		let mut h = harness(100).await;
		h.peers.tip.store(200, Ordering::SeqCst);
		h.peers.height.store(150, Ordering::SeqCst);
		h.engine.on_sync_started();

		h.engine.request_progress_update();
		h.engine.request_progress_update();
		tokio::time::sleep(Duration::from_millis(600)).await;

		let mut samples = 0;
		while let Ok(msg) = h.wakeups.try_recv() {
			if matches!(msg, WalletMessage::Timer(TimerEvent::SampleProgress)) {
				samples += 1;
			}
		}
		assert_eq!(samples, 1);
		assert_eq!(h.engine.progress(), 0.5);
	}
}
