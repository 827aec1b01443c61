//! Published wallet state.
//!
//! The wallet context never shares mutable structures with the UI. It publishes typed deltas on a
//! broadcast channel, and each subscriber folds them into its own `WalletProjection`.

use crate::sync::SyncState;
use crate::wallet::TxHash;
use crate::wallet::view::TransactionView;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum WalletNotification {
	FundsReceived { amount: u64 },
	TransactionInvalidated { hash: TxHash },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
	Balance(u64),
	SyncState(SyncState),
	Progress { fraction: f64, at: DateTime<Utc> },
	ReceiveAddress(String),
	Transactions(Vec<TransactionView>),
	RescanRecommended(bool),
	Notification(WalletNotification),
}

#[derive(Debug, Clone)]
pub struct StatePublisher {
	sender: broadcast::Sender<StateUpdate>,
}

impl StatePublisher {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publish a delta. Having no subscribers is not an error.
	pub fn publish(&self, update: StateUpdate) {
		let _ = self.sender.send(update);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
		self.sender.subscribe()
	}
}

/// Snapshot a subscriber builds from the deltas it receives.
#[derive(Debug, Clone, Default)]
pub struct WalletProjection {
	pub balance: u64,
	pub sync_state: SyncState,
	pub progress: f64,
	pub progress_at: Option<DateTime<Utc>>,
	pub receive_address: String,
	pub transactions: Vec<TransactionView>,
	pub rescan_recommended: bool,
	pub notifications: Vec<WalletNotification>,
}

impl WalletProjection {
	pub fn apply(&mut self, update: StateUpdate) {
		match update {
			StateUpdate::Balance(balance) => self.balance = balance,
			StateUpdate::SyncState(state) => self.sync_state = state,
			StateUpdate::Progress { fraction, at } => {
				self.progress = fraction;
				self.progress_at = Some(at);
			}
			StateUpdate::ReceiveAddress(address) => self.receive_address = address,
			StateUpdate::Transactions(views) => self.transactions = views,
			StateUpdate::RescanRecommended(flag) => self.rescan_recommended = flag,
			StateUpdate::Notification(n) => self.notifications.push(n),
		}
	}

	/// Apply every delta currently queued on `receiver`.
	pub fn drain(&mut self, receiver: &mut broadcast::Receiver<StateUpdate>) {
		loop {
			match receiver.try_recv() {
				Ok(update) => self.apply(update),
				Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
				Err(_) => break,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_projection_folds_deltas() {
		let publisher = StatePublisher::new(16);
		let mut rx = publisher.subscribe();

		publisher.publish(StateUpdate::Balance(10));
		publisher.publish(StateUpdate::SyncState(SyncState::Syncing));
		publisher.publish(StateUpdate::Balance(25));
		publisher.publish(StateUpdate::Notification(
			WalletNotification::FundsReceived { amount: 15 },
		));

		let mut projection = WalletProjection::default();
		projection.drain(&mut rx);
		assert_eq!(projection.balance, 25);
		assert_eq!(projection.sync_state, SyncState::Syncing);
		assert_eq!(
			projection.notifications,
			vec![WalletNotification::FundsReceived { amount: 15 }]
		);
	}
}
