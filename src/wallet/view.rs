use crate::wallet::{AssetOperation, Transaction, TxDirection, TxHash};

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
	Pending,
	Confirmed,
	/// Buried below the reorg-safety depth.
	Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetView {
	pub name: String,
	pub operation: AssetOperation,
	pub amount: u64,
}

/// Presentation model for one history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
	pub hash: TxHash,
	pub direction: TxDirection,
	pub amount: u64,
	pub timestamp: u32,
	pub block_height: u32,
	pub confirmations: u32,
	pub status: TxStatus,
	pub asset: Option<AssetView>,
}

/// Sort most-recent first, with every unconfirmed entry (timestamp 0) ahead of confirmed ones.
///
/// The sort is stable, so pending entries keep their relative order.
pub fn order_for_display(entries: &mut [Transaction]) {
	entries.sort_by(|a, b| match (a.timestamp == 0, b.timestamp == 0) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Less,
		(false, true) => Ordering::Greater,
		(false, false) => b.timestamp.cmp(&a.timestamp),
	});
}

/// Confirmations of a transaction at `block_height` given the current tip.
pub fn confirmations(block_height: u32, tip: u32) -> u32 {
	if block_height == 0 || tip < block_height {
		0
	} else {
		tip - block_height + 1
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tx(id: u8, timestamp: u32) -> Transaction {
		let mut t = Transaction::new(TxHash([id; 32]));
		t.timestamp = timestamp;
		t
	}

	#[test]
	fn test_pending_first_then_newest() {
		let mut entries = vec![tx(1, 0), tx(2, 100), tx(3, 0), tx(4, 50)];
		order_for_display(&mut entries);
		let order: Vec<u8> = entries.iter().map(|t| t.hash.0[0]).collect();
		assert_eq!(order, vec![1, 3, 2, 4]);
	}

	#[test]
	fn test_confirmations() {
		assert_eq!(confirmations(0, 500), 0);
		assert_eq!(confirmations(500, 500), 1);
		assert_eq!(confirmations(495, 500), 6);
		assert_eq!(confirmations(600, 500), 0);
	}
}
