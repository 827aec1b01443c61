//! Decomposition of bundled transactions.
//!
//! An issuance or reissuance transaction bundles a base-currency movement together with one or
//! more asset-ledger entries. For accounting, the bundle is replaced by its named constituents.
//! Every other transaction passes through as a single entry.

use crate::wallet::{AssetOperation, Transaction};
use tracing::debug;

/// Expand one transaction into the ordered sub-transactions used for ledger accounting.
///
/// Constituents without an asset name are placeholders left by the bundling process and are
/// dropped. A bundle with no usable constituents yields an empty list.
pub fn decompose(tx: &Transaction) -> Vec<Transaction> {
	let bundles = matches!(
		tx.asset.as_ref().map(|a| a.operation),
		Some(AssetOperation::Issuance | AssetOperation::Reissuance)
	);
	if !bundles {
		return vec![tx.clone()];
	}

	let entries: Vec<Transaction> = tx
		.constituents
		.iter()
		.filter(|c| c.asset.as_ref().is_some_and(|a| !a.name.is_empty()))
		.cloned()
		.collect();

	let dropped = tx.constituents.len() - entries.len();
	if dropped > 0 {
		debug!(
			"Dropped {} unnamed constituent(s) while decomposing {}",
			dropped, tx.hash
		);
	}

	entries
}

/// Decompose each transaction and concatenate the results in input order.
pub fn decompose_list<'a, I>(transactions: I) -> Vec<Transaction>
where
	I: IntoIterator<Item = &'a Transaction>,
{
	transactions.into_iter().flat_map(decompose).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::{AssetPayload, TxHash};

	fn tx(id: u8) -> Transaction {
		Transaction::new(TxHash([id; 32]))
	}

	fn with_asset(id: u8, op: AssetOperation, name: &str) -> Transaction {
		let mut t = tx(id);
		t.asset = Some(AssetPayload::new(op, name, 100));
		t
	}

	#[test]
	fn test_plain_transaction_is_identity() {
		let t = tx(1);
		assert_eq!(decompose(&t), vec![t]);
	}

	#[test]
	fn test_transfer_is_identity() {
		let mut t = with_asset(1, AssetOperation::Transfer, "ROSE");
		// constituents are ignored for transfers
		t.constituents.push(with_asset(2, AssetOperation::Transfer, "OTHER"));
		assert_eq!(decompose(&t), vec![t]);
	}

	#[test]
	fn test_issuance_expands_named_constituents_in_order() {
		let mut bundle = with_asset(1, AssetOperation::Issuance, "ROSE");
		bundle.constituents = vec![
			tx(2),
			with_asset(3, AssetOperation::Issuance, "ROSE"),
			with_asset(4, AssetOperation::Issuance, ""),
			with_asset(5, AssetOperation::Transfer, "ROSE/OWNER"),
		];

		let parts = decompose(&bundle);
		let hashes: Vec<_> = parts.iter().map(|t| t.hash).collect();
		assert_eq!(hashes, vec![TxHash([3; 32]), TxHash([5; 32])]);
		assert!(!parts.contains(&bundle));
		assert!(
			parts
				.iter()
				.all(|p| p.asset.as_ref().is_some_and(|a| !a.name.is_empty()))
		);
	}

	#[test]
	fn test_reissuance_without_constituents_is_empty() {
		let bundle = with_asset(1, AssetOperation::Reissuance, "ROSE");
		assert!(decompose(&bundle).is_empty());
	}

	#[test]
	fn test_decompose_list_concatenates_in_order() {
		let a = tx(1);
		let mut b = with_asset(2, AssetOperation::Reissuance, "ROSE");
		b.constituents = vec![with_asset(3, AssetOperation::Reissuance, "ROSE")];
		let c = with_asset(4, AssetOperation::Transfer, "ROSE");

		let mut expected = decompose(&a);
		expected.extend(decompose(&b));
		expected.extend(decompose(&c));
		assert_eq!(decompose_list([&a, &b, &c]), expected);
	}
}
