//! `wallet-sync`: inspect a wallet store offline.
//!
//! Usage: `wallet-sync [STORE] [SCRIPT_HEX...]`
//!
//! Prints the sync watermark, table sizes, the asset ledger, and (when owned scripts are given)
//! the balance and transaction history as the wallet would publish them. Settings are read from
//! the JSON file named by `WALLET_SYNC_CONFIG`, if set.

use asset_wallet_sync::store::{FileWalletStore, WalletStore};
use asset_wallet_sync::utils::format_token_amount;
use asset_wallet_sync::wallet::ledger::COIN_DECIMALS;
use asset_wallet_sync::wallet::{KeySet, compute_balance, transaction_views};
use asset_wallet_sync::{WalletConfig, WalletError};

use std::path::PathBuf;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("{}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), WalletError> {
	let config = match std::env::var_os("WALLET_SYNC_CONFIG") {
		Some(path) => WalletConfig::from_json_file(PathBuf::from(path))?,
		None => WalletConfig::default(),
	};

	let mut args = std::env::args().skip(1);
	let store_path = args
		.next()
		.map(PathBuf::from)
		.unwrap_or_else(|| config.store_path());

	let mut scripts = Vec::new();
	for arg in args {
		match hex::decode(&arg) {
			Ok(script) => scripts.push(script),
			Err(e) => warn!("Ignoring script {:?}: {}", arg, e),
		}
	}
	let keys = KeySet::new(scripts, "");

	if !store_path.exists() {
		return Err(WalletError::Config(format!(
			"No store at {:?}",
			store_path
		)));
	}
	let store = FileWalletStore::open(&store_path).await;

	let meta = store.load_meta().await;
	let transactions = store.load_transactions().await;
	let blocks = store.load_blocks().await;
	let peers = store.load_peers().await;
	let assets = store.load_assets().await;
	let tip = blocks.last().map(|b| b.height).unwrap_or(meta.sync_watermark);

	info!("{} store {:?}", config.currency, store_path);
	info!(
		"Watermark {}, tip {}, rescan recommended: {}",
		meta.sync_watermark, tip, meta.rescan_recommended
	);
	info!(
		"{} transactions, {} blocks, {} peers, {} assets",
		transactions.len(),
		blocks.len(),
		peers.len(),
		assets.len()
	);

	for asset in &assets {
		info!(
			"Asset {}: supply {}, owned {}, reissuable {}, height {}{}",
			asset.name,
			asset.total_supply,
			asset.owned_amount,
			asset.reissuable,
			asset.block_height,
			if asset.rejected { " (rejected)" } else { "" }
		);
	}

	if keys.is_empty() {
		info!("No scripts given, skipping balance and history");
		return Ok(());
	}

	let balance = compute_balance(&keys, &transactions);
	info!(
		"Balance: {} {}",
		format_token_amount(balance, COIN_DECIMALS),
		config.currency
	);

	for view in transaction_views(&keys, &transactions, tip, config.reorg_safety_depth) {
		let asset = view
			.asset
			.as_ref()
			.map(|a| format!(" [{:?} {} x{}]", a.operation, a.name, a.amount))
			.unwrap_or_default();
		info!(
			"{} {:?} {:?} {} ({} confirmations){}",
			view.hash,
			view.status,
			view.direction,
			format_token_amount(view.amount, COIN_DECIMALS),
			view.confirmations,
			asset
		);
	}

	Ok(())
}
