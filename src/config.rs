//! Wallet configuration.

use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration for one currency's wallet engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
	/// Currency code, also used to name the store file.
	pub currency: String,
	/// Directory holding the store file.
	pub data_dir: PathBuf,
	/// Explicit store file, overriding `data_dir`/`currency`.
	pub store_path: Option<PathBuf>,
	/// Progress sampling interval while syncing.
	pub progress_interval_ms: u64,
	/// Debounce window for transaction-view rebuilds.
	pub view_debounce_ms: u64,
	pub retry_initial_ms: u64,
	pub retry_max_ms: u64,
	/// Confirmations after which blocks are treated as immutable.
	pub reorg_safety_depth: u32,
	/// Capacity of the published-state broadcast channel.
	pub state_buffer: usize,
	/// Incremental block saves buffered before one store write.
	pub block_batch_size: usize,
}

impl Default for WalletConfig {
	fn default() -> Self {
		Self {
			currency: "RVN".to_string(),
			data_dir: PathBuf::from("."),
			store_path: None,
			progress_interval_ms: 500,
			view_debounce_ms: 400,
			retry_initial_ms: 1_000,
			retry_max_ms: 60_000,
			reorg_safety_depth: 6,
			state_buffer: 256,
			block_batch_size: 500,
		}
	}
}

impl WalletConfig {
	/// Load from a JSON file. A missing file yields the defaults.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
		let path = path.as_ref();
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!("No config at {:?}, using defaults", path);
				return Ok(Self::default());
			}
			Err(e) => {
				return Err(WalletError::Config(format!(
					"Failed to read {:?}: {}",
					path, e
				)));
			}
		};

		serde_json::from_str(&content)
			.map_err(|e| WalletError::Config(format!("Failed to parse {:?}: {}", path, e)))
	}

	pub fn store_path(&self) -> PathBuf {
		self.store_path.clone().unwrap_or_else(|| {
			self.data_dir
				.join(format!("{}.db", self.currency.to_lowercase()))
		})
	}

	pub fn progress_interval(&self) -> Duration {
		Duration::from_millis(self.progress_interval_ms)
	}

	pub fn view_debounce(&self) -> Duration {
		Duration::from_millis(self.view_debounce_ms)
	}

	pub fn retry_initial(&self) -> Duration {
		Duration::from_millis(self.retry_initial_ms)
	}

	pub fn retry_max(&self) -> Duration {
		Duration::from_millis(self.retry_max_ms)
	}
}
