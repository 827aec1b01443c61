//! Wallet state for one currency.
//!
//! - `types`: transactions, blocks, peers, asset payloads and key material.
//! - `ledger`: balance, asset bookkeeping and the debounced transaction history.
//! - `view`: presentation rows and display ordering.
//! - `state`: published state deltas and the subscriber-side projection.
//! - `manager`: the wallet context task and its handle.

pub mod ledger;
pub mod manager;
pub mod state;
pub mod types;
pub mod view;

pub use ledger::{TxArena, TxId, WalletLedger, compute_balance, transaction_views};
pub use manager::WalletManager;
pub use state::{StatePublisher, StateUpdate, WalletNotification, WalletProjection};
pub use types::*;
pub use view::{AssetView, TransactionView, TxStatus};
