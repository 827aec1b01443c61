//! Wallet synchronization engine.
//!
//! Keeps a per-currency transaction store in sync with a peer-to-peer network through an external
//! peer manager, reconciles incoming transactions against the wallet's keys, tracks layered asset
//! operations, and publishes balance, sync state and history to subscribers.

pub mod asset;
pub mod config;
pub mod store;
pub mod sync;
pub mod utils;
pub mod wallet;

pub use config::WalletConfig;
pub use wallet::{KeySet, WalletError, WalletManager};
