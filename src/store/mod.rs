//! Persistent store for one currency.
//!
//! - `repository`: the `WalletStore` trait the rest of the engine writes through.
//! - `file_store`: the single-file, copy-on-write implementation.
//! - `types`: snapshot layout, asset-metadata rows and store errors.

pub mod file_store;
pub mod repository;
pub mod types;

pub use file_store::FileWalletStore;
pub use repository::WalletStore;
pub use types::*;
