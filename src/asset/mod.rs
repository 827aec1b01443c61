//! Asset payload handling.
//!
//! Assets are named tokens layered on top of base-currency transactions. This module decides
//! which payloads are usable for bookkeeping (`classifier`) and expands issuance/reissuance
//! bundles into the logical entries the ledger accounts for (`decomposer`).

/// Null/valid predicates over asset payloads
pub mod classifier;
/// Expansion of bundled transactions into sub-transactions
pub mod decomposer;

pub use classifier::{classify, is_null_asset, is_valid_asset};
pub use decomposer::{decompose, decompose_list};
