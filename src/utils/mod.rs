//!
//! Formatting helpers shared by the wallet and the store inspector.
/// Amount formatting
pub mod index;

pub use index::format_token_amount;
