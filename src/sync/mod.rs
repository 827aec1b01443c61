//! Network synchronization.
//!
//! - `engine`: the peer-manager lifecycle state machine, retry and progress sampling.
//! - `events`: the peer-manager collaborator traits and the messages posted to the wallet context.
//! - `progress`: progress fraction and per-session counters.
//! - `scheduler`: single-slot deferred tasks used for retry and debounce timers.

/// Peer-manager lifecycle state machine
pub mod engine;
/// Collaborator traits and wallet-context messages
pub mod events;
/// Progress computation and tracking
pub mod progress;
/// Single-slot timers
pub mod scheduler;

pub use engine::{SyncEngine, SyncState};
pub use events::*;
pub use progress::sync_progress;
pub use scheduler::DeferredTask;
