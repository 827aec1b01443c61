//! Progress tracking for a sync session.
//!
//! `sync_progress` turns block heights into the fraction shown to the user. The
//! `SyncProgressTracker` keeps per-session counters and logs them periodically.

use tracing::info;

/// Heights between periodic progress log lines.
const LOG_EVERY_BLOCKS: u32 = 1000;

/// Fraction of the chain between `watermark` and `tip` covered once `current` is reached.
///
/// Clamped to `[0, 1]`. A tip at or below the watermark means there is nothing to sync: 1.0.
pub fn sync_progress(watermark: u32, current: u32, tip: u32) -> f64 {
	if tip <= watermark {
		return 1.0;
	}
	let done = current.saturating_sub(watermark) as f64;
	let total = (tip - watermark) as f64;
	(done / total).clamp(0.0, 1.0)
}

/// Per-session sync counters.
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Watermark the session started from
	start_height: u32,
	/// Highest block height reported by the peer manager
	highest_height: u32,
	transactions_added: usize,
	transactions_updated: usize,
	transactions_deleted: usize,
	last_logged_height: u32,
}

impl SyncProgressTracker {
	pub fn new(start_height: u32) -> Self {
		Self {
			start_height,
			highest_height: start_height,
			transactions_added: 0,
			transactions_updated: 0,
			transactions_deleted: 0,
			last_logged_height: start_height,
		}
	}

	pub fn record_height(&mut self, height: u32) {
		self.highest_height = self.highest_height.max(height);
	}

	pub fn record_added(&mut self) {
		self.transactions_added += 1;
	}

	pub fn record_updated(&mut self, count: usize) {
		self.transactions_updated += count;
	}

	pub fn record_deleted(&mut self) {
		self.transactions_deleted += 1;
	}

	/// Log progress every `LOG_EVERY_BLOCKS` heights or when forced
	pub fn log_progress(&mut self, force: bool) {
		let blocks_since_last_log = self.highest_height.saturating_sub(self.last_logged_height);
		if force || blocks_since_last_log >= LOG_EVERY_BLOCKS {
			info!(
				"Sync progress: height {} ({} added, {} updated, {} deleted)",
				self.highest_height,
				self.transactions_added,
				self.transactions_updated,
				self.transactions_deleted
			);
			self.last_logged_height = self.highest_height;
		}
	}

	pub fn summary(&self) -> String {
		format!(
			"Sync from {} to {}: {} transactions added, {} updated, {} deleted",
			self.start_height,
			self.highest_height,
			self.transactions_added,
			self.transactions_updated,
			self.transactions_deleted
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_degenerate_tip_is_complete() {
		assert_eq!(sync_progress(100, 100, 100), 1.0);
		assert_eq!(sync_progress(100, 50, 90), 1.0);
	}

	#[test]
	fn test_progress_is_clamped() {
		assert_eq!(sync_progress(100, 50, 200), 0.0);
		assert_eq!(sync_progress(100, 150, 200), 0.5);
		assert_eq!(sync_progress(100, 250, 200), 1.0);
	}

	#[test]
	fn test_progress_is_monotonic_in_height() {
		let mut last = 0.0;
		for current in 0..=300 {
			let p = sync_progress(100, current, 200);
			assert!(p >= last);
			assert!((0.0..=1.0).contains(&p));
			last = p;
		}
		assert_eq!(last, 1.0);
	}

	#[test]
	fn test_tracker_counts() {
		let mut tracker = SyncProgressTracker::new(10);
		tracker.record_height(5);
		tracker.record_height(1200);
		tracker.record_added();
		tracker.record_updated(3);
		tracker.record_deleted();
		tracker.log_progress(false);
		assert_eq!(
			tracker.summary(),
			"Sync from 10 to 1200: 1 transactions added, 3 updated, 1 deleted"
		);
	}
}
