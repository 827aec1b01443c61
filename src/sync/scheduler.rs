//! Single-slot deferred tasks.
//!
//! Debounce and retry timers must never stack: at most one firing is pending per slot. The slot is
//! driven by `tokio::time`, so tests can run it under a paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

pub struct DeferredTask {
	name: &'static str,
	handle: Option<JoinHandle<()>>,
}

impl DeferredTask {
	pub fn new(name: &'static str) -> Self {
		Self { name, handle: None }
	}

	/// True while a scheduled task has not yet completed.
	pub fn is_armed(&self) -> bool {
		self.handle.as_ref().is_some_and(|h| !h.is_finished())
	}

	/// Run `task` after `delay`. No-op returning false if the slot is already armed.
	pub fn schedule<F>(&mut self, delay: Duration, task: F) -> bool
	where
		F: Future<Output = ()> + Send + 'static,
	{
		if self.is_armed() {
			trace!("{} already armed", self.name);
			return false;
		}

		trace!("Arming {} for {:?}", self.name, delay);
		self.handle = Some(tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			task.await;
		}));
		true
	}

	/// Cancel any pending task and arm a new one.
	pub fn reschedule<F>(&mut self, delay: Duration, task: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.cancel();
		self.schedule(delay, task);
	}

	/// Disarm the slot. Returns true if a pending task was cancelled.
	pub fn cancel(&mut self) -> bool {
		match self.handle.take() {
			Some(handle) => {
				let pending = !handle.is_finished();
				handle.abort();
				if pending {
					trace!("Cancelled {}", self.name);
				}
				pending
			}
			None => false,
		}
	}
}

impl Drop for DeferredTask {
	fn drop(&mut self) {
		self.cancel();
	}
}
