// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for renewal activity.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	joined: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of renewal network calls issued.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of renew calls coalesced into an in-flight renewal.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Returns the number of successful renewals.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed renewals.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_joined(&self) {
		self.joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
