//! Cancellable timed polling for server jobs that complete asynchronously.
//!
//! [`poll_until`] replaces callback-scheduled re-polling with a bounded loop: the probe runs
//! at most [`PollPolicy::max_attempts`] times, delays grow geometrically up to a cap, and a
//! [`CancellationToken`] aborts both the probe and the wait between probes.

// std
use std::time::Duration;
// crates.io
use rand::Rng;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	obs::{self, EventLevel, FlowKind},
};

/// Attempt budget and delay schedule for [`poll_until`].
#[derive(Clone, Debug, PartialEq)]
pub struct PollPolicy {
	/// Probe invocations before giving up.
	pub max_attempts: u32,
	/// Delay after the first pending probe.
	pub interval: Duration,
	/// Multiplier applied to the delay after each pending probe; values below `1.0` are
	/// treated as `1.0`.
	pub backoff_factor: f64,
	/// Upper bound for any single delay.
	pub max_interval: Duration,
	/// Adds up to half an interval of random delay, never exceeding `max_interval`.
	pub jitter: bool,
}
impl PollPolicy {
	const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
	const DEFAULT_MAX_ATTEMPTS: u32 = 60;
	const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

	/// Fixed-interval policy.
	pub fn new(max_attempts: u32, interval: Duration) -> Self {
		Self {
			max_attempts,
			interval,
			backoff_factor: 1.0,
			max_interval: Self::DEFAULT_MAX_INTERVAL.max(interval),
			jitter: false,
		}
	}

	/// Grows delays by `factor`, capped at `max_interval`.
	pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
		self.backoff_factor = factor;
		self.max_interval = max_interval;

		self
	}

	/// Enables or disables random jitter.
	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.jitter = jitter;

		self
	}

	/// Delay following the pending probe numbered `attempt` (0-indexed).
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let factor = if self.backoff_factor.is_finite() { self.backoff_factor.max(1.0) } else { 1.0 };
		let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
		let scaled = self.interval.as_secs_f64() * factor.powi(exponent);
		let capped = if scaled.is_finite() && scaled < self.max_interval.as_secs_f64() {
			Duration::from_secs_f64(scaled)
		} else {
			self.max_interval
		};

		if !self.jitter {
			return capped;
		}

		let jitter_range_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX) / 2;
		let remaining_ms =
			u64::try_from(self.max_interval.saturating_sub(capped).as_millis()).unwrap_or(0);
		let limit_ms = jitter_range_ms.min(remaining_ms);

		if limit_ms == 0 {
			return capped;
		}

		capped + Duration::from_millis(rand::rng().random_range(0..limit_ms))
	}
}
impl Default for PollPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
	}
}

/// Outcome of a single probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus<T> {
	/// The job finished.
	Ready(T),
	/// Not finished yet; probe again after the next delay.
	Pending,
}

/// Reasons [`poll_until`] stopped without a result.
#[derive(Debug, ThisError)]
pub enum PollError {
	/// Every attempt reported [`PollStatus::Pending`].
	#[error("The job did not finish after {attempts} attempt(s).")]
	Exhausted {
		/// Probe invocations made.
		attempts: u32,
	},
	/// The cancellation token fired.
	#[error("Polling was cancelled.")]
	Cancelled,
	/// The probe itself failed; polling stops immediately.
	#[error(transparent)]
	Probe(Error),
}

/// Runs `probe` until it reports [`PollStatus::Ready`], fails, runs out of attempts, or
/// `cancel` fires.
///
/// `probe` receives the 0-indexed attempt number.
pub async fn poll_until<T, F, Fut>(
	policy: &PollPolicy,
	cancel: &CancellationToken,
	mut probe: F,
) -> Result<T, PollError>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<PollStatus<T>>>,
{
	for attempt in 0..policy.max_attempts {
		let status = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(PollError::Cancelled),
			status = probe(attempt) => status.map_err(PollError::Probe)?,
		};

		if let PollStatus::Ready(value) = status {
			return Ok(value);
		}
		if attempt + 1 == policy.max_attempts {
			break;
		}

		let delay = policy.delay_for_attempt(attempt);

		obs::record_event(
			FlowKind::Poll,
			EventLevel::Debug,
			&format_args!("attempt {} pending; next probe in {delay:?}", attempt + 1),
		);

		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(PollError::Cancelled),
			_ = tokio::time::sleep(delay) => {},
		}
	}

	Err(PollError::Exhausted { attempts: policy.max_attempts })
}
