//! Single-flight credential renewal.
//!
//! [`RefreshCoordinator`] collapses every concurrent expiry into one renewal call. The first
//! caller to observe an expiry while the coordinator is idle becomes the leader and issues the
//! call; everyone arriving while it is outstanding is queued and receives the leader's outcome
//! in arrival order. Refresh-token rotation invalidates the previous token on most servers, so
//! two overlapping renewals would revoke each other.
//!
//! Each settled renewal bumps a [`Generation`]. Requests remember the generation they were
//! signed under; an expiry reported for a request signed before the latest renewal is replayed
//! against the already-renewed credentials instead of starting another renewal.
//!
//! Only a server rejection of the renewal ends the session. A renewal that times out or meets
//! a 5xx leaves the credentials in place and hands the same transient error to every waiter.
//! A leader whose future is dropped passes the flight to the head of the queue.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{CredentialBundle, CredentialPatch},
	error::TransportError,
	obs::{self, EventLevel, FlowKind, FlowOutcome, FlowSpan},
	session::SessionCell,
	store::CredentialStore,
};

/// Identifies the renewal cycle a request was signed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

/// Observable coordinator phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
	/// No renewal outstanding.
	Idle,
	/// A renewal call is in flight; further renew calls queue behind it.
	Refreshing,
}

#[derive(Debug, Default)]
struct RefreshState {
	generation: u64,
	// `Some` exactly while a renewal is outstanding.
	queue: Option<VecDeque<oneshot::Sender<Outcome>>>,
	last_failure: Option<String>,
}

#[derive(Clone, Debug)]
enum Outcome {
	Renewed(CredentialBundle),
	Rejected(String),
	Unavailable(Unavailable),
	// The previous leader went away; the receiver now owns the flight.
	Promoted,
}

// Transient renewal failure, replicated to every waiter.
#[derive(Clone, Debug)]
enum Unavailable {
	Timeout,
	Network(Arc<TransportError>),
	Server { status: u16, message: String },
}
impl Unavailable {
	fn classify(err: Error) -> Result<Self, Error> {
		match err {
			Error::Network(TransportError::Timeout) => Ok(Self::Timeout),
			Error::Network(e) => Ok(Self::Network(Arc::new(e))),
			Error::Api { status, message } if status >= 500 => Ok(Self::Server { status, message }),
			other => Err(other),
		}
	}

	fn to_error(&self) -> Error {
		match self {
			Self::Timeout => TransportError::Timeout.into(),
			Self::Network(e) => TransportError::network(e.clone()).into(),
			Self::Server { status, message } =>
				Error::Api { status: *status, message: message.clone() },
		}
	}
}

enum Role<'a> {
	Leader,
	Follower(Waiter<'a>),
	AlreadyRenewed,
	AlreadyFailed(String),
}

/// Owner of the in-flight flag and the queue of waiting continuations.
pub struct RefreshCoordinator {
	store: Arc<dyn CredentialStore>,
	session: SessionCell,
	state: Mutex<RefreshState>,
	metrics: RefreshMetrics,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator writing renewed credentials to `store`.
	pub fn new(store: Arc<dyn CredentialStore>, session: SessionCell) -> Self {
		Self { store, session, state: Default::default(), metrics: Default::default() }
	}

	/// Current renewal generation; capture it before signing a request.
	pub fn generation(&self) -> Generation {
		Generation(self.state.lock().generation)
	}

	/// Current phase.
	pub fn phase(&self) -> RefreshPhase {
		if self.state.lock().queue.is_some() { RefreshPhase::Refreshing } else { RefreshPhase::Idle }
	}

	/// Number of continuations waiting on the in-flight renewal.
	pub fn queued(&self) -> usize {
		self.state.lock().queue.as_ref().map_or(0, VecDeque::len)
	}

	/// Renewal counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Renews credentials for a request signed under `observed`.
	///
	/// `call` performs the renewal network call and is only invoked by the leader. On success
	/// the returned patch is merged into the store and the merged bundle is handed to every
	/// queued caller. When the server rejects the renewal the store is cleared, the session is
	/// expired, and every caller receives [`Error::RenewalFailed`]. Timeouts, connectivity
	/// failures and 5xx responses are returned unchanged to every caller and keep the
	/// credentials.
	pub async fn renew<F, Fut>(&self, observed: Generation, call: F) -> Result<CredentialBundle>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CredentialPatch>>,
	{
		let mut observed = observed;

		loop {
			match self.enroll(observed) {
				Role::Leader => break,
				Role::Follower(mut waiter) => {
					self.metrics.record_joined();
					obs::record_event(FlowKind::Renewal, EventLevel::Debug, &"joined in-flight renewal");

					match waiter.recv().await {
						Some(Outcome::Renewed(bundle)) => return Ok(bundle),
						Some(Outcome::Rejected(reason)) => return Err(Error::RenewalFailed { reason }),
						Some(Outcome::Unavailable(unavailable)) => return Err(unavailable.to_error()),
						Some(Outcome::Promoted) => break,
						None => observed = self.generation(),
					}
				},
				Role::AlreadyRenewed => return Ok(self.store.get()?),
				Role::AlreadyFailed(reason) => return Err(Error::RenewalFailed { reason }),
			}
		}

		self.lead(call).await
	}

	/// Clears every credential and drops the authenticated user.
	pub(crate) fn invalidate(&self) {
		if let Err(e) = self.store.clear() {
			obs::record_event(FlowKind::Renewal, EventLevel::Warn, &e);
		}

		self.session.expire();
		obs::record_event(FlowKind::Renewal, EventLevel::Info, &"session invalidated");
	}

	// The flag check and the flag set happen inside one critical section.
	fn enroll(&self, observed: Generation) -> Role<'_> {
		let mut state = self.state.lock();

		if let Some(queue) = state.queue.as_mut() {
			let (tx, rx) = oneshot::channel();

			queue.push_back(tx);

			Role::Follower(Waiter { coordinator: self, rx })
		} else if state.generation != observed.0 {
			match &state.last_failure {
				Some(reason) => Role::AlreadyFailed(reason.clone()),
				None => Role::AlreadyRenewed,
			}
		} else {
			state.queue = Some(VecDeque::new());

			Role::Leader
		}
	}

	async fn lead<F, Fut>(&self, call: F) -> Result<CredentialBundle>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CredentialPatch>>,
	{
		const KIND: FlowKind = FlowKind::Renewal;

		let mut flight = Flight { coordinator: self, armed: true };
		let span = FlowSpan::new(KIND, "renew");

		self.metrics.record_attempt();
		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let patch = call().await?;
				let bundle = self.store.get()?.apply(patch);

				self.store.set(bundle.clone())?;

				Ok::<_, Error>(bundle)
			})
			.await;

		flight.armed = false;
		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		let err = match result {
			Ok(bundle) => {
				self.metrics.record_success();
				self.settle(Outcome::Renewed(bundle.clone()));

				return Ok(bundle);
			},
			Err(err) => err,
		};

		self.metrics.record_failure();

		match Unavailable::classify(err) {
			Ok(unavailable) => {
				obs::record_event(KIND, EventLevel::Warn, &unavailable.to_error());
				self.settle(Outcome::Unavailable(unavailable.clone()));

				Err(unavailable.to_error())
			},
			Err(err) => {
				let reason = match err {
					Error::RenewalFailed { reason } => reason,
					other => other.to_string(),
				};

				// Session must be expired before any queued request can run again.
				self.invalidate();
				self.settle(Outcome::Rejected(reason.clone()));

				Err(Error::RenewalFailed { reason })
			},
		}
	}

	fn settle(&self, outcome: Outcome) {
		let queue = {
			let mut state = self.state.lock();

			match &outcome {
				Outcome::Renewed(_) => {
					state.generation += 1;
					state.last_failure = None;
				},
				Outcome::Rejected(reason) => {
					state.generation += 1;
					state.last_failure = Some(reason.clone());
				},
				// Credentials are unchanged, so requests signed under them may lead again.
				Outcome::Unavailable(_) | Outcome::Promoted => {},
			}

			state.queue.take().unwrap_or_default()
		};

		obs::record_renewal_waiters(queue.len());
		obs::record_event(
			FlowKind::Renewal,
			EventLevel::Info,
			&format_args!("renewal settled; releasing {} queued request(s)", queue.len()),
		);

		for waiter in queue {
			let _ = waiter.send(outcome.clone());
		}
	}

	// Hands the flight to the oldest waiter still listening, else returns to idle.
	fn abandon(&self) {
		let promoted = {
			let mut state = self.state.lock();
			let mut promoted = false;

			if let Some(queue) = state.queue.as_mut() {
				while let Some(next) = queue.pop_front() {
					if next.send(Outcome::Promoted).is_ok() {
						promoted = true;

						break;
					}
				}
			}
			if !promoted {
				state.queue = None;
			}

			promoted
		};

		if promoted {
			obs::record_event(
				FlowKind::Renewal,
				EventLevel::Debug,
				&"renewal leader dropped; promoted the next queued request",
			);
		} else {
			obs::record_event(FlowKind::Renewal, EventLevel::Debug, &"renewal leader dropped");
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("generation", &self.generation())
			.field("phase", &self.phase())
			.finish()
	}
}

// Passes the flight on if the leader's future is dropped before the call settles.
struct Flight<'a> {
	coordinator: &'a RefreshCoordinator,
	armed: bool,
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.coordinator.metrics.record_failure();
			self.coordinator.abandon();
		}
	}
}

// A queued continuation. A promotion delivered to a waiter that is dropped before reading it
// is passed further down the queue.
struct Waiter<'a> {
	coordinator: &'a RefreshCoordinator,
	rx: oneshot::Receiver<Outcome>,
}
impl Waiter<'_> {
	async fn recv(&mut self) -> Option<Outcome> {
		(&mut self.rx).await.ok()
	}
}
impl Drop for Waiter<'_> {
	fn drop(&mut self) {
		if let Ok(Outcome::Promoted) = self.rx.try_recv() {
			self.coordinator.abandon();
		}
	}
}
