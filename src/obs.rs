//! Optional observability helpers for session flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.flow` with the `flow`
//!   (action) and `stage` (call site) fields, plus debug/warn events for renewal hand-offs.
//! - Enable `metrics` to increment the `session_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and to record the
//!   `session_broker_renewal_waiters` histogram each time a renewal settles.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Account creation.
	Signup,
	/// Credential issuance followed by the profile fetch.
	Login,
	/// Session termination.
	Logout,
	/// Profile fetch.
	Profile,
	/// Startup probe.
	AuthCheck,
	/// Credential renewal.
	Renewal,
	/// Any request dispatched through the pipeline.
	Request,
	/// Account maintenance (update, password change, deletion).
	Account,
	/// Timed polling of a server job.
	Poll,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Signup => "signup",
			FlowKind::Login => "login",
			FlowKind::Logout => "logout",
			FlowKind::Profile => "profile",
			FlowKind::AuthCheck => "auth_check",
			FlowKind::Renewal => "renewal",
			FlowKind::Request => "request",
			FlowKind::Account => "account",
			FlowKind::Poll => "poll",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { Self::Success } else { Self::Failure }
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
