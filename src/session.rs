//! Process-wide session state consumed by routing guards and UI collaborators.
//!
//! [`Session`] values are only ever produced by [`SessionCell`] snapshots; mutation is reserved
//! to the crate (the [`SessionState`] actions and the renewal protocol), so outside code reads
//! `is_authenticated`/`current_user` but can never set them.

pub mod actions;

pub use actions::SessionState;

// crates.io
use tokio::sync::watch;
// self
use crate::{_prelude::*, auth::UserProfile, error::ErrorKind};

/// Snapshot of the authenticated-user state machine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
	/// Whether the server has confirmed the session.
	pub authenticated: bool,
	/// Profile of the authenticated user.
	pub user: Option<UserProfile>,
	/// An action is in progress.
	pub loading: bool,
	/// Last user-facing failure.
	pub last_error: Option<ErrorDetail>,
}
impl Session {
	/// Authenticated and carrying a profile; what navigation guards check.
	pub fn is_authenticated(&self) -> bool {
		self.authenticated && self.user.is_some()
	}
}

/// User-facing failure recorded on the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
	/// Failure class.
	pub kind: ErrorKind,
	/// Message safe to display.
	pub message: String,
	/// When the failure was recorded.
	pub occurred_at: OffsetDateTime,
}
impl ErrorDetail {
	/// Captures the user-facing view of `error`.
	pub fn from_error(error: &Error) -> Self {
		Self {
			kind: error.kind(),
			message: error.user_message(),
			occurred_at: OffsetDateTime::now_utc(),
		}
	}
}

/// Shared owner of the current [`Session`].
#[derive(Clone, Debug)]
pub struct SessionCell(Arc<watch::Sender<Session>>);
impl SessionCell {
	/// Current state.
	pub fn snapshot(&self) -> Session {
		self.0.borrow().clone()
	}

	/// Receiver notified on every state change.
	pub fn subscribe(&self) -> watch::Receiver<Session> {
		self.0.subscribe()
	}

	/// See [`Session::is_authenticated`].
	pub fn is_authenticated(&self) -> bool {
		self.0.borrow().is_authenticated()
	}

	/// Profile of the authenticated user.
	pub fn current_user(&self) -> Option<UserProfile> {
		self.0.borrow().user.clone()
	}

	pub(crate) fn update(&self, mutate: impl FnOnce(&mut Session)) {
		self.0.send_modify(mutate);
	}

	/// Drops the authenticated user; `loading` and `last_error` are left to the action.
	pub(crate) fn expire(&self) {
		self.update(|session| {
			session.authenticated = false;
			session.user = None;
		});
	}
}
impl Default for SessionCell {
	fn default() -> Self {
		Self(Arc::new(watch::channel(Session::default()).0))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn authenticated_requires_a_profile() {
		let session = Session { authenticated: true, ..Default::default() };

		assert!(!session.is_authenticated());
		assert!(
			Session { user: Some(UserProfile::with_username("a")), ..session }.is_authenticated()
		);
	}

	#[test]
	fn expire_notifies_subscribers() {
		let cell = SessionCell::default();
		let mut rx = cell.subscribe();

		cell.update(|s| {
			s.authenticated = true;
			s.user = Some(UserProfile::with_username("a"));
		});
		assert!(cell.is_authenticated());

		rx.mark_unchanged();
		cell.expire();

		assert!(rx.has_changed().expect("Session sender should still be alive."));
		assert!(!rx.borrow_and_update().is_authenticated());
		assert!(cell.current_user().is_none());
	}
}
