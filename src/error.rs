//! Session-level error taxonomy shared by the pipeline, the coordinator, and session actions.
//!
//! Every failure is normalized into [`Error`] at the pipeline boundary, so session actions
//! only ever store the user-facing message derived from [`Error::user_message`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Timeout or connectivity failure; never triggers renewal and never clears credentials.
	#[error(transparent)]
	Network(#[from] TransportError),

	/// Server rejected the submitted payload; the message is shown to the user verbatim.
	#[error("{message}")]
	Validation {
		/// Server-supplied detail.
		message: String,
	},
	/// The presented credential is no longer valid and renewal cannot help.
	#[error("Session expired.")]
	SessionExpired,
	/// Credential renewal failed; all credentials have been cleared.
	#[error("Session renewal failed: {reason}.")]
	RenewalFailed {
		/// Failure summary.
		reason: String,
	},
	/// The profile probe failed.
	#[error("Profile could not be fetched: {reason}.")]
	ProfileFetch {
		/// Failure summary.
		reason: String,
	},
	/// Any other non-success response.
	#[error("Request failed with status {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Server-supplied detail, or the canonical reason phrase.
		message: String,
	},
	/// Response body could not be decoded.
	#[error("Response body is malformed.")]
	Decode {
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the offending response.
		status: u16,
	},
}
impl Error {
	/// Classifies the error into the user-facing taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Validation { .. } => ErrorKind::Validation,
			Self::SessionExpired => ErrorKind::SessionExpired,
			Self::RenewalFailed { .. } => ErrorKind::RenewalFailed,
			Self::Network(_) => ErrorKind::Network,
			Self::ProfileFetch { .. } => ErrorKind::ProfileFetch,
			Self::Api { .. } | Self::Decode { .. } => ErrorKind::Server,
			Self::Storage(_) | Self::Config(_) => ErrorKind::Internal,
		}
	}

	/// Message suitable for display; raw transport errors never leak through here.
	pub fn user_message(&self) -> String {
		match self {
			Self::Validation { message } => message.clone(),
			Self::SessionExpired | Self::RenewalFailed { .. } =>
				"Your session has expired. Please log in again.".into(),
			Self::Network(TransportError::Timeout) =>
				"The server took too long to respond. Please try again.".into(),
			Self::Network(_) => "The server could not be reached. Please try again.".into(),
			Self::ProfileFetch { .. } => "Unable to load your profile.".into(),
			Self::Api { message, .. } => message.clone(),
			Self::Decode { .. } => "The server returned an unexpected response.".into(),
			Self::Storage(_) | Self::Config(_) => "Something went wrong. Please try again.".into(),
		}
	}

	/// Returns `true` for failures that may succeed when retried unchanged.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network(_)) || matches!(self, Self::Api { status, .. } if *status >= 500)
	}

	/// Returns `true` when the failure ended the session.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::SessionExpired | Self::RenewalFailed { .. })
	}
}

/// User-facing classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Malformed signup/login payload.
	Validation,
	/// Expired credential that could not be renewed.
	SessionExpired,
	/// Renewal failed; the user must log in again.
	RenewalFailed,
	/// Timeout or connectivity issue.
	Network,
	/// Profile probe failed.
	ProfileFetch,
	/// Unexpected server response.
	Server,
	/// Local storage or configuration failure.
	Internal,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid.")]
	Parse {
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Endpoint path cannot be joined onto the base URL.
	#[error("Endpoint `{path}` cannot be resolved against the base URL.")]
	InvalidEndpoint {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
	/// Upload declared a content type the transport cannot send.
	#[error("Content type `{value}` is invalid.")]
	InvalidContentType {
		/// Offending value.
		value: String,
	},

	/// Cookie medium requested for a transport that cannot hold cookies.
	#[error("The cookie storage medium requires a cookie-capable transport.")]
	CookieMediumUnsupported,
	/// A file-backed store was requested for the cookie medium.
	#[error("A store path is only supported by the explicit storage medium.")]
	StorePathWithCookieMedium,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (timeout, network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The call exceeded its fixed deadline.
	#[error("Request timed out.")]
	Timeout,
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the server.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the server.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn terminal_errors_share_the_relogin_message() {
		let renewal = Error::RenewalFailed { reason: "refresh rejected".into() };

		assert_eq!(renewal.kind(), ErrorKind::RenewalFailed);
		assert!(renewal.is_terminal());
		assert_eq!(renewal.user_message(), Error::SessionExpired.user_message());
	}

	#[test]
	fn validation_detail_is_surfaced_verbatim() {
		let err = Error::Validation { message: "Invalid credentials".into() };

		assert_eq!(err.user_message(), "Invalid credentials");
		assert!(!err.is_transient());
	}

	#[test]
	fn network_failures_are_transient_but_not_terminal() {
		let err = Error::from(TransportError::Timeout);

		assert_eq!(err.kind(), ErrorKind::Network);
		assert!(err.is_transient());
		assert!(!err.is_terminal());
		assert!(err.user_message().contains("too long"));
	}
}
