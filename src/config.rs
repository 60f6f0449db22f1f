//! Client configuration resolved once at startup.
//!
//! The storage medium is chosen here and nowhere else. Every request of the session is
//! signed from, and every renewal writes to, the medium selected in [`ClientConfig`].

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, error::ConfigError};

/// Canonical place where session credentials live for the lifetime of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMedium {
	/// Server-set cookies carry access/refresh tokens; the transport attaches them and no
	/// bearer header is set.
	#[default]
	Cookie,
	/// Tokens are held by the client store and sent as a bearer header.
	Explicit,
}
impl StorageMedium {
	/// Returns `true` when requests carry an explicit bearer header.
	pub const fn signs_with_bearer(self) -> bool {
		matches!(self, Self::Explicit)
	}

	/// Stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Cookie => "cookie",
			Self::Explicit => "explicit",
		}
	}
}
impl Display for StorageMedium {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Relative paths of the auth endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
	/// `POST` account creation.
	pub signup: String,
	/// `POST` credential issuance.
	pub login: String,
	/// `POST` session termination.
	pub logout: String,
	/// `POST` credential renewal.
	pub refresh: String,
	/// `GET` current user profile.
	pub profile: String,
	/// `PUT` account update.
	pub update_account: String,
	/// `PUT` password change.
	pub change_password: String,
	/// `DELETE` account removal.
	pub delete_account: String,
	/// `POST` profile picture upload (multipart field `file`).
	pub upload_profile_image: String,
	/// `DELETE` profile picture removal.
	pub delete_profile_image: String,
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			signup: "/auth/signup".into(),
			login: "/auth/login".into(),
			logout: "/auth/logout".into(),
			refresh: "/auth/refresh".into(),
			profile: "/member/me".into(),
			update_account: "/member/update_account".into(),
			change_password: "/member/change-password".into(),
			delete_account: "/member/delete_account".into(),
			upload_profile_image: "/member/upload-profile".into(),
			delete_profile_image: "/member/delete-profile".into(),
		}
	}
}

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// API origin every endpoint path is resolved against.
	pub base_url: Url,
	/// Canonical credential medium.
	#[serde(default)]
	pub medium: StorageMedium,
	/// Fixed deadline for every network call, renewal included.
	#[serde(default = "ClientConfig::default_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Header carrying the CSRF marker.
	#[serde(default = "ClientConfig::default_csrf_header")]
	pub csrf_header: String,
	/// JSON file persisting explicit-medium credentials across restarts.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub store_path: Option<PathBuf>,
	/// Auth endpoint paths.
	#[serde(default)]
	pub endpoints: Endpoints,
}
impl ClientConfig {
	const DEFAULT_TIMEOUT_MS: u64 = 5_000;

	/// Creates a cookie-medium configuration with default endpoints.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			medium: StorageMedium::default(),
			request_timeout_ms: Self::DEFAULT_TIMEOUT_MS,
			csrf_header: Self::default_csrf_header(),
			store_path: None,
			endpoints: Endpoints::default(),
		}
	}

	/// Parses a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de).map_err(|source| ConfigError::Parse { source })
	}

	/// Overrides the storage medium.
	pub fn with_medium(mut self, medium: StorageMedium) -> Self {
		self.medium = medium;

		self
	}

	/// Overrides the request deadline.
	pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Persists explicit-medium credentials to `path`.
	pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.store_path = Some(path.into());

		self
	}

	/// Overrides the endpoint paths.
	pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Request deadline as a [`std::time::Duration`].
	pub fn timeout(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.request_timeout_ms)
	}

	/// Resolves an endpoint path against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		resolve_endpoint(&self.base_url, path)
	}

	/// Rejects combinations that would split credentials across mediums.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.medium == StorageMedium::Cookie && self.store_path.is_some() {
			return Err(ConfigError::StorePathWithCookieMedium);
		}

		Ok(())
	}

	fn default_timeout_ms() -> u64 {
		Self::DEFAULT_TIMEOUT_MS
	}

	fn default_csrf_header() -> String {
		"X-CSRF-Token".into()
	}
}

/// Joins `path` onto `base_url`.
pub fn resolve_endpoint(base_url: &Url, path: &str) -> Result<Url, ConfigError> {
	base_url.join(path).map_err(|source| ConfigError::InvalidEndpoint { path: path.to_owned(), source })
}
