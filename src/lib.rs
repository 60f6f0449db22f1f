//! Client-side session continuity: canonical credential storage, a request pipeline that
//! signs outgoing calls, single-flight renewal of expired sessions, and replay of the
//! requests that observed the expiry.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod ext;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::{ClientConfig, StorageMedium},
		http::ReqwestTransport,
		session::SessionState,
		store::{CredentialStore, MemoryStore},
	};

	/// Session type alias used by reqwest-backed integration tests.
	pub type ReqwestTestSession = SessionState<ReqwestTransport>;

	/// Builds an explicit-medium configuration pointing at `base_url` (typically an
	/// `httpmock` server).
	pub fn test_config(base_url: &str) -> ClientConfig {
		let base_url = Url::parse(base_url).expect("Failed to parse test base URL.");

		ClientConfig::new(base_url).with_medium(StorageMedium::Explicit)
	}

	/// Constructs a [`SessionState`] backed by an in-memory store and the reqwest transport
	/// used across integration tests.
	pub fn build_reqwest_test_session(config: ClientConfig) -> (ReqwestTestSession, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let transport = ReqwestTransport::from_config(&config)
			.expect("Failed to build reqwest transport for tests.");
		let session = SessionState::with_parts(config, Arc::new(transport), store)
			.expect("Failed to assemble test session.");

		(session, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
