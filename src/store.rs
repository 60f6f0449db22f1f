//! Credential storage contract and the built-in mediums.
//!
//! A store is picked once, from [`ClientConfig::medium`](crate::config::ClientConfig), and
//! every read and write of the session goes through that single instance. Writes are
//! visible to subsequent reads immediately; nothing is broadcast to other processes.

pub mod file;
pub mod memory;
#[cfg(feature = "reqwest")] pub mod cookie;

#[cfg(feature = "reqwest")] pub use cookie::CookieJarStore;
pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialBundle};

/// Storage backend contract implemented by credential stores.
///
/// Operations are synchronous: every supported medium (process memory, a local file, the
/// transport's cookie jar) answers without suspending.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Replaces the stored bundle.
	fn set(&self, bundle: CredentialBundle) -> Result<(), StoreError>;

	/// Returns the stored bundle; an empty bundle when nothing is stored.
	fn get(&self) -> Result<CredentialBundle, StoreError>;

	/// Removes every stored field.
	fn clear(&self) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
