//! In-process [`CredentialStore`] for the explicit medium; lives as long as the client.

// self
use crate::{
	_prelude::*,
	auth::CredentialBundle,
	store::{CredentialStore, StoreError},
};

/// Thread-safe store that keeps the bundle in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<CredentialBundle>>);
impl MemoryStore {
	/// Creates a store pre-seeded with `bundle`.
	pub fn seeded(bundle: CredentialBundle) -> Self {
		Self(Arc::new(RwLock::new(bundle)))
	}
}
impl CredentialStore for MemoryStore {
	fn set(&self, bundle: CredentialBundle) -> Result<(), StoreError> {
		*self.0.write() = bundle;

		Ok(())
	}

	fn get(&self) -> Result<CredentialBundle, StoreError> {
		Ok(self.0.read().clone())
	}

	fn clear(&self) -> Result<(), StoreError> {
		*self.0.write() = CredentialBundle::default();

		Ok(())
	}
}
