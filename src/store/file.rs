//! File-backed [`CredentialStore`] so explicit-medium sessions survive restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialBundle,
	store::{CredentialStore, StoreError},
};

/// Persists the credential bundle to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<CredentialBundle>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<CredentialBundle, StoreError> {
		if !path.exists() {
			return Ok(CredentialBundle::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(CredentialBundle::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, bundle: &CredentialBundle) -> Result<(), StoreError> {
		if bundle.is_empty() {
			return match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			};
		}

		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(bundle).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential bundle: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn set(&self, bundle: CredentialBundle) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		self.persist(&bundle)?;
		*guard = bundle;

		Ok(())
	}

	fn get(&self) -> Result<CredentialBundle, StoreError> {
		Ok(self.inner.read().clone())
	}

	fn clear(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		*guard = CredentialBundle::default();

		self.persist(&guard)
	}
}
