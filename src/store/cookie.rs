//! Cookie-medium [`CredentialStore`] backed by the transport's cookie jar.
//!
//! The jar is shared with [`ReqwestTransport`](crate::http::ReqwestTransport), so cookies the
//! server sets on login or renewal are visible here immediately and anything written here
//! rides along on the next request.

// crates.io
use reqwest::cookie::{CookieStore, Jar};
// self
use crate::{
	_prelude::*,
	auth::{CredentialBundle, CredentialField, TokenSecret},
	store::{CredentialStore, StoreError},
};

/// View over the cookies the jar holds for the API origin.
#[derive(Clone, Debug)]
pub struct CookieJarStore {
	jar: Arc<Jar>,
	origin: Url,
}
impl CookieJarStore {
	/// Wraps `jar`, scoping reads and writes to `origin`.
	pub fn new(jar: Arc<Jar>, origin: Url) -> Self {
		Self { jar, origin }
	}

	/// Shared jar handle, to be installed on the transport.
	pub fn jar(&self) -> &Arc<Jar> {
		&self.jar
	}

	fn write(&self, field: CredentialField, value: Option<&TokenSecret>) {
		let cookie = match value {
			Some(secret) => format!("{}={}; Path=/", field.name(), secret.expose()),
			None => format!("{}=; Path=/; Max-Age=0", field.name()),
		};

		self.jar.add_cookie_str(&cookie, &self.origin);
	}
}
impl CredentialStore for CookieJarStore {
	fn set(&self, bundle: CredentialBundle) -> Result<(), StoreError> {
		for field in CredentialField::ALL {
			self.write(field, bundle.field(field));
		}

		Ok(())
	}

	fn get(&self) -> Result<CredentialBundle, StoreError> {
		let mut bundle = CredentialBundle::default();
		let Some(header) = self.jar.cookies(&self.origin) else {
			return Ok(bundle);
		};
		let raw = header.to_str().map_err(|e| StoreError::Serialization {
			message: format!("Cookie header is not valid text: {e}"),
		})?;

		for pair in raw.split(';') {
			let Some((name, value)) = pair.trim().split_once('=') else {
				continue;
			};

			if let Some(field) = CredentialField::ALL.into_iter().find(|f| f.name() == name) {
				bundle.set_field(field, TokenSecret::non_empty(value));
			}
		}

		Ok(bundle)
	}

	fn clear(&self) -> Result<(), StoreError> {
		for field in CredentialField::ALL {
			self.write(field, None);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn store() -> CookieJarStore {
		let origin = Url::parse("http://127.0.0.1:8080/").expect("Origin fixture should parse.");

		CookieJarStore::new(Arc::new(Jar::default()), origin)
	}

	#[test]
	fn server_set_cookies_are_read_back_as_a_bundle() {
		let store = store();

		store.jar().add_cookie_str("csrf_token=c1; Path=/", &store.origin);
		store.jar().add_cookie_str("access_token=a1; Path=/; HttpOnly", &store.origin);
		store.jar().add_cookie_str("theme=dark; Path=/", &store.origin);

		let bundle = store.get().expect("Cookie store get should succeed.");

		assert_eq!(bundle.csrf_token.as_ref().map(TokenSecret::expose), Some("c1"));
		assert_eq!(bundle.access_token.as_ref().map(TokenSecret::expose), Some("a1"));
		assert!(bundle.refresh_token.is_none());
	}

	#[test]
	fn clear_expires_every_credential_cookie() {
		let store = store();

		store
			.set(CredentialBundle {
				access_token: Some("a".into()),
				refresh_token: Some("r".into()),
				csrf_token: Some("c".into()),
			})
			.expect("Cookie store set should succeed.");

		assert!(!store.get().expect("Cookie store get should succeed.").is_empty());

		store.clear().expect("Cookie store clear should succeed.");

		assert!(store.get().expect("Cookie store get should succeed.").is_empty());
	}
}
