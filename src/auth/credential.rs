//! Credential bundle held by the canonical store and the patches that update it.

// crates.io
use serde::Deserializer;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Names one of the three persisted credential fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialField {
	/// Primary bearer credential.
	Access,
	/// Renewal credential.
	Refresh,
	/// CSRF marker echoed in a request header.
	Csrf,
}
impl CredentialField {
	/// Every field, in persistence order.
	pub const ALL: [Self; 3] = [Self::Access, Self::Refresh, Self::Csrf];

	/// Storage key used by every medium.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Access => "access_token",
			Self::Refresh => "refresh_token",
			Self::Csrf => "csrf_token",
		}
	}
}
impl Display for CredentialField {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.name())
	}
}

/// Session credentials as persisted by a [`CredentialStore`](crate::store::CredentialStore).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
	/// Access token, absent when the transport carries it (cookie medium) or before login.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token: Option<TokenSecret>,
	/// Refresh token, if one has been issued to this medium.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// CSRF marker attached to every request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub csrf_token: Option<TokenSecret>,
}
impl CredentialBundle {
	/// Returns `true` when no field is present, i.e. there is no session evidence.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_none() && self.csrf_token.is_none()
	}

	/// Reads a single field.
	pub fn field(&self, field: CredentialField) -> Option<&TokenSecret> {
		match field {
			CredentialField::Access => self.access_token.as_ref(),
			CredentialField::Refresh => self.refresh_token.as_ref(),
			CredentialField::Csrf => self.csrf_token.as_ref(),
		}
	}

	/// Replaces a single field.
	pub fn set_field(&mut self, field: CredentialField, value: Option<TokenSecret>) {
		match field {
			CredentialField::Access => self.access_token = value,
			CredentialField::Refresh => self.refresh_token = value,
			CredentialField::Csrf => self.csrf_token = value,
		}
	}

	/// Overlays `patch`; absent patch fields keep their current values.
	pub fn apply(mut self, patch: CredentialPatch) -> Self {
		if let Some(value) = patch.access_token {
			self.access_token = Some(value);
		}
		if let Some(value) = patch.refresh_token {
			self.refresh_token = Some(value);
		}
		if let Some(value) = patch.csrf_token {
			self.csrf_token = Some(value);
		}

		self
	}
}

/// Credential fields carried by a login or renewal response.
///
/// Missing, `null`, and empty-string fields all mean "unchanged". Unknown response fields
/// such as `message` are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialPatch {
	/// Fresh access token.
	#[serde(default, deserialize_with = "non_empty_secret")]
	pub access_token: Option<TokenSecret>,
	/// Rotated refresh token.
	#[serde(default, deserialize_with = "non_empty_secret")]
	pub refresh_token: Option<TokenSecret>,
	/// Fresh CSRF marker.
	#[serde(default, deserialize_with = "non_empty_secret")]
	pub csrf_token: Option<TokenSecret>,
}
impl CredentialPatch {
	/// Returns `true` when the response carried no credential field.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_none() && self.csrf_token.is_none()
	}
}
impl From<CredentialPatch> for CredentialBundle {
	fn from(patch: CredentialPatch) -> Self {
		Self::default().apply(patch)
	}
}

fn non_empty_secret<'de, D>(deserializer: D) -> Result<Option<TokenSecret>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = <Option<String>>::deserialize(deserializer)?;

	Ok(raw.and_then(TokenSecret::non_empty))
}
