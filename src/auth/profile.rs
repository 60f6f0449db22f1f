//! User profile and account payloads exchanged with the auth endpoints.

// self
use crate::_prelude::*;

/// Authenticated user as returned by the profile endpoint.
///
/// Fields the client does not model are preserved in `extra` so profile updates can merge
/// without losing server data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Server-side identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<serde_json::Value>,
	/// Login handle.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// Display name, used when no username is set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Contact address.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Remaining fields (`created_at`, `profile_pic`, ...).
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl UserProfile {
	/// Creates a profile carrying only a username.
	pub fn with_username(username: impl Into<String>) -> Self {
		Self { username: Some(username.into()), ..Default::default() }
	}

	/// Username, falling back to the display name, else empty.
	pub fn display_name(&self) -> &str {
		self.username.as_deref().or(self.name.as_deref()).unwrap_or_default()
	}

	/// Shallow-merges `patch` into this profile; `null` patch values are skipped.
	///
	/// Numbers and booleans given for a text field are stored as their text. Arrays and
	/// objects cannot stand in for text and leave the field unchanged.
	pub fn merge(&mut self, patch: serde_json::Map<String, serde_json::Value>) {
		for (key, value) in patch {
			if value.is_null() {
				continue;
			}

			let field = match key.as_str() {
				"id" => {
					self.id = Some(value);

					continue;
				},
				"username" => &mut self.username,
				"name" => &mut self.name,
				"email" => &mut self.email,
				_ => {
					self.extra.insert(key, value);

					continue;
				},
			};

			if let Some(text) = Self::text(value) {
				*field = Some(text);
			}
		}
	}

	fn text(value: serde_json::Value) -> Option<String> {
		match value {
			serde_json::Value::String(text) => Some(text),
			serde_json::Value::Number(number) => Some(number.to_string()),
			serde_json::Value::Bool(flag) => Some(flag.to_string()),
			_ => None,
		}
	}
}

/// Signup payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignupRequest {
	/// Contact address.
	pub email: String,
	/// Plain-text password; never logged.
	pub password: String,
	/// Login handle.
	pub username: String,
}
impl Debug for SignupRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignupRequest")
			.field("email", &self.email)
			.field("username", &self.username)
			.finish_non_exhaustive()
	}
}

/// Login payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
	/// Login identifier (email or username, as the server expects).
	pub email: String,
	/// Plain-text password; never logged.
	pub password: String,
}
impl LoginRequest {
	/// Builds a login payload.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest").field("email", &self.email).finish_non_exhaustive()
	}
}

/// Partial account update; absent fields are left untouched server-side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
	/// New contact address.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// New login handle.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
}

/// Password change payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordChange {
	/// Current password.
	pub current_password: String,
	/// Replacement password.
	pub new_password: String,
	/// Replacement password, repeated.
	pub confirm_password: String,
}
impl Debug for PasswordChange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PasswordChange(<redacted>)")
	}
}
