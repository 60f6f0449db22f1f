//! Session actions: the only code paths that mutate [`Session`](super::Session).
//!
//! Each action marks the session as loading for its duration, clears the previous error on
//! entry, and records the user-facing message of its failure. Actions are expected to be
//! issued serially by the UI; overlapping actions are safe but the last writer wins.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{AccountUpdate, CredentialPatch, LoginRequest, PasswordChange, SignupRequest, UserProfile},
	config::{ClientConfig, Endpoints},
	error::ConfigError,
	http::{ApiRequest, RequestKind, Transport, UploadFile},
	obs::{self, EventLevel, FlowKind, FlowOutcome, FlowSpan},
	pipeline::RequestPipeline,
	session::{ErrorDetail, Session, SessionCell},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	config::StorageMedium,
	http::ReqwestTransport,
	store::{CookieJarStore, FileStore, MemoryStore},
};

const PROFILE_PIC: &str = "profile_pic";
const PROFILE_PIC_URL: &str = "profile_pic_url";

/// Process-wide authenticated-user state and the actions that drive it.
pub struct SessionState<T>
where
	T: ?Sized + Transport,
{
	pipeline: Arc<RequestPipeline<T>>,
	cell: SessionCell,
	endpoints: Endpoints,
}
impl<T> SessionState<T>
where
	T: ?Sized + Transport,
{
	/// Assembles a session from an explicit transport and canonical store.
	pub fn with_parts(
		config: ClientConfig,
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
	) -> Result<Self> {
		let cell = SessionCell::default();
		let pipeline = RequestPipeline::new(&config, transport, store, cell.clone())?;

		Ok(Self { pipeline: Arc::new(pipeline), cell, endpoints: config.endpoints })
	}

	/// Pipeline for business calls that should share the session's credentials and renewal.
	pub fn pipeline(&self) -> &Arc<RequestPipeline<T>> {
		&self.pipeline
	}

	/// Current state.
	pub fn snapshot(&self) -> Session {
		self.cell.snapshot()
	}

	/// Receiver notified on every state change.
	pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Session> {
		self.cell.subscribe()
	}

	/// Authenticated and carrying a profile.
	pub fn is_authenticated(&self) -> bool {
		self.cell.is_authenticated()
	}

	/// Profile of the authenticated user.
	pub fn current_user(&self) -> Option<UserProfile> {
		self.cell.current_user()
	}

	/// Username, falling back to the display name; empty when logged out.
	pub fn user_name(&self) -> String {
		self.current_user().map(|user| user.display_name().to_owned()).unwrap_or_default()
	}

	/// Email of the authenticated user; empty when logged out or unknown.
	pub fn user_email(&self) -> String {
		self.current_user().and_then(|user| user.email).unwrap_or_default()
	}

	/// Creates an account. Credentials carried by the response are stored.
	pub async fn signup(&self, request: &SignupRequest) -> Result<Value> {
		self.run(FlowKind::Signup, "signup", async {
			let request = ApiRequest::post(&self.endpoints.signup)
				.with_kind(RequestKind::Credential)
				.with_json(request)?;
			let body = self.pipeline.send(request).await?.json_or_default::<Value>()?;

			self.absorb_credentials(&body)?;

			Ok(body)
		})
		.await
	}

	/// Obtains credentials, then fetches the profile.
	///
	/// A failed profile fetch fails the whole login and leaves the session unauthenticated,
	/// even though the server may already have issued credentials.
	pub async fn login(&self, request: &LoginRequest) -> Result<UserProfile> {
		self.run(FlowKind::Login, "login", async {
			let result = async {
				self.pipeline.store().clear()?;

				let request = ApiRequest::post(&self.endpoints.login)
					.with_kind(RequestKind::Credential)
					.with_json(request)?;
				let body = self.pipeline.send(request).await?.json_or_default::<Value>()?;

				self.absorb_credentials(&body)?;
				self.load_profile().await
			}
			.await;

			if result.is_err() {
				self.cell.expire();
			}

			result
		})
		.await
	}

	/// Ends the session. Local state and credentials are always cleared; a failing logout
	/// call is logged and otherwise ignored.
	pub async fn logout(&self) -> Result<()> {
		self.run(FlowKind::Logout, "logout", async {
			if let Err(e) = self.pipeline.send(ApiRequest::post(&self.endpoints.logout)).await {
				obs::record_event(FlowKind::Logout, EventLevel::Warn, &e);
			}

			self.reset()
		})
		.await
	}

	/// Loads the current user's profile and marks the session authenticated.
	pub async fn fetch_profile(&self) -> Result<UserProfile> {
		self.run(FlowKind::Profile, "fetch_profile", self.load_profile()).await
	}

	/// Startup probe.
	///
	/// Without stored session evidence no request is made. With evidence the profile is
	/// fetched; any failure clears the credentials and downgrades silently to logged out.
	pub async fn check_auth_status(&self) -> Result<bool> {
		self.run(FlowKind::AuthCheck, "check_auth_status", async {
			if self.pipeline.store().get()?.is_empty() {
				self.cell.expire();

				return Ok(false);
			}

			match self.load_profile().await {
				Ok(_) => Ok(true),
				Err(e) => {
					obs::record_event(FlowKind::AuthCheck, EventLevel::Info, &e);
					self.reset()?;

					Ok(false)
				},
			}
		})
		.await
	}

	/// Renews credentials on demand. A failed renewal ends the session.
	pub async fn refresh(&self) -> Result<()> {
		self.run(FlowKind::Renewal, "refresh", async {
			self.pipeline.renew().await?;

			Ok(())
		})
		.await
	}

	/// Updates account fields and merges them into the local profile.
	pub async fn update_account(&self, update: &AccountUpdate) -> Result<Value> {
		self.run(FlowKind::Account, "update_account", async {
			let request = ApiRequest::put(&self.endpoints.update_account).with_json(update)?;
			let body = self.pipeline.send(request).await?.json_or_default::<Value>()?;

			let submitted = serde_json::to_value(update).map_err(ConfigError::RequestBody)?;

			if let Value::Object(fields) = submitted {
				self.update_user_info(fields);
			}

			Ok(body)
		})
		.await
	}

	/// Changes the password of the authenticated user.
	pub async fn change_password(&self, change: &PasswordChange) -> Result<()> {
		self.run(FlowKind::Account, "change_password", async {
			let request = ApiRequest::put(&self.endpoints.change_password).with_json(change)?;

			self.pipeline.send(request).await?;

			Ok(())
		})
		.await
	}

	/// Deletes the account, then clears the session.
	pub async fn delete_account(&self) -> Result<()> {
		self.run(FlowKind::Account, "delete_account", async {
			self.pipeline.send(ApiRequest::delete(&self.endpoints.delete_account)).await?;
			self.reset()
		})
		.await
	}

	/// Uploads a new profile picture and records its URL on the local profile.
	///
	/// The file is sent as the multipart field `file`.
	pub async fn upload_profile_image(&self, image: UploadFile) -> Result<Value> {
		self.run(FlowKind::Account, "upload_profile_image", async {
			let request =
				ApiRequest::post(&self.endpoints.upload_profile_image).with_file("file", image);
			let body = self.pipeline.send(request).await?.json_or_default::<Value>()?;

			if let Some(url) = body.get(PROFILE_PIC_URL).filter(|url| !url.is_null()) {
				let mut patch = Map::new();

				patch.insert(PROFILE_PIC.into(), url.clone());
				self.update_user_info(patch);
			}

			Ok(body)
		})
		.await
	}

	/// Removes the profile picture, locally and on the server.
	pub async fn delete_profile_image(&self) -> Result<Value> {
		self.run(FlowKind::Account, "delete_profile_image", async {
			let request = ApiRequest::delete(&self.endpoints.delete_profile_image);
			let body = self.pipeline.send(request).await?.json_or_default::<Value>()?;

			self.cell.update(|session| {
				if let Some(user) = session.user.as_mut() {
					user.extra.remove(PROFILE_PIC);
				}
			});

			Ok(body)
		})
		.await
	}

	/// Shallow-merges `patch` into the local profile without a network call.
	///
	/// Does nothing while logged out.
	pub fn update_user_info(&self, patch: Map<String, Value>) {
		self.cell.update(|session| {
			if let Some(user) = session.user.as_mut() {
				user.merge(patch);
			}
		});
	}

	/// Drops the recorded failure.
	pub fn clear_error(&self) {
		self.cell.update(|session| session.last_error = None);
	}

	async fn run<R, Fut>(&self, kind: FlowKind, stage: &'static str, action: Fut) -> Result<R>
	where
		Fut: Future<Output = Result<R>>,
	{
		let span = FlowSpan::new(kind, stage);
		let _loading = LoadingGuard::begin(&self.cell);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(action).await;

		obs::record_flow_outcome(kind, FlowOutcome::of(&result));

		if let Err(e) = &result {
			let detail = ErrorDetail::from_error(e);

			self.cell.update(|session| session.last_error = Some(detail));
		}

		result
	}

	async fn load_profile(&self) -> Result<UserProfile> {
		match self.pipeline.send_json::<UserProfile>(ApiRequest::get(&self.endpoints.profile)).await {
			Ok(user) => {
				let snapshot = user.clone();

				self.cell.update(|session| {
					session.authenticated = true;
					session.user = Some(snapshot);
				});

				Ok(user)
			},
			Err(e) => {
				self.cell.expire();

				Err(match e {
					e @ (Error::SessionExpired | Error::RenewalFailed { .. } | Error::Network(_)) => e,
					other => Error::ProfileFetch { reason: other.to_string() },
				})
			},
		}
	}

	// Login and signup responses may carry any subset of the credential fields.
	fn absorb_credentials(&self, body: &Value) -> Result<()> {
		let Ok(patch) = CredentialPatch::deserialize(body) else {
			return Ok(());
		};

		if patch.is_empty() {
			return Ok(());
		}

		let store = self.pipeline.store();
		let bundle = store.get()?.apply(patch);

		store.set(bundle)?;

		Ok(())
	}

	fn reset(&self) -> Result<()> {
		self.cell.expire();
		self.pipeline.store().clear()?;

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl SessionState<ReqwestTransport> {
	/// Builds the reqwest transport and the canonical store the configuration selects.
	///
	/// The cookie medium views the transport's jar; the explicit medium persists to
	/// `store_path` when set, else keeps credentials in memory.
	pub fn connect(config: ClientConfig) -> Result<Self> {
		config.validate()?;

		let transport = ReqwestTransport::from_config(&config)?;
		let store: Arc<dyn CredentialStore> = match config.medium {
			StorageMedium::Cookie => {
				let jar = transport.jar().cloned().ok_or(ConfigError::CookieMediumUnsupported)?;

				Arc::new(CookieJarStore::new(jar, config.base_url.clone()))
			},
			StorageMedium::Explicit => match &config.store_path {
				Some(path) => Arc::new(FileStore::open(path)?),
				None => Arc::new(MemoryStore::default()),
			},
		};

		Self::with_parts(config, Arc::new(transport), store)
	}
}
impl<T> Clone for SessionState<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			pipeline: self.pipeline.clone(),
			cell: self.cell.clone(),
			endpoints: self.endpoints.clone(),
		}
	}
}
impl<T> Debug for SessionState<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionState")
			.field("session", &self.cell.snapshot())
			.field("pipeline", &self.pipeline)
			.finish()
	}
}

// Resets `loading` however the action ends, including when its future is dropped.
struct LoadingGuard<'a>(&'a SessionCell);
impl<'a> LoadingGuard<'a> {
	fn begin(cell: &'a SessionCell) -> Self {
		cell.update(|session| {
			session.loading = true;
			session.last_error = None;
		});

		Self(cell)
	}
}
impl Drop for LoadingGuard<'_> {
	fn drop(&mut self) {
		self.0.update(|session| session.loading = false);
	}
}
