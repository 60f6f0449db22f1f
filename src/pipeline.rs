//! Request pipeline: signs outgoing requests, detects session expiry, and replays once after
//! renewal.
//!
//! Every request is signed from the canonical credential store at the moment it is issued, so
//! a replay after renewal automatically carries the renewed credentials. Failures are
//! normalized into [`Error`] here; nothing past this boundary sees raw transport errors.

// std
use std::time::Duration;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{CredentialBundle, CredentialPatch},
	config::{ClientConfig, StorageMedium},
	error::{ConfigError, TransportError},
	http::{ApiRequest, ApiResponse, RequestKind, Transport},
	obs::{self, EventLevel, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
	session::SessionCell,
	store::CredentialStore,
};

/// Signs, issues, and (on expiry) renews and replays requests.
pub struct RequestPipeline<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	coordinator: Arc<RefreshCoordinator>,
	medium: StorageMedium,
	csrf_header: String,
	timeout: Duration,
	refresh_path: String,
}
impl<T> RequestPipeline<T>
where
	T: ?Sized + Transport,
{
	/// Wires a pipeline around `transport` and the canonical `store`.
	///
	/// Fails when the configured medium cannot be honored by the transport.
	pub fn new(
		config: &ClientConfig,
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
		session: SessionCell,
	) -> Result<Self> {
		config.validate()?;

		if config.medium == StorageMedium::Cookie && !transport.supports_cookies() {
			return Err(ConfigError::CookieMediumUnsupported.into());
		}

		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), session));

		Ok(Self {
			transport,
			store,
			coordinator,
			medium: config.medium,
			csrf_header: config.csrf_header.clone(),
			timeout: config.timeout(),
			refresh_path: config.endpoints.refresh.clone(),
		})
	}

	/// Renewal coordinator shared by every request of this pipeline.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Canonical credential store.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Storage medium resolved at construction.
	pub fn medium(&self) -> StorageMedium {
		self.medium
	}

	/// Issues `request`, renewing and replaying it once if the session has expired.
	///
	/// Non-success responses are returned as errors.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(request)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// [`send`](Self::send) followed by a JSON decode of the response body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(request).await?.json()
	}

	/// Renews credentials now, joining any renewal already in flight.
	pub async fn renew(&self) -> Result<CredentialBundle> {
		let generation = self.coordinator.generation();

		self.coordinator.renew(generation, || self.renewal_call()).await
	}

	async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		// Captured before signing so a renewal completing mid-flight is detected.
		let generation = self.coordinator.generation();
		let response = self.issue(&request).await?;

		if response.is_success() {
			return Ok(response);
		}
		if !response.is_session_expired() {
			return Err(Self::classify(&response, request.kind));
		}

		match request.kind {
			RequestKind::Credential => Err(Self::classify(&response, request.kind)),
			RequestKind::Renewal => {
				self.coordinator.invalidate();

				Err(Error::RenewalFailed { reason: Self::reason(&response) })
			},
			RequestKind::Standard if request.is_retry() => {
				self.coordinator.invalidate();

				Err(Error::SessionExpired)
			},
			RequestKind::Standard => {
				obs::record_event(
					FlowKind::Request,
					EventLevel::Debug,
					&format_args!("{} {} observed an expired session", request.method, request.path),
				);
				self.coordinator.renew(generation, || self.renewal_call()).await?;
				request.mark_retry();

				let replayed = self.issue(&request).await?;

				if replayed.is_success() {
					Ok(replayed)
				} else if replayed.is_session_expired() {
					self.coordinator.invalidate();

					Err(Error::SessionExpired)
				} else {
					Err(Self::classify(&replayed, request.kind))
				}
			},
		}
	}

	// Issued directly rather than through `dispatch`; a 401 here must never renew.
	async fn renewal_call(&self) -> Result<CredentialPatch> {
		let mut request = ApiRequest::post(&self.refresh_path).with_kind(RequestKind::Renewal);

		if self.medium.signs_with_bearer() {
			let Some(refresh_token) = self.store.get()?.refresh_token else {
				return Err(Error::RenewalFailed { reason: "no refresh token is stored".into() });
			};

			request = request
				.with_json(&serde_json::json!({ "refresh_token": refresh_token.expose() }))?;
		}

		let response = self.issue(&request).await?;

		// A server that cannot answer has not rejected the refresh credential.
		if response.status >= 500 {
			return Err(Error::Api { status: response.status, message: Self::reason(&response) });
		}
		if !response.is_success() {
			return Err(Error::RenewalFailed { reason: Self::reason(&response) });
		}

		response.json_or_default()
	}

	async fn issue(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let signed = self.sign(request.clone())?;

		match tokio::time::timeout(self.timeout, self.transport.send(signed)).await {
			Ok(result) => result,
			Err(_) => Err(TransportError::Timeout.into()),
		}
	}

	fn sign(&self, mut request: ApiRequest) -> Result<ApiRequest> {
		let bundle = self.store.get()?;

		if let Some(csrf) = &bundle.csrf_token {
			request.headers.insert(self.csrf_header.clone(), csrf.expose().to_owned());
		}
		// With the cookie medium the transport attaches the credential itself.
		if let Some(access) =
			bundle.access_token.as_ref().filter(|_| self.medium.signs_with_bearer())
		{
			request.headers.insert("Authorization".into(), format!("Bearer {}", access.expose()));
		}

		Ok(request)
	}

	fn classify(response: &ApiResponse, kind: RequestKind) -> Error {
		match response.status {
			400 | 422 => Error::Validation {
				message: response.detail().unwrap_or_else(|| "The request was rejected.".into()),
			},
			ApiResponse::SESSION_EXPIRED if kind == RequestKind::Credential => Error::Validation {
				message: response.detail().unwrap_or_else(|| "Invalid credentials.".into()),
			},
			status => Error::Api { status, message: Self::reason(response) },
		}
	}

	fn reason(response: &ApiResponse) -> String {
		response.detail().unwrap_or_else(|| format!("HTTP {}", response.status))
	}
}
impl<T> Debug for RequestPipeline<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("medium", &self.medium)
			.field("timeout", &self.timeout)
			.field("coordinator", &self.coordinator)
			.finish_non_exhaustive()
	}
}
