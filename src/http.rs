//! Transport boundary: the request/response primitive the pipeline wraps.
//!
//! The pipeline is the only caller of [`Transport::send`]. It mutates headers before the
//! call (CSRF marker, bearer credential) and inspects the status afterwards, so a transport
//! never needs to know about sessions. Implementations must be `Send + Sync + 'static` so a
//! single transport can be shared by every task of the session.
//!
//! Transports report connectivity failures as [`Error::Network`] and requests they cannot
//! build (unresolvable paths, invalid upload metadata) as [`Error::Config`].

// crates.io
use serde::de::DeserializeOwned;
#[cfg(feature = "reqwest")] use reqwest::cookie::Jar;
// self
use crate::{_prelude::*, error::ConfigError};
#[cfg(feature = "reqwest")]
use crate::{
	config::{self, ClientConfig, StorageMedium},
	error::TransportError,
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + 'a + Send>>;

/// HTTP transport used by the [`RequestPipeline`](crate::pipeline::RequestPipeline).
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Issues `request` and resolves once a response (of any status) arrives.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;

	/// Whether the transport stores and replays server-set cookies.
	///
	/// The cookie medium is only accepted for transports that return `true`.
	fn supports_cookies(&self) -> bool {
		false
	}
}

/// HTTP method subset used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Role of a request in the session protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// Ordinary API call; an expiry triggers renewal and one replay.
	#[default]
	Standard,
	/// Login or signup; a 401 means bad credentials, never an expired session.
	Credential,
	/// The renewal call itself; an expiry is terminal.
	Renewal,
}

/// File sent as one part of a multipart form.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
	/// File name reported to the server.
	pub file_name: String,
	/// MIME type; the transport picks a default when unset.
	pub content_type: Option<String>,
	/// File contents.
	pub bytes: Vec<u8>,
}
impl UploadFile {
	/// Creates an upload with no declared content type.
	pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
		Self { file_name: file_name.into(), content_type: None, bytes: bytes.into() }
	}

	/// Declares the MIME type.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}
}
impl Debug for UploadFile {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UploadFile")
			.field("file_name", &self.file_name)
			.field("content_type", &self.content_type)
			.field("len", &self.bytes.len())
			.finish()
	}
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// JSON document.
	Json(serde_json::Value),
	/// `multipart/form-data` with one file per named field.
	Multipart(Vec<(String, UploadFile)>),
}

/// Transport-agnostic outgoing request.
///
/// Requests are cloned for every attempt, so a replay after renewal resends the same body.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL.
	pub path: String,
	/// Header name/value pairs.
	pub headers: BTreeMap<String, String>,
	/// Payload, if any.
	pub body: Option<RequestBody>,
	/// Protocol role.
	pub kind: RequestKind,
	retried: bool,
}
impl ApiRequest {
	/// Creates a request with no headers or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: BTreeMap::new(),
			body: None,
			kind: RequestKind::Standard,
			retried: false,
		}
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// `PUT path`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(RequestBody::Json(serde_json::to_value(body)?));

		Ok(self)
	}

	/// Adds `file` under `field`, turning the body into a multipart form.
	///
	/// Replaces a JSON body if one was set.
	pub fn with_file(mut self, field: impl Into<String>, file: UploadFile) -> Self {
		match &mut self.body {
			Some(RequestBody::Multipart(parts)) => parts.push((field.into(), file)),
			body => *body = Some(RequestBody::Multipart(vec![(field.into(), file)])),
		}

		self
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Overrides the protocol role.
	pub fn with_kind(mut self, kind: RequestKind) -> Self {
		self.kind = kind;

		self
	}

	/// Returns `true` once the request has been replayed after a renewal.
	pub fn is_retry(&self) -> bool {
		self.retried
	}

	pub(crate) fn mark_retry(&mut self) {
		self.retried = true;
	}
}

/// Response as seen by the pipeline.
#[derive(Clone, Debug, Default)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header name (lower-case)/value pairs that are valid text.
	pub headers: BTreeMap<String, String>,
	/// Raw body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Status that signals an expired or invalid session credential.
	pub const SESSION_EXPIRED: u16 = 401;

	/// Builds a response with a JSON body.
	pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.to_string().into_bytes() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` when the server rejected the session credential.
	pub fn is_session_expired(&self) -> bool {
		self.status == Self::SESSION_EXPIRED
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: self.status })
	}

	/// Decodes the body as JSON, treating an empty body as `T::default()`.
	pub fn json_or_default<T>(&self) -> Result<T>
	where
		T: DeserializeOwned + Default,
	{
		if self.body.iter().all(u8::is_ascii_whitespace) { Ok(T::default()) } else { self.json() }
	}

	/// Extracts the server's `detail` message, if the body carries one.
	///
	/// String details are returned verbatim; structured details (validation error lists) are
	/// rendered as compact JSON.
	pub fn detail(&self) -> Option<String> {
		let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;

		match value.get("detail")? {
			serde_json::Value::String(message) => Some(message.clone()),
			serde_json::Value::Null => None,
			other => Some(other.to_string()),
		}
	}
}

/// Reqwest-backed [`Transport`] resolving paths against a base URL.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Url,
	jar: Option<Arc<Jar>>,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport honoring the configured timeout; the cookie medium gets a fresh jar.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let jar = match config.medium {
			StorageMedium::Cookie => Some(Arc::new(Jar::default())),
			StorageMedium::Explicit => None,
		};
		let mut builder = ReqwestClient::builder().timeout(config.timeout());

		if let Some(jar) = &jar {
			builder = builder.cookie_provider(Arc::clone(jar));
		}

		Ok(Self { client: builder.build()?, base_url: config.base_url.clone(), jar })
	}

	/// Wraps an existing client. Pass the jar installed on `client`, if any, so the cookie
	/// medium can read it.
	pub fn with_client(client: ReqwestClient, base_url: Url, jar: Option<Arc<Jar>>) -> Self {
		Self { client, base_url, jar }
	}

	/// Cookie jar shared with the client, when cookies are enabled.
	pub fn jar(&self) -> Option<&Arc<Jar>> {
		self.jar.as_ref()
	}

	fn form(parts: Vec<(String, UploadFile)>) -> Result<reqwest::multipart::Form, ConfigError> {
		let mut form = reqwest::multipart::Form::new();

		for (field, file) in parts {
			let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);

			if let Some(value) = file.content_type {
				part = part
					.mime_str(&value)
					.map_err(|_| ConfigError::InvalidContentType { value: value.clone() })?;
			}

			form = form.part(field, part);
		}

		Ok(form)
	}

	fn method(method: Method) -> reqwest::Method {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let url = config::resolve_endpoint(&self.base_url, &request.path)?;
			let mut builder = self.client.request(Self::method(request.method), url);

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}

			match request.body {
				Some(RequestBody::Json(body)) => {
					let bytes = serde_json::to_vec(&body).map_err(ConfigError::RequestBody)?;

					builder =
						builder.header(reqwest::header::CONTENT_TYPE, "application/json").body(bytes);
				},
				Some(RequestBody::Multipart(parts)) => builder = builder.multipart(Self::form(parts)?),
				None => {},
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}

	fn supports_cookies(&self) -> bool {
		self.jar.is_some()
	}
}
