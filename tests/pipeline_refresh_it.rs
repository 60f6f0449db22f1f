// std
use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use serde_json::{Value, json};
use tokio::sync::{Barrier, Semaphore};
// self
use session_broker::{
	auth::{CredentialBundle, LoginRequest},
	config::{ClientConfig, StorageMedium},
	error::{Error, TransportError},
	http::{ApiRequest, ApiResponse, RequestBody, Transport, TransportFuture, UploadFile},
	refresh::RefreshPhase,
	session::SessionState,
	store::{CredentialStore, MemoryStore},
	url::Url,
};

// In-process API that accepts exactly one access token at a time.
struct FakeApi {
	valid_access: Mutex<String>,
	refresh_status: u16,
	refresh_body: Value,
	rotate_on_refresh: bool,
	// Holds stale-token responses until every concurrent request has been rejected.
	gate: Option<Barrier>,
	// Holds the renewal call until a permit is added.
	refresh_gate: Option<Semaphore>,
	latency: Option<Duration>,
	renewals: AtomicUsize,
	log: Mutex<Vec<ApiRequest>>,
}
impl FakeApi {
	fn new(valid_access: &str) -> Self {
		Self {
			valid_access: Mutex::new(valid_access.into()),
			refresh_status: 200,
			refresh_body: json!({ "access_token": "a2" }),
			rotate_on_refresh: true,
			gate: None,
			refresh_gate: None,
			latency: None,
			renewals: AtomicUsize::new(0),
			log: Mutex::new(Vec::new()),
		}
	}

	fn renewals(&self) -> usize {
		self.renewals.load(Ordering::SeqCst)
	}

	fn logged(&self, path: &str) -> Vec<ApiRequest> {
		self.log
			.lock()
			.expect("Request log lock should not be poisoned.")
			.iter()
			.filter(|request| request.path == path)
			.cloned()
			.collect()
	}

	async fn respond(&self, request: ApiRequest) -> ApiResponse {
		self.log.lock().expect("Request log lock should not be poisoned.").push(request.clone());

		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}

		match request.path.as_str() {
			"/auth/login" =>
				ApiResponse::json_body(401, &json!({ "detail": "Invalid credentials" })),
			"/auth/refresh" => {
				self.renewals.fetch_add(1, Ordering::SeqCst);

				if let Some(gate) = &self.refresh_gate {
					let _permit = gate.acquire().await;
				}

				// Let concurrent requests observe the in-flight renewal.
				for _ in 0..5 {
					tokio::task::yield_now().await;
				}

				if self.refresh_status != 200 {
					return ApiResponse::json_body(
						self.refresh_status,
						&json!({ "detail": "refresh token revoked" }),
					);
				}
				if self.rotate_on_refresh {
					if let Some(access) = self.refresh_body["access_token"].as_str() {
						*self.valid_access.lock().expect("Token lock should not be poisoned.") =
							access.into();
					}
				}

				ApiResponse::json_body(200, &self.refresh_body)
			},
			path => {
				let expected = format!(
					"Bearer {}",
					self.valid_access.lock().expect("Token lock should not be poisoned.")
				);

				if request.headers.get("Authorization") == Some(&expected) {
					let body = match path {
						"/member/me" => json!({ "username": "a" }),
						"/member/upload-profile" => json!({ "profile_pic_url": "pics/a.png" }),
						path => json!({ "path": path }),
					};

					return ApiResponse::json_body(200, &body);
				}
				if let Some(gate) = &self.gate {
					gate.wait().await;
				}

				ApiResponse::json_body(401, &json!({ "detail": "Token expired" }))
			},
		}
	}
}
impl Transport for FakeApi {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move { Ok(self.respond(request).await) })
	}
}

fn seeded_bundle() -> CredentialBundle {
	CredentialBundle {
		access_token: Some("a1".into()),
		refresh_token: Some("r1".into()),
		csrf_token: Some("c1".into()),
	}
}

fn config() -> ClientConfig {
	let base = Url::parse("https://api.example.com").expect("Base URL should parse.");

	ClientConfig::new(base).with_medium(StorageMedium::Explicit)
}

async fn authenticated_session(
	api: FakeApi,
	config: ClientConfig,
) -> (SessionState<FakeApi>, Arc<FakeApi>, Arc<MemoryStore>) {
	let api = Arc::new(api);
	let store = Arc::new(MemoryStore::seeded(seeded_bundle()));
	let state = SessionState::with_parts(config, api.clone(), store.clone())
		.expect("Session should assemble.");

	// Seed tokens are valid for the profile fetch; rotate afterwards to force expiry.
	state.fetch_profile().await.expect("Profile fetch should succeed.");

	(state, api, store)
}

fn expire(api: &FakeApi) {
	*api.valid_access.lock().expect("Token lock should not be poisoned.") = "a2".into();
}

#[tokio::test]
async fn concurrent_expiries_issue_a_single_renewal_and_replay_all() {
	let mut api = FakeApi::new("a1");

	api.gate = Some(Barrier::new(3));

	let (state, api, store) = authenticated_session(api, config()).await;

	expire(&api);

	let pipeline = state.pipeline();
	let (r1, r2, r3) = tokio::join!(
		pipeline.send(ApiRequest::get("/data/1")),
		pipeline.send(ApiRequest::get("/data/2")),
		pipeline.send(ApiRequest::get("/data/3")),
	);

	assert_eq!(api.renewals(), 1);

	for (response, path) in [(r1, "/data/1"), (r2, "/data/2"), (r3, "/data/3")] {
		let body: Value = response
			.expect("Every request should succeed after replay.")
			.json()
			.expect("Replay body should decode.");

		assert_eq!(body["path"], path);
		assert_eq!(api.logged(path).len(), 2);
	}

	assert!(state.is_authenticated());
	assert_eq!(pipeline.coordinator().metrics().attempts(), 1);
	assert_eq!(
		store.get().expect("Store read should succeed.").access_token,
		Some("a2".into())
	);
}

#[tokio::test]
async fn queued_requests_replay_in_the_order_they_expired() {
	let mut api = FakeApi::new("a1");

	api.refresh_gate = Some(Semaphore::new(0));

	let (state, api, _) = authenticated_session(api, config()).await;

	expire(&api);

	let pipeline = state.pipeline().clone();
	let mut tasks = Vec::new();

	for id in 0..4 {
		let task_pipeline = pipeline.clone();

		tasks.push(tokio::spawn(async move {
			task_pipeline.send(ApiRequest::get(format!("/data/{id}"))).await
		}));

		// The first request leads; each later one must be queued before the next is sent.
		while pipeline.coordinator().phase() == RefreshPhase::Idle
			|| pipeline.coordinator().queued() < id
		{
			tokio::task::yield_now().await;
		}
	}

	if let Some(gate) = &api.refresh_gate {
		gate.add_permits(1);
	}

	for task in tasks {
		task.await.expect("Request task should not panic.").expect("Every request should replay.");
	}

	let replays = api
		.log
		.lock()
		.expect("Request log lock should not be poisoned.")
		.iter()
		.filter(|request| request.is_retry())
		.map(|request| request.path.clone())
		.collect::<Vec<_>>();

	assert_eq!(api.renewals(), 1);
	assert_eq!(replays, ["/data/0", "/data/1", "/data/2", "/data/3"]);
}

#[tokio::test]
async fn renewal_merges_present_fields_and_keeps_absent_ones() {
	let mut api = FakeApi::new("a1");

	api.refresh_body = json!({ "access_token": "a2", "csrf_token": "c2", "message": "refreshed" });

	let (state, api, store) = authenticated_session(api, config()).await;

	expire(&api);
	state.pipeline().send(ApiRequest::get("/data/1")).await.expect("Request should be replayed.");

	let bundle = store.get().expect("Store read should succeed.");

	assert_eq!(bundle.access_token, Some("a2".into()));
	assert_eq!(bundle.refresh_token, Some("r1".into()));
	assert_eq!(bundle.csrf_token, Some("c2".into()));

	let renewal = &api.logged("/auth/refresh")[0];

	assert_eq!(renewal.body, Some(RequestBody::Json(json!({ "refresh_token": "r1" }))));

	let replay = &api.logged("/data/1")[1];

	assert_eq!(replay.headers.get("X-CSRF-Token").map(String::as_str), Some("c2"));
	assert_eq!(replay.headers.get("Authorization").map(String::as_str), Some("Bearer a2"));
}

#[tokio::test]
async fn rejected_renewal_clears_credentials_and_fails_every_waiter() {
	let mut api = FakeApi::new("a1");

	api.refresh_status = 401;
	api.gate = Some(Barrier::new(2));

	let (state, api, store) = authenticated_session(api, config()).await;

	expire(&api);

	let pipeline = state.pipeline();
	let (r1, r2) = tokio::join!(
		pipeline.send(ApiRequest::get("/data/1")),
		pipeline.send(ApiRequest::get("/data/2")),
	);

	assert_eq!(api.renewals(), 1);
	assert!(matches!(r1, Err(Error::RenewalFailed { .. })));
	assert!(matches!(r2, Err(Error::RenewalFailed { .. })));
	assert!(store.get().expect("Store read should succeed.").is_empty());
	assert!(!state.is_authenticated());
	// Neither request is replayed.
	assert_eq!(api.logged("/data/1").len(), 1);
	assert_eq!(api.logged("/data/2").len(), 1);
}

#[tokio::test]
async fn unavailable_renewal_keeps_the_session() {
	let mut api = FakeApi::new("a1");

	api.refresh_status = 503;
	api.gate = Some(Barrier::new(2));

	let (state, api, store) = authenticated_session(api, config()).await;

	expire(&api);

	let pipeline = state.pipeline();
	let (r1, r2) = tokio::join!(
		pipeline.send(ApiRequest::get("/data/1")),
		pipeline.send(ApiRequest::get("/data/2")),
	);

	assert_eq!(api.renewals(), 1);

	for result in [r1, r2] {
		let err = result.expect_err("An unavailable renewal should fail the request.");

		assert!(matches!(err, Error::Api { status: 503, .. }));
		assert!(err.is_transient());
	}

	assert!(state.is_authenticated());
	assert_eq!(store.get().expect("Store read should succeed."), seeded_bundle());
}

#[tokio::test]
async fn expired_upload_is_replayed_with_the_same_file() {
	let (state, api, _) = authenticated_session(FakeApi::new("a1"), config()).await;

	expire(&api);

	let image = UploadFile::new("a.png", b"png".to_vec()).with_content_type("image/png");

	state.upload_profile_image(image).await.expect("Upload should survive the expiry.");

	let uploads = api.logged("/member/upload-profile");

	assert_eq!(api.renewals(), 1);
	assert_eq!(uploads.len(), 2);
	assert_eq!(uploads[0].body, uploads[1].body);
	assert!(matches!(&uploads[1].body, Some(RequestBody::Multipart(parts)) if parts[0].0 == "file"));
	assert_eq!(
		state.current_user().and_then(|user| user.extra.get("profile_pic").cloned()),
		Some(json!("pics/a.png"))
	);
}

#[tokio::test]
async fn replay_that_expires_again_is_terminal() {
	let mut api = FakeApi::new("a1");

	// The server hands out a token it will not accept.
	api.rotate_on_refresh = false;

	let (state, api, store) = authenticated_session(api, config()).await;

	*api.valid_access.lock().expect("Token lock should not be poisoned.") = "never".into();

	let err = state
		.pipeline()
		.send(ApiRequest::get("/data/1"))
		.await
		.expect_err("A second expiry should fail terminally.");

	assert!(matches!(err, Error::SessionExpired));
	assert_eq!(api.renewals(), 1);
	assert_eq!(api.logged("/data/1").len(), 2);
	assert!(store.get().expect("Store read should succeed.").is_empty());
	assert!(!state.is_authenticated());
}

#[tokio::test]
async fn timeouts_are_network_errors_and_never_renew() {
	let mut api = FakeApi::new("a1");

	api.latency = Some(Duration::from_millis(500));

	let api = Arc::new(api);
	let store = Arc::new(MemoryStore::seeded(seeded_bundle()));
	let state = SessionState::with_parts(
		config().with_timeout(Duration::from_millis(20)),
		api.clone(),
		store.clone(),
	)
	.expect("Session should assemble.");
	let err = state
		.pipeline()
		.send(ApiRequest::get("/data/1"))
		.await
		.expect_err("A slow server should time out.");

	assert!(matches!(err, Error::Network(TransportError::Timeout)));
	assert_eq!(api.renewals(), 0);
	assert_eq!(store.get().expect("Store read should succeed."), seeded_bundle());
}

#[tokio::test]
async fn rejected_login_is_a_validation_error() {
	let api = Arc::new(FakeApi::new("a1"));
	let state = SessionState::with_parts(config(), api.clone(), Arc::new(MemoryStore::default()))
		.expect("Session should assemble.");
	let err = state
		.login(&LoginRequest::new("a", "wrong"))
		.await
		.expect_err("Bad credentials should be rejected.");

	assert!(matches!(err, Error::Validation { ref message } if message == "Invalid credentials"));
	assert_eq!(api.renewals(), 0);
	assert_eq!(
		state.snapshot().last_error.map(|detail| detail.message).as_deref(),
		Some("Invalid credentials")
	);
	assert!(!state.snapshot().loading);
}

#[tokio::test]
async fn auth_check_without_evidence_stays_offline() {
	let api = Arc::new(FakeApi::new("a1"));
	let state = SessionState::with_parts(config(), api.clone(), Arc::new(MemoryStore::default()))
		.expect("Session should assemble.");
	let authenticated = state.check_auth_status().await.expect("Auth check should succeed.");

	assert!(!authenticated);
	assert!(!state.is_authenticated());
	assert!(api.log.lock().expect("Request log lock should not be poisoned.").is_empty());
}
