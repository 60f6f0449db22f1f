#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use session_broker::{
	auth::{LoginRequest, TokenSecret},
	config::{ClientConfig, StorageMedium},
	error::Error,
	http::UploadFile,
	session::SessionState,
	store::CredentialStore,
	url::Url,
};

fn config(server: &MockServer, medium: StorageMedium) -> ClientConfig {
	let base = Url::parse(&server.base_url()).expect("Mock server URL should parse.");

	ClientConfig::new(base).with_medium(medium)
}

#[tokio::test]
async fn login_then_profile_authenticates_the_user() {
	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login").json_body(json!({ "email": "a", "password": "p" }));
			then.status(200).json_body(json!({
				"access_token": "a1",
				"refresh_token": "r1",
				"csrf_token": "c1",
				"message": "Login successful",
			}));
		})
		.await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/member/me")
				.header("authorization", "Bearer a1")
				.header("x-csrf-token", "c1");
			then.status(200).json_body(json!({ "id": 1, "username": "a", "email": "a@example.com" }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");
	let user = state.login(&LoginRequest::new("a", "p")).await.expect("Login should succeed.");

	login.assert_async().await;
	profile.assert_async().await;

	assert_eq!(user.username.as_deref(), Some("a"));
	assert!(state.is_authenticated());
	assert_eq!(state.current_user().and_then(|user| user.username).as_deref(), Some("a"));
	assert_eq!(state.user_email(), "a@example.com");
	assert!(!state.snapshot().loading);
}

#[tokio::test]
async fn auth_check_without_evidence_skips_the_profile_call() {
	let server = MockServer::start_async().await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me");
			then.status(200).json_body(json!({ "username": "a" }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");
	let authenticated = state.check_auth_status().await.expect("Auth check should succeed.");

	assert!(!authenticated);
	assert!(!state.is_authenticated());

	profile.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_profile_request_is_renewed_and_replayed() {
	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({ "access_token": "a1", "refresh_token": "r1" }));
		})
		.await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me").header("authorization", "Bearer a1");
			then.status(401).json_body(json!({ "detail": "Token expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").json_body(json!({ "refresh_token": "r1" }));
			then.status(200).json_body(json!({ "access_token": "a2" }));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me").header("authorization", "Bearer a2");
			then.status(200).json_body(json!({ "username": "a" }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");

	state.login(&LoginRequest::new("a", "p")).await.expect("Login should survive the expiry.");

	login.assert_async().await;
	stale.assert_async().await;
	refresh.assert_async().await;
	fresh.assert_async().await;

	assert!(state.is_authenticated());

	let bundle = state.pipeline().store().get().expect("Store read should succeed.");

	assert_eq!(bundle.access_token.as_ref().map(TokenSecret::expose), Some("a2"));
	assert_eq!(bundle.refresh_token.as_ref().map(TokenSecret::expose), Some("r1"));
}

#[tokio::test]
async fn failed_renewal_forces_a_new_login() {
	let server = MockServer::start_async().await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me");
			then.status(401).json_body(json!({ "detail": "Token expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401).json_body(json!({ "detail": "Refresh token revoked" }));
		})
		.await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({ "access_token": "a1", "refresh_token": "r1" }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");
	let err = state
		.login(&LoginRequest::new("a", "p"))
		.await
		.expect_err("Login should fail when the profile cannot be fetched.");

	login.assert_async().await;
	profile.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;

	assert!(matches!(err, Error::RenewalFailed { .. }));
	assert!(!state.is_authenticated());
	assert!(state.pipeline().store().get().expect("Store read should succeed.").is_empty());
	assert_eq!(
		state.snapshot().last_error.map(|detail| detail.message).as_deref(),
		Some("Your session has expired. Please log in again.")
	);
}

#[tokio::test]
async fn logout_clears_credentials_even_on_server_error() {
	let server = MockServer::start_async().await;
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({ "access_token": "a1", "csrf_token": "c1" }));
		})
		.await;
	let _profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me");
			then.status(200).json_body(json!({ "username": "a" }));
		})
		.await;
	let logout = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/logout").header("x-csrf-token", "c1");
			then.status(500);
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");

	state.login(&LoginRequest::new("a", "p")).await.expect("Login should succeed.");
	state.logout().await.expect("Logout should not surface the server failure.");

	logout.assert_async().await;

	assert!(!state.is_authenticated());
	assert!(state.pipeline().store().get().expect("Store read should succeed.").is_empty());
}

#[tokio::test]
async fn cookie_medium_signs_from_server_set_cookies() {
	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200)
				.header("set-cookie", "csrf_token=c1; Path=/")
				.json_body(json!({ "message": "Login successful" }));
		})
		.await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/member/me")
				.header("x-csrf-token", "c1")
				.header_missing("authorization");
			then.status(200).json_body(json!({ "username": "a" }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Cookie))
		.expect("Cookie session should connect.");

	state.login(&LoginRequest::new("a", "p")).await.expect("Cookie login should succeed.");

	login.assert_async().await;
	profile.assert_async().await;

	assert!(state.is_authenticated());
	assert_eq!(
		state
			.pipeline()
			.store()
			.get()
			.expect("Cookie store read should succeed.")
			.csrf_token
			.as_ref()
			.map(TokenSecret::expose),
		Some("c1")
	);
}

#[tokio::test]
async fn profile_image_upload_is_sent_as_multipart() {
	let server = MockServer::start_async().await;
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({ "access_token": "a1", "csrf_token": "c1" }));
		})
		.await;
	let _profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me");
			then.status(200).json_body(json!({ "username": "a" }));
		})
		.await;
	let upload = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/member/upload-profile")
				.header("authorization", "Bearer a1")
				.header("x-csrf-token", "c1")
				.body_includes(r#"name="file"; filename="me.png""#)
				.body_includes("png-bytes");
			then.status(200).json_body(json!({ "success": true, "profile_pic_url": "pics/me.png" }));
		})
		.await;
	let removal = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/member/delete-profile");
			then.status(200).json_body(json!({ "success": true }));
		})
		.await;
	let state = SessionState::connect(config(&server, StorageMedium::Explicit))
		.expect("Explicit session should connect.");
	let picture = || state.current_user().and_then(|user| user.extra.get("profile_pic").cloned());

	state.login(&LoginRequest::new("a", "p")).await.expect("Login should succeed.");
	state
		.upload_profile_image(UploadFile::new("me.png", b"png-bytes".to_vec()))
		.await
		.expect("Upload should succeed.");

	upload.assert_async().await;

	assert_eq!(picture(), Some(json!("pics/me.png")));

	state.delete_profile_image().await.expect("Removal should succeed.");

	removal.assert_async().await;

	assert_eq!(picture(), None);
}
