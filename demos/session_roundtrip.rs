//! Demonstrates a full session against a mock API with the default reqwest transport: login,
//! an expired business call that is renewed and replayed transparently, then logout.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use session_broker::{
	auth::LoginRequest,
	config::{ClientConfig, StorageMedium},
	http::ApiRequest,
	session::SessionState,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({
				"access_token": "demo-access-1",
				"refresh_token": "demo-refresh",
				"csrf_token": "demo-csrf",
			}));
		})
		.await;
	let profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/member/me").header("authorization", "Bearer demo-access-1");
			then.status(200).json_body(json!({
				"id": 1,
				"username": "demo",
				"email": "demo@example.com",
			}));
		})
		.await;
	// The first access token has expired by the time the reports are requested.
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer demo-access-1");
			then.status(401).json_body(json!({ "detail": "Token expired" }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.json_body(json!({ "refresh_token": "demo-refresh" }));
			then.status(200).json_body(json!({ "access_token": "demo-access-2" }));
		})
		.await;
	let reports_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(json!([{ "id": 7, "title": "Quarterly" }]));
		})
		.await;
	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/logout");
			then.status(200).json_body(json!({ "message": "Logged out" }));
		})
		.await;
	let config =
		ClientConfig::new(Url::parse(&server.base_url())?).with_medium(StorageMedium::Explicit);
	let state = SessionState::connect(config)?;
	let user = state.login(&LoginRequest::new("demo@example.com", "demo-password")).await?;

	println!("Logged in as {}.", user.display_name());

	let reports: Value = state.pipeline().send_json(ApiRequest::get("/reports")).await?;

	println!("Fetched reports after a transparent renewal: {reports}.");

	state.logout().await?;

	println!("Logged out; authenticated = {}.", state.is_authenticated());

	login_mock.assert_async().await;
	profile_mock.assert_async().await;
	stale_mock.assert_async().await;
	refresh_mock.assert_async().await;
	reports_mock.assert_async().await;
	logout_mock.assert_async().await;

	Ok(())
}
