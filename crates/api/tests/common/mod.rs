//! Common test utilities for integration tests.
//!
//! The router runs over in-memory backends sharing a [`ManualClock`], so
//! presence can be driven by moving time instead of sleeping.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{TimeZone, Utc};
use domain::clock::{Clock, ManualClock};
use domain::models::{Role, SignUpRequest, UserAccount};
use domain::ports::Capabilities;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use serde_json::{json, Value};
use tower::ServiceExt;
use workforce_tracker_api::app::{create_app, AppState};
use workforce_tracker_api::config::Config;

pub const TEST_PASSWORD: &str = "secret-pass-1";

/// Router plus handles on everything behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let capabilities = Capabilities::in_memory(dyn_clock);
        let state = AppState::new(test_config(), capabilities, None);
        Self {
            router: create_app(state.clone()),
            state,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (axum::http::StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    /// Provisions an account directly through the auth service.
    pub async fn create_user(&self, role: Role) -> TestUser {
        let user = TestUser::new();
        let account = self
            .state
            .services
            .auth
            .sign_up(&SignUpRequest {
                email: user.email.clone(),
                password: user.password.clone(),
                display_name: user.display_name.clone(),
                role,
            })
            .await
            .unwrap();
        TestUser { account: Some(account), ..user }
    }

    /// Signs in and returns the bearer token.
    pub async fn login(&self, user: &TestUser) -> String {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/v1/auth/login",
                json!({ "email": user.email, "password": user.password }),
                None,
            ))
            .await;
        assert_eq!(status, axum::http::StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Creates an account of `role` and signs it in.
    pub async fn signed_in(&self, role: Role) -> (TestUser, String) {
        let user = self.create_user(role).await;
        let token = self.login(&user).await;
        (user, token)
    }

    /// Posts one location sample as the owner of `token`.
    pub async fn post_location(&self, token: &str, lat: f64, lng: f64) -> Value {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/v1/locations",
                json!({ "lat": lat, "lng": lng, "batteryLevel": 80, "speed": 1.5 }),
                Some(token),
            ))
            .await;
        assert_eq!(status, axum::http::StatusCode::CREATED, "ingest failed: {}", body);
        body
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_config() -> Config {
    Config::load_for_test(&[
        ("database.url", "postgres://unused@localhost/unused"),
        ("logging.format", "pretty"),
    ])
    .unwrap()
}

/// Test user data.
#[derive(Clone)]
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub account: Option<UserAccount>,
}

impl TestUser {
    pub fn new() -> Self {
        Self {
            email: SafeEmail().fake(),
            password: TEST_PASSWORD.to_string(),
            display_name: Name().fake(),
            account: None,
        }
    }

    pub fn uid(&self) -> uuid::Uuid {
        self.account.as_ref().map(|a| a.uid).unwrap()
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    empty_request(Method::GET, uri, token)
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}
