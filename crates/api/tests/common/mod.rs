//! Shared helpers for API integration tests.
//!
//! The app is built with the in-memory store and a scripted similarity
//! oracle, so these tests need no database or network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use fieldwatch_api::auth::jwt::{generate_access_token, JwtConfig};
use fieldwatch_api::config::{LogFormat, ServerConfig};
use fieldwatch_api::router::build_app_router;
use fieldwatch_api::state::AppState;
use fieldwatch_core::incident::Incident;
use fieldwatch_core::merge::DuplicateCandidate;
use fieldwatch_core::oracle::{OracleError, SimilarityOracle};
use fieldwatch_core::roles::Role;
use fieldwatch_core::store::memory::InMemoryIncidentStore;
use fieldwatch_core::types::DbId;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

const TEST_SECRET: &str = "integration-test-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: jwt_config(),
        database_url: None,
        database_max_connections: 1,
        similarity_oracle_url: None,
        similarity_oracle_timeout_secs: 5,
        log_format: LogFormat::Text,
    }
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: TEST_SECRET.to_string(),
        access_token_expiry_mins: 15,
    }
}

/// Oracle whose answers are set per source incident by the test.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<HashMap<DbId, Result<Vec<DuplicateCandidate>, u16>>>,
}

impl ScriptedOracle {
    pub fn answer(&self, source: DbId, candidates: Vec<DuplicateCandidate>) {
        self.answers.lock().unwrap().insert(source, Ok(candidates));
    }

    /// Make calls for `source` fail with the given HTTP status.
    pub fn fail(&self, source: DbId, status: u16) {
        self.answers.lock().unwrap().insert(source, Err(status));
    }
}

#[async_trait]
impl SimilarityOracle for ScriptedOracle {
    async fn find_duplicates(
        &self,
        incident: &Incident,
    ) -> Result<Vec<DuplicateCandidate>, OracleError> {
        match self.answers.lock().unwrap().get(&incident.id) {
            Some(Ok(candidates)) => Ok(candidates.clone()),
            Some(Err(status)) => Err(OracleError::HttpStatus(*status)),
            None => Ok(Vec::new()),
        }
    }
}

/// A test application plus the oracle it talks to.
pub struct TestApp {
    pub router: Router,
    pub oracle: Arc<ScriptedOracle>,
}

/// Build the full application router with all middleware layers.
pub fn build_test_app() -> TestApp {
    let oracle = Arc::new(ScriptedOracle::default());
    let state = AppState::new(
        test_config(),
        Arc::new(InMemoryIncidentStore::new()),
        oracle.clone(),
    );
    TestApp {
        router: build_app_router(state),
        oracle,
    }
}

/// Bearer token for a user with the given role.
pub fn token(user_id: DbId, role: Role) -> String {
    let name = format!("{role}-{user_id}");
    generate_access_token(user_id, &name, role, &jwt_config()).unwrap()
}

pub fn admin() -> String {
    token(1, Role::Admin)
}

pub fn manager() -> String {
    token(2, Role::Manager)
}

pub fn technician() -> String {
    token(3, Role::Technician)
}

pub fn citizen() -> String {
    token(4, Role::Citizen)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and error code of an error response.
pub async fn assert_error(response: Response<Body>, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code, "unexpected error body: {json}");
}

/// Report an incident as a citizen and return its id.
pub async fn report_incident(app: &Router, title: &str) -> DbId {
    let response = post_json(
        app,
        "/api/v1/incidents",
        &citizen(),
        serde_json::json!({
            "title": title,
            "description": "Reported from the mobile app",
            "severity": "medium",
            "asset_id": 12,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}
