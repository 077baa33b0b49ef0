//! Helpers shared by the router and middleware tests

use std::sync::Arc;

use acerto_billing::InMemoryBillingStore;
use acerto_shared::{BusinessTimezone, FixedClock};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::{AppMetadata, Claims, PLATFORM_ADMIN_ROLE, SUPABASE_AUDIENCE},
    config::Config,
    state::AppState,
};

pub const TEST_JWT_SECRET: &str = "test-secret-with-enough-entropy-for-hs256";

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        business_timezone: BusinessTimezone::default(),
        supabase_jwt_secret: TEST_JWT_SECRET.to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        database_max_connections: 1,
    }
}

/// In-memory state with the clock pinned to local noon on `today`
pub fn test_state(today: NaiveDate) -> (AppState, FixedClock) {
    let config = test_config();
    let clock = FixedClock::at_local_noon(&config.business_timezone, today);
    let state = AppState::with_store(
        config,
        Arc::new(InMemoryBillingStore::default()),
        Arc::new(clock.clone()),
    );
    (state, clock)
}

pub fn bearer(state: &AppState, user_id: Uuid, admin: bool) -> String {
    let claims = Claims {
        sub: user_id,
        aud: SUPABASE_AUDIENCE.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp(),
        email: Some("dono@example.com".to_string()),
        role: Some("authenticated".to_string()),
        app_metadata: AppMetadata {
            role: admin.then(|| PLATFORM_ADMIN_ROLE.to_string()),
        },
    };
    let token = state.jwt_manager.issue(&claims).expect("token should sign");
    format!("Bearer {}", token)
}

pub fn request(method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
