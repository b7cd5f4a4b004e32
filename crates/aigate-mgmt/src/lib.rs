//! Management API: live api-key-limit configuration and console sessions.
//!
//! Every mutating endpoint persists the config back to disk and reloads the
//! enforcer, so changes take effect immediately and survive restarts.

pub mod assets;
pub mod attempts;
pub mod jwt;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use aigate_config::{save_config, ApiKeyLimit, Config};
use aigate_limits::Enforcer;

use crate::attempts::FailedAttempts;

#[derive(Clone)]
pub struct MgmtState {
    pub config: Arc<ArcSwap<Config>>,
    pub config_path: PathBuf,
    pub enforcer: Arc<Enforcer>,
    pub attempts: Arc<FailedAttempts>,
    pub jwt_key: Arc<Vec<u8>>,
    pub env_secret: Option<String>,
}

impl MgmtState {
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        config_path: PathBuf,
        enforcer: Arc<Enforcer>,
    ) -> Self {
        let env_secret = std::env::var("MANAGEMENT_PASSWORD")
            .ok()
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty());
        Self {
            config,
            config_path,
            enforcer,
            attempts: Arc::new(FailedAttempts::new()),
            jwt_key: Arc::new(jwt::generate_signing_key()),
            env_secret,
        }
    }

    fn allow_remote(&self) -> bool {
        self.env_secret.is_some() || self.config.load().remote_management.allow_remote
    }

    /// Env secret first, bcrypt hash second. Anything over 72 bytes is
    /// rejected outright rather than silently truncated by bcrypt.
    fn validate_password(&self, provided: &str) -> bool {
        let provided = provided.trim();
        if provided.is_empty() || provided.len() > 72 {
            return false;
        }
        if let Some(secret) = &self.env_secret {
            if constant_time_eq(provided.as_bytes(), secret.as_bytes()) {
                return true;
            }
        }
        let hash = self.config.load().remote_management.secret_key.clone();
        if !hash.is_empty() {
            return bcrypt::verify(provided, &hash).unwrap_or(false);
        }
        false
    }
}

pub fn management_router(state: MgmtState) -> Router {
    let guarded = Router::new()
        .route(
            "/api/api-key-limits",
            get(get_api_key_limits).put(put_api_key_limits),
        )
        .route(
            "/api/api-key-limit",
            axum::routing::patch(patch_api_key_limit).delete(delete_api_key_limit),
        )
        .layer(middleware::from_fn_with_state(state.clone(), mgmt_auth));

    Router::new()
        .merge(guarded)
        .route("/api/login", post(login))
        .route("/", get(console_index))
        .with_state(state)
}

fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
    {
        let forwarded = forwarded.trim();
        if !forwarded.is_empty() {
            return forwarded.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_local(ip: &str) -> bool {
    ip == "127.0.0.1" || ip == "::1"
}

async fn mgmt_auth(
    State(state): State<MgmtState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);
    let local = is_local(&ip);
    let now = OffsetDateTime::now_utc();

    if !local {
        if let Some(remaining) = state.attempts.ban_remaining(&ip, now) {
            return Err(banned_response(remaining));
        }
        if !state.allow_remote() {
            return Err(error(StatusCode::FORBIDDEN, "remote management disabled"));
        }
    }

    if state.env_secret.is_none() && state.config.load().remote_management.secret_key.is_empty() {
        return Err(error(StatusCode::FORBIDDEN, "management key not set"));
    }

    let Some(provided) = extract_key(request.headers()) else {
        if !local {
            state.attempts.record_failure(&ip, now);
        }
        return Err(error(StatusCode::UNAUTHORIZED, "missing management key"));
    };

    // A value with two dots is tried as a session token first, then falls
    // back to password validation.
    if provided.matches('.').count() == 2
        && jwt::verify(&provided, &state.jwt_key, &ip).is_ok()
    {
        if !local {
            state.attempts.clear(&ip);
        }
        return Ok(next.run(request).await);
    }

    if state.validate_password(&provided) {
        if !local {
            state.attempts.clear(&ip);
        }
        return Ok(next.run(request).await);
    }

    if !local {
        state.attempts.record_failure(&ip, now);
    }
    Err(error(StatusCode::UNAUTHORIZED, "invalid management key"))
}

fn extract_key(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        let auth = auth.trim();
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .unwrap_or(auth);
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    headers
        .get("x-management-key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn get_api_key_limits(State(state): State<MgmtState>) -> Response {
    let limits = state.config.load().api_key_limits.clone();
    Json(json!({"api_key_limits": limits})).into_response()
}

#[derive(Debug, Deserialize)]
struct PutLimitsBody {
    #[serde(rename = "api_key_limits")]
    api_key_limits: Vec<ApiKeyLimit>,
}

async fn put_api_key_limits(
    State(state): State<MgmtState>,
    Json(body): Json<PutLimitsBody>,
) -> Response {
    let mut config = (**state.config.load()).clone();
    config.api_key_limits = body.api_key_limits;
    persist(&state, config)
}

async fn patch_api_key_limit(
    State(state): State<MgmtState>,
    Json(entry): Json<ApiKeyLimit>,
) -> Response {
    if entry.api_key.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "api_key field is required");
    }
    let mut config = (**state.config.load()).clone();
    match config
        .api_key_limits
        .iter_mut()
        .find(|existing| existing.api_key == entry.api_key)
    {
        Some(existing) => *existing = entry,
        None => config.api_key_limits.push(entry),
    }
    persist(&state, config)
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    api_key: String,
}

async fn delete_api_key_limit(
    State(state): State<MgmtState>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    if query.api_key.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "api_key query parameter is required");
    }
    let mut config = (**state.config.load()).clone();
    let before = config.api_key_limits.len();
    config
        .api_key_limits
        .retain(|limit| limit.api_key != query.api_key);
    if config.api_key_limits.len() == before {
        return error(StatusCode::NOT_FOUND, "API key limit not found");
    }
    persist(&state, config)
}

/// Writes the config, swaps the in-memory snapshot and reloads the
/// enforcer so the new limits apply to in-flight traffic.
fn persist(state: &MgmtState, mut config: Config) -> Response {
    config.sanitize_api_key_limits();
    if let Err(err) = save_config(&state.config_path, &config) {
        warn!(event = "mgmt.persist_failed", error = %err);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save config");
    }
    state.enforcer.reload(config.api_key_limits.clone());
    let limits = config.api_key_limits.clone();
    state.config.store(Arc::new(config));
    info!(event = "mgmt.limits_updated", entries = limits.len());
    Json(json!({"api_key_limits": limits})).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    password: String,
}

async fn login(State(state): State<MgmtState>, request: Request<Body>) -> Response {
    let ip = client_ip(&request);
    let local = is_local(&ip);
    let now = OffsetDateTime::now_utc();

    if !local {
        if let Some(remaining) = state.attempts.ban_remaining(&ip, now) {
            return banned_response(remaining);
        }
        if !state.allow_remote() {
            return error(StatusCode::FORBIDDEN, "remote management disabled");
        }
    }
    if state.env_secret.is_none() && state.config.load().remote_management.secret_key.is_empty() {
        return error(StatusCode::FORBIDDEN, "management key not set");
    }

    let bytes = match axum::body::to_bytes(request.into_body(), 64 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return error(StatusCode::BAD_REQUEST, "invalid request body"),
    };
    let Ok(body) = serde_json::from_slice::<LoginBody>(&bytes) else {
        return error(StatusCode::BAD_REQUEST, "invalid request body");
    };

    let password = body.password.trim();
    if password.is_empty() || password.len() > 72 || !state.validate_password(password) {
        if !local {
            state.attempts.record_failure(&ip, now);
        }
        return error(StatusCode::UNAUTHORIZED, "invalid management key");
    }
    if !local {
        state.attempts.clear(&ip);
    }

    match jwt::issue(&state.jwt_key, &ip, now) {
        Some((token, claims)) => {
            Json(json!({"token": token, "expires_at": claims.exp})).into_response()
        }
        None => error(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate token"),
    }
}

async fn console_index(State(state): State<MgmtState>) -> Response {
    if state.config.load().remote_management.disable_control_panel {
        return error(StatusCode::NOT_FOUND, "control panel disabled");
    }
    let path = assets::asset_path(&state.config_path);
    match tokio::fs::read(&path).await {
        Ok(html) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            html,
        )
            .into_response(),
        Err(_) => error(StatusCode::NOT_FOUND, "management console not installed"),
    }
}

fn banned_response(remaining: time::Duration) -> Response {
    let seconds = remaining.whole_seconds().max(0);
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "IP banned due to too many failed attempts",
            "remaining": seconds,
        })),
    )
        .into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_exactly() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secre7"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }

    #[test]
    fn passwords_over_72_bytes_are_rejected() {
        let config = Arc::new(ArcSwap::from_pointee(Config::default()));
        let enforcer = Arc::new(Enforcer::new(
            Vec::new(),
            Arc::new(aigate_usage::RequestStatistics::new()),
        ));
        let mut state = MgmtState::new(config, PathBuf::from("/tmp/config.yaml"), enforcer);
        state.env_secret = Some("a".repeat(80));

        assert!(!state.validate_password(&"a".repeat(80)));
        state.env_secret = Some("short-secret".to_string());
        assert!(state.validate_password("short-secret"));
        assert!(!state.validate_password(""));
    }
}
