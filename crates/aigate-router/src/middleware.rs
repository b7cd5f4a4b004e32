//! Middleware chain: bearer-key auth, model-prefix stripping and limit
//! enforcement. Each stage buffers or reuses the request body through the
//! [`RequestContext`] extension so the handlers read it exactly once.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};
use std::net::SocketAddr;
use time::OffsetDateTime;

use aigate_limits::AccessDenied;

use crate::context::RequestContext;
use crate::proxy::ProxyState;

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Extracts and validates the caller's API key, buffers the body, strips
/// the model prefix on the gated paths and runs the enforcer. Produces the
/// [`RequestContext`] extension handlers rely on.
pub async fn proxy_auth(
    State(state): State<ProxyState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let trace_id = uuid::Uuid::now_v7().to_string();
    let client_ip = client_ip(&request);

    let Some(api_key) = extract_api_key(request.headers()) else {
        return Err(error_response(StatusCode::UNAUTHORIZED, "missing api key"));
    };
    let config = state.config.load();
    if !config.api_keys.iter().any(|known| known == &api_key) {
        return Err(error_response(StatusCode::UNAUTHORIZED, "invalid api key"));
    }

    let path = request.uri().path().to_string();
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "unreadable request body"))?;

    let bytes = strip_model_prefix(&path, bytes);
    let requested_model = extract_model(&bytes).or_else(|| model_from_path(&path));

    if let Some(model) = requested_model.as_deref() {
        if let Err(denied) =
            state
                .enforcer
                .check_access(&api_key, model, OffsetDateTime::now_utc())
        {
            return Err(denied_response(denied));
        }
    }

    let context = RequestContext {
        allowed_credentials: state.enforcer.allowed_credentials(&api_key),
        allowed_providers: state.enforcer.allowed_providers(&api_key),
        api_key,
        client_ip,
        trace_id,
        original_body: bytes.clone(),
        requested_model,
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
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

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|value| value.to_str().ok()) {
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    let auth = headers
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Removes everything up to and including the first `/` in the body's
/// `model` field. Runs only for the completion-style path suffixes.
pub fn strip_model_prefix(path: &str, body: Bytes) -> Bytes {
    let gated = path.ends_with("/chat/completions")
        || path.ends_with("/completions")
        || path.ends_with("/embeddings");
    if !gated {
        return body;
    }
    let Ok(mut parsed) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    let Some(model) = parsed.get("model").and_then(Value::as_str) else {
        return body;
    };
    let Some(slash) = model.find('/') else {
        return body;
    };
    if slash == 0 {
        return body;
    }
    let stripped = model[slash + 1..].to_string();
    parsed["model"] = Value::String(stripped);
    match serde_json::to_vec(&parsed) {
        Ok(rewritten) => Bytes::from(rewritten),
        Err(_) => body,
    }
}

/// Gemini carries the model in the path instead of the body:
/// `/v1beta/models/<model>:generateContent`.
fn model_from_path(path: &str) -> Option<String> {
    let rest = path.split("/models/").nth(1)?;
    let model = rest.rsplit_once(':').map(|(model, _)| model).unwrap_or(rest);
    if model.is_empty() {
        return None;
    }
    Some(model.to_string())
}

fn extract_model(body: &Bytes) -> Option<String> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    parsed
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn denied_response(denied: AccessDenied) -> Response {
    error_response(StatusCode::FORBIDDEN, &denied.to_string())
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}
