//! Dialect endpoints and the dispatch into the provider executor.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::{Extension, Path, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use aigate_config::Config;
use aigate_limits::Enforcer;
use aigate_provider::{
    Credential, CredentialStore, ExecuteError, ExecuteOptions, ExecuteRequest, ProviderRegistry,
};
use aigate_translator::Dialect;
use aigate_usage::RequestStatistics;

use crate::context::RequestContext;
use crate::middleware::{error_response, proxy_auth};

pub const DEFAULT_PROVIDER: &str = "copilot";

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ArcSwap<Config>>,
    pub providers: Arc<ProviderRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub enforcer: Arc<Enforcer>,
    pub stats: Arc<RequestStatistics>,
}

pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(openai_chat_completions))
        .route("/v1/completions", post(openai_completions))
        .route("/v1/embeddings", post(openai_embeddings))
        .route("/v1/responses", post(openai_responses))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1beta/models/{*action}", post(gemini_generate))
        .layer(middleware::from_fn_with_state(state.clone(), proxy_auth))
        .with_state(state)
}

async fn openai_chat_completions(
    State(state): State<ProxyState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    dispatch(state, context, Dialect::OpenAI, None).await
}

async fn openai_completions(
    State(state): State<ProxyState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    dispatch(state, context, Dialect::OpenAI, None).await
}

async fn openai_embeddings(
    State(state): State<ProxyState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    dispatch(state, context, Dialect::OpenAI, None).await
}

async fn openai_responses(
    State(state): State<ProxyState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    dispatch(state, context, Dialect::OpenAIResponses, None).await
}

async fn anthropic_messages(
    State(state): State<ProxyState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    dispatch(state, context, Dialect::Anthropic, None).await
}

/// Gemini routes carry the model and the action in the path:
/// `/v1beta/models/<model>:generateContent` or `:streamGenerateContent`.
async fn gemini_generate(
    State(state): State<ProxyState>,
    Path(action): Path<String>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    let Some((model, action)) = action.rsplit_once(':') else {
        return error_response(StatusCode::NOT_FOUND, "unknown gemini action");
    };
    let stream = match action {
        "generateContent" => Some(false),
        "streamGenerateContent" => Some(true),
        _ => None,
    };
    let Some(stream) = stream else {
        return error_response(StatusCode::NOT_FOUND, "unknown gemini action");
    };
    let mut context = context;
    context.requested_model = Some(model.to_string());
    dispatch(state, context, Dialect::Gemini, Some(stream)).await
}

/// Routes one authenticated request to an eligible provider/credential pair
/// and relays the (possibly streamed) reply.
async fn dispatch(
    state: ProxyState,
    context: RequestContext,
    dialect: Dialect,
    forced_stream: Option<bool>,
) -> Response {
    let payload: Value = match serde_json::from_slice(&context.original_body) {
        Ok(payload) => payload,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "request body is not JSON"),
    };

    let Some(model) = context
        .requested_model
        .clone()
        .or_else(|| payload.get("model").and_then(Value::as_str).map(str::to_string))
    else {
        return error_response(StatusCode::BAD_REQUEST, "missing model");
    };

    let stream = forced_stream
        .unwrap_or_else(|| payload.get("stream").and_then(Value::as_bool).unwrap_or(false));

    let Some(provider_name) = select_provider(&state, context.allowed_providers.as_deref())
    else {
        return error_response(StatusCode::FORBIDDEN, "no allowed provider for this API key");
    };
    let Some(provider) = state.providers.get(&provider_name) else {
        return error_response(StatusCode::NOT_FOUND, "no such provider");
    };
    let Some(credential) =
        state
            .credentials
            .acquire(&provider_name, context.allowed_credentials.as_deref())
    else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no eligible credential for provider",
        );
    };

    let request = ExecuteRequest {
        model,
        payload: payload.clone(),
        metadata: Map::new(),
    };
    let opts = ExecuteOptions {
        source_dialect: dialect,
        original_request: payload,
        metadata: Map::new(),
        api_key: context.api_key.clone(),
        trace_id: context.trace_id.clone(),
    };

    if stream {
        stream_response(provider, credential, request, opts).await
    } else {
        unary_response(provider, credential, request, opts).await
    }
}

/// Picks the first allowed provider that is actually registered. A key
/// restricted to providers this process does not run gets nothing.
fn select_provider(state: &ProxyState, allowed: Option<&[String]>) -> Option<String> {
    match allowed {
        Some(allowed) => allowed
            .iter()
            .find(|name| state.providers.get(name).is_some())
            .cloned(),
        None => Some(DEFAULT_PROVIDER.to_string()),
    }
}

async fn unary_response(
    provider: Arc<dyn aigate_provider::Provider>,
    credential: Arc<Credential>,
    request: ExecuteRequest,
    opts: ExecuteOptions,
) -> Response {
    match provider.execute(credential, request, opts).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => execute_error_response(err),
    }
}

async fn stream_response(
    provider: Arc<dyn aigate_provider::Provider>,
    credential: Arc<Credential>,
    request: ExecuteRequest,
    opts: ExecuteOptions,
) -> Response {
    let rx = match provider.execute_stream(credential, request, opts).await {
        Ok(rx) => rx,
        Err(err) => return execute_error_response(err),
    };

    let body = Body::from_stream(ReceiverStream::new(rx).map(|chunk| match chunk {
        Ok(frame) => Ok::<Bytes, std::convert::Infallible>(frame),
        Err(err) => {
            // Headers are gone already; the best we can do is a terminal
            // error frame before the stream closes.
            warn!(event = "proxy.stream_error", error = %err);
            let frame = format!(
                "data: {}\n\n",
                serde_json::json!({"error": {"message": err.to_string()}})
            );
            Ok(Bytes::from(frame))
        }
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn execute_error_response(err: ExecuteError) -> Response {
    match err {
        ExecuteError::UpstreamStatus { code, body } => {
            let status =
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
        ExecuteError::ThinkingConfigInvalid(message) => {
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        ExecuteError::CredentialRefreshFailed(message) => {
            error_response(StatusCode::BAD_GATEWAY, &message)
        }
        ExecuteError::MissingCredentialField(field) => error_response(
            StatusCode::BAD_GATEWAY,
            &format!("credential is missing {field}"),
        ),
        ExecuteError::Transport(message) => error_response(StatusCode::BAD_GATEWAY, &message),
    }
}
