//! Shared proxy-aware HTTP clients, cached per outbound proxy URL.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::errors::ExecuteError;

static CLIENT_CACHE: OnceLock<Mutex<HashMap<Option<String>, wreq::Client>>> = OnceLock::new();

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub fn shared_client(proxy: Option<&str>) -> Result<wreq::Client, ExecuteError> {
    let key = normalize_proxy(proxy);
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache
        .lock()
        .map_err(|_| ExecuteError::Transport("http client cache lock failed".to_string()))?;
    if let Some(client) = guard.get(&key) {
        return Ok(client.clone());
    }
    let client = build_client(key.as_deref())?;
    guard.insert(key, client.clone());
    Ok(client)
}

fn build_client(proxy: Option<&str>) -> Result<wreq::Client, ExecuteError> {
    let mut builder = wreq::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(STREAM_IDLE_TIMEOUT);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(
            wreq::Proxy::all(proxy_url)
                .map_err(|err| ExecuteError::Transport(err.to_string()))?,
        );
    }
    builder
        .build()
        .map_err(|err| ExecuteError::Transport(err.to_string()))
}

fn normalize_proxy(value: Option<&str>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}
