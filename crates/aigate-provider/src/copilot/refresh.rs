//! Copilot token exchange. The short-lived `copilot_token` derives from the
//! long-lived `github_token`; metadata is only replaced after a successful
//! exchange, under the credential's refresh lock.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::client::shared_client;
use crate::credential::Credential;
use crate::errors::ExecuteError;

pub const DEFAULT_API_BASE: &str = "https://api.individual.githubcopilot.com";
const TOKEN_EXCHANGE_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const REFRESH_MARGIN: Duration = Duration::minutes(5);

/// Returns (copilot_token, api_base), refreshing first when the stored
/// token is missing, unparseable or within five minutes of expiry.
pub(super) async fn ensure_token(
    credential: &Credential,
    proxy: Option<&str>,
) -> Result<(String, String), ExecuteError> {
    let metadata = credential.metadata().await;
    if let Some(token) = fresh_token(&metadata, OffsetDateTime::now_utc()) {
        return Ok((token, api_base(&metadata)));
    }

    let _guard = credential.refresh_guard().await;
    // Another request may have refreshed while we waited for the lock.
    let metadata = credential.metadata().await;
    if let Some(token) = fresh_token(&metadata, OffsetDateTime::now_utc()) {
        return Ok((token, api_base(&metadata)));
    }

    let refreshed = exchange(credential, &metadata, proxy).await?;
    let token = refreshed
        .get("copilot_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ExecuteError::CredentialRefreshFailed("exchange response missing token".to_string())
        })?;
    let base = api_base(&refreshed);
    credential.store_metadata(refreshed).await;
    Ok((token, base))
}

/// Unconditional refresh, used by the management-facing refresh operation.
pub(super) async fn force_refresh(
    credential: &Credential,
    proxy: Option<&str>,
) -> Result<(), ExecuteError> {
    let _guard = credential.refresh_guard().await;
    let metadata = credential.metadata().await;
    let refreshed = exchange(credential, &metadata, proxy).await?;
    credential.store_metadata(refreshed).await;
    Ok(())
}

/// Exchanges the github token. Returns the complete replacement metadata
/// map; the caller stores it only on success so cancellation or failure
/// never leaves a partial refresh behind.
async fn exchange(
    credential: &Credential,
    metadata: &Map<String, Value>,
    proxy: Option<&str>,
) -> Result<Map<String, Value>, ExecuteError> {
    let github_token = metadata
        .get("github_token")
        .and_then(Value::as_str)
        .filter(|token| !token.trim().is_empty())
        .ok_or(ExecuteError::MissingCredentialField("github_token"))?;

    let client = shared_client(proxy)?;
    let response = client
        .get(TOKEN_EXCHANGE_URL)
        .header(http::header::AUTHORIZATION, format!("token {github_token}"))
        .header(http::header::ACCEPT, "application/json")
        .header(http::header::USER_AGENT, "GitHubCopilotChat/1.0")
        .send()
        .await
        .map_err(|err| ExecuteError::CredentialRefreshFailed(err.to_string()))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| ExecuteError::CredentialRefreshFailed(err.to_string()))?;
    if !status.is_success() {
        return Err(ExecuteError::CredentialRefreshFailed(format!(
            "exchange returned status {}",
            status.as_u16()
        )));
    }

    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|err| ExecuteError::CredentialRefreshFailed(err.to_string()))?;
    let token = parsed
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExecuteError::CredentialRefreshFailed("exchange response missing token".to_string())
        })?;

    let mut refreshed = metadata.clone();
    refreshed.insert("copilot_token".to_string(), Value::String(token.to_string()));
    if let Some(expires_at) = parsed.get("expires_at").and_then(Value::as_i64) {
        if let Some(stamp) = unix_to_rfc3339(expires_at) {
            refreshed.insert("copilot_expire".to_string(), Value::String(stamp));
        }
    }
    if let Some(base) = parsed
        .get("endpoints")
        .and_then(|endpoints| endpoints.get("api"))
        .and_then(Value::as_str)
    {
        refreshed.insert(
            "copilot_api_base".to_string(),
            Value::String(base.to_string()),
        );
    }
    if let Some(sku) = parsed.get("sku").and_then(Value::as_str).filter(|sku| !sku.is_empty()) {
        refreshed.insert("sku".to_string(), Value::String(sku.to_string()));
    }
    if let Some(now) = unix_to_rfc3339(OffsetDateTime::now_utc().unix_timestamp()) {
        refreshed.insert("last_refresh".to_string(), Value::String(now));
    }

    info!(
        event = "copilot.refresh",
        credential = %credential.id,
        expire = refreshed.get("copilot_expire").and_then(serde_json::Value::as_str).unwrap_or(""),
        sku = refreshed.get("sku").and_then(serde_json::Value::as_str).unwrap_or(""),
    );
    Ok(refreshed)
}

/// The stored token when it is still usable: present, and either carrying
/// no expiry or one that is at least five minutes away.
pub(super) fn fresh_token(metadata: &Map<String, Value>, now: OffsetDateTime) -> Option<String> {
    let token = metadata
        .get("copilot_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())?;
    if let Some(expire) = metadata
        .get("copilot_expire")
        .and_then(Value::as_str)
        .filter(|expire| !expire.is_empty())
    {
        let parsed = OffsetDateTime::parse(expire, &Rfc3339).ok()?;
        if parsed - now < REFRESH_MARGIN {
            return None;
        }
    }
    Some(token.to_string())
}

pub(super) fn api_base(metadata: &Map<String, Value>) -> String {
    metadata
        .get("copilot_api_base")
        .and_then(Value::as_str)
        .filter(|base| !base.is_empty())
        .unwrap_or(DEFAULT_API_BASE)
        .trim_end_matches('/')
        .to_string()
}

fn unix_to_rfc3339(seconds: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata_with_expiry(offset: Duration) -> Map<String, Value> {
        let expire = (OffsetDateTime::now_utc() + offset)
            .format(&Rfc3339)
            .unwrap();
        let mut metadata = Map::new();
        metadata.insert("copilot_token".to_string(), json!("tok"));
        metadata.insert("copilot_expire".to_string(), json!(expire));
        metadata
    }

    #[test]
    fn token_within_five_minutes_of_expiry_needs_refresh() {
        let now = OffsetDateTime::now_utc();
        let near = metadata_with_expiry(Duration::minutes(4) + Duration::seconds(59));
        assert!(fresh_token(&near, now).is_none());

        let far = metadata_with_expiry(Duration::minutes(5) + Duration::seconds(1));
        assert_eq!(fresh_token(&far, now).as_deref(), Some("tok"));
    }

    #[test]
    fn unparseable_expiry_forces_refresh() {
        let mut metadata = Map::new();
        metadata.insert("copilot_token".to_string(), json!("tok"));
        metadata.insert("copilot_expire".to_string(), json!("not-a-date"));
        assert!(fresh_token(&metadata, OffsetDateTime::now_utc()).is_none());
    }

    #[test]
    fn missing_token_is_never_fresh() {
        assert!(fresh_token(&Map::new(), OffsetDateTime::now_utc()).is_none());
    }

    #[tokio::test]
    async fn failed_refresh_leaves_metadata_untouched() {
        // No github_token: the exchange fails before any network call and
        // the stored metadata must be exactly what it was.
        let mut metadata = Map::new();
        metadata.insert("copilot_token".to_string(), json!("stale"));
        metadata.insert("copilot_expire".to_string(), json!("not-a-date"));
        let credential = crate::credential::Credential::new(
            "cred-1".to_string(),
            String::new(),
            "copilot".to_string(),
            metadata.clone(),
        );

        let err = ensure_token(&credential, None).await.unwrap_err();
        assert!(matches!(
            err,
            crate::errors::ExecuteError::MissingCredentialField("github_token")
        ));
        assert_eq!(credential.metadata().await, metadata);
    }

    #[test]
    fn api_base_defaults_and_trims() {
        let mut metadata = Map::new();
        assert_eq!(api_base(&metadata), DEFAULT_API_BASE);
        metadata.insert(
            "copilot_api_base".to_string(),
            json!("https://api.example.com/"),
        );
        assert_eq!(api_base(&metadata), "https://api.example.com");
    }
}
