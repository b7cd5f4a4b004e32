//! Configuration model for the aigate proxy.
//!
//! The config file is YAML. Management endpoints mutate the in-memory value
//! and persist it back through [`save_config`], which writes atomically via
//! a temp file + rename so a crash never leaves a torn file behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("encode config: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Per-API-key restriction entry. Empty lists mean "unrestricted on that
/// axis"; `monthly_quotas` keys are glob patterns over model names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyLimit {
    #[serde(rename = "api-key")]
    pub api_key: String,
    #[serde(rename = "allowed-models", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_models: Vec<String>,
    #[serde(
        rename = "allowed-credentials",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_credentials: Vec<String>,
    #[serde(
        rename = "allowed-providers",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_providers: Vec<String>,
    // BTreeMap keeps quota patterns in lexicographic order, which pins the
    // first-match scan in the enforcer to a deterministic result.
    #[serde(
        rename = "monthly-quotas",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub monthly_quotas: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteManagement {
    #[serde(rename = "allow-remote", default)]
    pub allow_remote: bool,
    /// bcrypt hash of the management secret. Never plaintext.
    #[serde(rename = "secret-key", default, skip_serializing_if = "String::is_empty")]
    pub secret_key: String,
    #[serde(rename = "disable-control-panel", default)]
    pub disable_control_panel: bool,
}

/// Credential entry as stored on disk. `metadata` is provider-shaped; the
/// Copilot executor reads `github_token`, `copilot_token`, `copilot_api_base`,
/// `copilot_expire`, `sku` and `last_refresh` out of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub provider: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-model payload shaping applied by executors just before dispatch,
/// keyed by (model glob, upstream dialect).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadRule {
    #[serde(rename = "model")]
    pub model_pattern: String,
    #[serde(default = "default_payload_dialect")]
    pub dialect: String,
    /// Fields merged in only where the request left them unset.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub defaults: serde_json::Map<String, serde_json::Value>,
    /// Fields written unconditionally.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub overrides: serde_json::Map<String, serde_json::Value>,
}

fn default_payload_dialect() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(rename = "api-keys", default)]
    pub api_keys: Vec<String>,
    #[serde(rename = "proxy-url", default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(rename = "remote-management", default)]
    pub remote_management: RemoteManagement,
    #[serde(rename = "api-key-limits", default)]
    pub api_key_limits: Vec<ApiKeyLimit>,
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
    #[serde(rename = "payload-config", default)]
    pub payload_config: Vec<PayloadRule>,
    /// Directory holding usage-statistics.json. Defaults to the config
    /// file's directory when unset.
    #[serde(rename = "usage-statistics-dir", default, skip_serializing_if = "Option::is_none")]
    pub usage_statistics_dir: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8317
}

impl Config {
    /// Drops limit entries without an api_key and trims pattern whitespace
    /// so management writes can't persist unusable rows.
    pub fn sanitize_api_key_limits(&mut self) {
        self.api_key_limits.retain(|limit| !limit.api_key.trim().is_empty());
        for limit in &mut self.api_key_limits {
            limit.api_key = limit.api_key.trim().to_string();
            limit.allowed_models = trim_list(&limit.allowed_models);
            limit.allowed_credentials = trim_list(&limit.allowed_credentials);
            limit.allowed_providers = trim_list(&limit.allowed_providers);
            limit.monthly_quotas = limit
                .monthly_quotas
                .iter()
                .filter(|(pattern, _)| !pattern.trim().is_empty())
                .map(|(pattern, quota)| (pattern.trim().to_string(), *quota))
                .collect();
        }
    }
}

fn trim_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    config.sanitize_api_key_limits();
    Ok(config)
}

pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let encoded = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, encoded.as_bytes()).map_err(|source| ConfigError::Write {
        path: tmp.display().to_string(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        ConfigError::Write {
            path: path.display().to_string(),
            source,
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_empty_entries() {
        let mut config = Config {
            api_key_limits: vec![
                ApiKeyLimit {
                    api_key: "  k1  ".to_string(),
                    allowed_models: vec!["gpt-*".to_string(), "  ".to_string()],
                    ..Default::default()
                },
                ApiKeyLimit::default(),
            ],
            ..Default::default()
        };
        config.sanitize_api_key_limits();
        assert_eq!(config.api_key_limits.len(), 1);
        assert_eq!(config.api_key_limits[0].api_key, "k1");
        assert_eq!(config.api_key_limits[0].allowed_models, vec!["gpt-*"]);
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.api_keys.push("sk-test".to_string());
        config.api_key_limits.push(ApiKeyLimit {
            api_key: "sk-test".to_string(),
            monthly_quotas: [("gpt-*".to_string(), 10)].into_iter().collect(),
            ..Default::default()
        });
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_defaults_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api-keys:\n  - sk-a\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8317);
        assert!(config.api_key_limits.is_empty());
    }
}
