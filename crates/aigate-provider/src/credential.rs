//! Provider credentials.
//!
//! A credential is owned by the store and loaned to an executor for a
//! single request. Metadata is only written by the executor's refresh path,
//! which serializes on the per-credential refresh lock and swaps a fully
//! built map so readers never observe a partial refresh.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use aigate_config::CredentialConfig;

#[derive(Debug)]
pub struct Credential {
    pub id: String,
    pub label: String,
    pub provider: String,
    metadata: RwLock<Map<String, Value>>,
    refresh_lock: Mutex<()>,
}

impl Credential {
    pub fn new(id: String, label: String, provider: String, metadata: Map<String, Value>) -> Self {
        Self {
            id,
            label,
            provider,
            metadata: RwLock::new(metadata),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(
            config.id.clone(),
            config.label.clone(),
            config.provider.clone(),
            config.metadata.clone(),
        )
    }

    pub async fn metadata(&self) -> Map<String, Value> {
        self.metadata.read().await.clone()
    }

    pub async fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .read()
            .await
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Replaces the whole metadata map. Callers build the replacement
    /// completely before storing so a cancelled refresh leaves the old map
    /// intact.
    pub async fn store_metadata(&self, metadata: Map<String, Value>) {
        *self.metadata.write().await = metadata;
    }

    /// Serializes refresh attempts for this credential.
    pub async fn refresh_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}

/// In-memory credential registry keyed by id, with a per-provider index.
#[derive(Debug, Default)]
pub struct CredentialStore {
    by_id: HashMap<String, Arc<Credential>>,
    by_provider: HashMap<String, Vec<String>>,
}

impl CredentialStore {
    pub fn from_configs(configs: &[CredentialConfig]) -> Self {
        let mut store = Self::default();
        for config in configs {
            store.insert(Arc::new(Credential::from_config(config)));
        }
        store
    }

    pub fn insert(&mut self, credential: Arc<Credential>) {
        self.by_provider
            .entry(credential.provider.clone())
            .or_default()
            .push(credential.id.clone());
        self.by_id.insert(credential.id.clone(), credential);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Credential>> {
        self.by_id.get(id).cloned()
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Credential>> {
        let removed = self.by_id.remove(id)?;
        if let Some(ids) = self.by_provider.get_mut(&removed.provider) {
            ids.retain(|existing| existing != id);
        }
        Some(removed)
    }

    /// First credential for `provider` whose id passes the allow-list.
    /// `allowed = None` means the caller is unrestricted.
    pub fn acquire(
        &self,
        provider: &str,
        allowed: Option<&[String]>,
    ) -> Option<Arc<Credential>> {
        let ids = self.by_provider.get(provider)?;
        ids.iter()
            .filter(|id| match allowed {
                Some(allowed) => allowed.iter().any(|candidate| candidate == *id),
                None => true,
            })
            .find_map(|id| self.by_id.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credential(id: &str, provider: &str) -> Arc<Credential> {
        Arc::new(Credential::new(
            id.to_string(),
            String::new(),
            provider.to_string(),
            Map::new(),
        ))
    }

    #[test]
    fn acquire_honors_the_allow_list() {
        let mut store = CredentialStore::default();
        store.insert(credential("cred-1", "copilot"));
        store.insert(credential("cred-2", "copilot"));

        let any = store.acquire("copilot", None).unwrap();
        assert_eq!(any.id, "cred-1");

        let allowed = vec!["cred-2".to_string()];
        let filtered = store.acquire("copilot", Some(&allowed)).unwrap();
        assert_eq!(filtered.id, "cred-2");

        let none = store.acquire("copilot", Some(&vec!["cred-9".to_string()]));
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn store_metadata_replaces_the_whole_map() {
        let cred = credential("cred-1", "copilot");
        let mut next = Map::new();
        next.insert("copilot_token".to_string(), json!("t"));
        cred.store_metadata(next).await;
        assert_eq!(cred.metadata_str("copilot_token").await.as_deref(), Some("t"));
        assert!(cred.metadata_str("github_token").await.is_none());
    }
}
