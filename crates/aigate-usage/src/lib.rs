//! Per-key request accounting.
//!
//! Counters are keyed `api_key -> model -> month (YYYY-MM)` and only ever
//! grow. The whole table snapshots to JSON so restarts keep the month's
//! tally; the snapshot shape is `{api_key: {model: {"YYYY-MM": count}}}`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage store read: {0}")]
    Read(#[source] io::Error),
    #[error("usage store write: {0}")]
    Write(#[source] io::Error),
    #[error("usage snapshot decode: {0}")]
    Decode(#[from] serde_json::Error),
}

type UsageTable = HashMap<String, HashMap<String, HashMap<String, i64>>>;

/// Process-wide request counter. A single mutex is enough: contention is
/// bounded by the number of distinct API keys, and the critical sections
/// are a couple of map operations.
#[derive(Debug, Default)]
pub struct RequestStatistics {
    table: Mutex<UsageTable>,
}

/// Formats the month bucket for a timestamp, e.g. "2026-08".
pub fn month_key(now: OffsetDateTime) -> String {
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

impl RequestStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments the counter cell for (api_key, model) in the
    /// month of `now`.
    pub fn record(&self, api_key: &str, model: &str, delta: i64, now: OffsetDateTime) {
        if delta <= 0 {
            return;
        }
        let month = month_key(now);
        let mut table = self.table.lock().expect("usage table poisoned");
        let cell = table
            .entry(api_key.to_string())
            .or_default()
            .entry(model.to_string())
            .or_default()
            .entry(month)
            .or_insert(0);
        *cell = cell.saturating_add(delta);
    }

    pub fn monthly_usage(&self, api_key: &str, model: &str, now: OffsetDateTime) -> i64 {
        let month = month_key(now);
        let table = self.table.lock().expect("usage table poisoned");
        table
            .get(api_key)
            .and_then(|models| models.get(model))
            .and_then(|months| months.get(&month))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the current month's usage for every model seen under a key.
    pub fn monthly_usage_all_models(
        &self,
        api_key: &str,
        now: OffsetDateTime,
    ) -> HashMap<String, i64> {
        let month = month_key(now);
        let table = self.table.lock().expect("usage table poisoned");
        let Some(models) = table.get(api_key) else {
            return HashMap::new();
        };
        models
            .iter()
            .filter_map(|(model, months)| {
                months.get(&month).map(|count| (model.clone(), *count))
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let table = self.table.lock().expect("usage table poisoned");
        serde_json::to_vec(&*table).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Replaces the in-memory table with a decoded snapshot. An empty input
    /// resets the table.
    pub fn load(&self, raw: &[u8]) -> Result<(), UsageError> {
        let decoded: UsageTable = if raw.is_empty() {
            UsageTable::new()
        } else {
            serde_json::from_slice(raw)?
        };
        let mut table = self.table.lock().expect("usage table poisoned");
        *table = decoded;
        Ok(())
    }
}

/// File-backed persistence for [`RequestStatistics`] snapshots. Writes go
/// through a temp file + rename; the file is created with mode 0600.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    io: Mutex<()>,
}

pub const USAGE_FILE_NAME: &str = "usage-statistics.json";

impl FileStore {
    pub fn new(base_dir: &Path) -> Result<Self, UsageError> {
        fs::create_dir_all(base_dir).map_err(UsageError::Write)?;
        Ok(Self {
            path: base_dir.join(USAGE_FILE_NAME),
            io: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, data: &[u8]) -> Result<(), UsageError> {
        let _guard = self.io.lock().expect("file store poisoned");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(UsageError::Write)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(UsageError::Write)?;
        }
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            UsageError::Write(err)
        })
    }

    /// Returns `None` when no snapshot exists yet; that is the normal first
    /// run. Other read failures surface as errors.
    pub fn load(&self) -> Result<Option<Vec<u8>>, UsageError> {
        let _guard = self.io.lock().expect("file store poisoned");
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(UsageError::Read(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_is_monotonic_per_cell() {
        let stats = RequestStatistics::new();
        let now = datetime!(2026-08-02 10:00 UTC);
        stats.record("k", "gpt-4o", 1, now);
        stats.record("k", "gpt-4o", 1, now);
        stats.record("k", "gpt-4o", -5, now);
        assert_eq!(stats.monthly_usage("k", "gpt-4o", now), 2);
    }

    #[test]
    fn months_are_independent_cells() {
        let stats = RequestStatistics::new();
        let july = datetime!(2026-07-31 23:59 UTC);
        let august = datetime!(2026-08-01 00:00 UTC);
        stats.record("k", "gpt-4o", 3, july);
        stats.record("k", "gpt-4o", 1, august);
        assert_eq!(stats.monthly_usage("k", "gpt-4o", july), 3);
        assert_eq!(stats.monthly_usage("k", "gpt-4o", august), 1);
    }

    #[test]
    fn snapshot_load_round_trips() {
        let stats = RequestStatistics::new();
        let now = datetime!(2026-08-02 10:00 UTC);
        stats.record("k", "gpt-4o", 6, now);
        stats.record("k", "gpt-4o-mini", 5, now);
        let snapshot = stats.snapshot();

        let restored = RequestStatistics::new();
        restored.load(&snapshot).unwrap();
        assert_eq!(restored.monthly_usage("k", "gpt-4o", now), 6);
        assert_eq!(restored.monthly_usage("k", "gpt-4o-mini", now), 5);
        assert_eq!(restored.snapshot().len(), snapshot.len());
    }

    #[test]
    fn file_store_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.load().unwrap().is_none());

        store.save(b"{}").unwrap();
        assert_eq!(store.load().unwrap().unwrap(), b"{}");
    }
}
