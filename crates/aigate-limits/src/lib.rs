//! API key restriction and monthly quota enforcement.
//!
//! The enforcer is a pure function of (limits snapshot, usage snapshot,
//! inputs): it never mutates usage, and `reload` swaps the whole limits
//! vector atomically so concurrent readers see either the old set or the
//! new one, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use aigate_config::ApiKeyLimit;
use aigate_usage::RequestStatistics;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("model {model:?} is not allowed for this API key")]
    ModelNotAllowed { model: String },
    #[error("monthly quota exceeded for model {model:?} (limit: {limit}, current: {current})")]
    QuotaExceeded {
        model: String,
        limit: i64,
        current: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub current: i64,
    pub limit: i64,
    pub has_limit: bool,
}

pub struct Enforcer {
    limits: RwLock<Vec<ApiKeyLimit>>,
    stats: Arc<RequestStatistics>,
}

impl Enforcer {
    pub fn new(limits: Vec<ApiKeyLimit>, stats: Arc<RequestStatistics>) -> Self {
        Self {
            limits: RwLock::new(limits),
            stats,
        }
    }

    /// Validates whether `api_key` may call `model` right now. Keys without
    /// a limit entry are unrestricted.
    pub fn check_access(
        &self,
        api_key: &str,
        model: &str,
        now: OffsetDateTime,
    ) -> Result<(), AccessDenied> {
        let limits = self.limits.read().expect("limits poisoned");
        let Some(limit) = find_limit(&limits, api_key) else {
            return Ok(());
        };

        if !limit.allowed_models.is_empty()
            && !limit
                .allowed_models
                .iter()
                .any(|pattern| match_model(pattern, model))
        {
            return Err(AccessDenied::ModelNotAllowed {
                model: model.to_string(),
            });
        }

        if !limit.monthly_quotas.is_empty() {
            let usage = self.stats.monthly_usage_all_models(api_key, now);
            // BTreeMap iterates patterns in lexicographic order; the first
            // pattern matching the requested model wins.
            for (pattern, quota) in &limit.monthly_quotas {
                if !match_model(pattern, model) {
                    continue;
                }
                let aggregated: i64 = usage
                    .iter()
                    .filter(|(used_model, _)| match_model(pattern, used_model))
                    .map(|(_, count)| *count)
                    .sum();
                if aggregated >= *quota {
                    return Err(AccessDenied::QuotaExceeded {
                        model: model.to_string(),
                        limit: *quota,
                        current: aggregated,
                    });
                }
                break;
            }
        }

        Ok(())
    }

    /// `None` means no credential restriction for this key.
    pub fn allowed_credentials(&self, api_key: &str) -> Option<Vec<String>> {
        let limits = self.limits.read().expect("limits poisoned");
        find_limit(&limits, api_key)
            .filter(|limit| !limit.allowed_credentials.is_empty())
            .map(|limit| limit.allowed_credentials.clone())
    }

    pub fn allowed_providers(&self, api_key: &str) -> Option<Vec<String>> {
        let limits = self.limits.read().expect("limits poisoned");
        find_limit(&limits, api_key)
            .filter(|limit| !limit.allowed_providers.is_empty())
            .map(|limit| limit.allowed_providers.clone())
    }

    pub fn allowed_models(&self, api_key: &str) -> Option<Vec<String>> {
        let limits = self.limits.read().expect("limits poisoned");
        find_limit(&limits, api_key)
            .filter(|limit| !limit.allowed_models.is_empty())
            .map(|limit| limit.allowed_models.clone())
    }

    /// Aggregated usage and limit for the quota pattern covering `model`.
    pub fn quota_status(&self, api_key: &str, model: &str, now: OffsetDateTime) -> QuotaStatus {
        let limits = self.limits.read().expect("limits poisoned");
        let Some(limit) = find_limit(&limits, api_key).filter(|l| !l.monthly_quotas.is_empty())
        else {
            return QuotaStatus {
                current: 0,
                limit: 0,
                has_limit: false,
            };
        };

        let usage = self.stats.monthly_usage_all_models(api_key, now);
        for (pattern, quota) in &limit.monthly_quotas {
            if !match_model(pattern, model) {
                continue;
            }
            let aggregated: i64 = usage
                .iter()
                .filter(|(used_model, _)| match_model(pattern, used_model))
                .map(|(_, count)| *count)
                .sum();
            return QuotaStatus {
                current: aggregated,
                limit: *quota,
                has_limit: true,
            };
        }

        QuotaStatus {
            current: self.stats.monthly_usage(api_key, model, now),
            limit: 0,
            has_limit: false,
        }
    }

    /// Current-month usage per model, annotated with the covering quota.
    pub fn monthly_usage_summary(
        &self,
        api_key: &str,
        now: OffsetDateTime,
    ) -> BTreeMap<String, QuotaStatus> {
        let usage = self.stats.monthly_usage_all_models(api_key, now);
        let limits = self.limits.read().expect("limits poisoned");
        let quotas = find_limit(&limits, api_key).map(|limit| &limit.monthly_quotas);

        let mut summary = BTreeMap::new();
        if let Some(quotas) = quotas {
            for (pattern, quota) in quotas {
                for (model, current) in &usage {
                    if match_model(pattern, model) {
                        summary.insert(
                            model.clone(),
                            QuotaStatus {
                                current: *current,
                                limit: *quota,
                                has_limit: true,
                            },
                        );
                    }
                }
            }
        }
        for (model, current) in &usage {
            summary.entry(model.clone()).or_insert(QuotaStatus {
                current: *current,
                limit: 0,
                has_limit: false,
            });
        }
        summary
    }

    pub fn reload(&self, limits: Vec<ApiKeyLimit>) {
        *self.limits.write().expect("limits poisoned") = limits;
    }
}

fn find_limit<'a>(limits: &'a [ApiKeyLimit], api_key: &str) -> Option<&'a ApiKeyLimit> {
    limits.iter().find(|limit| limit.api_key == api_key)
}

/// Shell-glob model matching: `*`, `?` and character classes, with no
/// separator special-casing. Exact equality short-circuits the glob build;
/// an invalid pattern falls back to exact comparison.
pub fn match_model(pattern: &str, model: &str) -> bool {
    if pattern == model {
        return true;
    }
    match globset::Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(model),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn enforcer_with(limits: Vec<ApiKeyLimit>, stats: Arc<RequestStatistics>) -> Enforcer {
        Enforcer::new(limits, stats)
    }

    #[test]
    fn exact_pattern_always_matches_itself() {
        assert!(match_model("gpt-4o", "gpt-4o"));
        assert!(match_model("g[pt-4o", "g[pt-4o"));
        assert!(!match_model("g[pt-4o", "other"));
    }

    #[test]
    fn glob_patterns_cover_wildcards() {
        assert!(match_model("gpt-*", "gpt-4o-mini"));
        assert!(match_model("*-turbo", "gpt-3.5-turbo"));
        assert!(match_model("claude-?-opus", "claude-3-opus"));
        assert!(!match_model("gpt-*", "claude-3-opus"));
    }

    #[test]
    fn unknown_key_is_unrestricted() {
        let stats = Arc::new(RequestStatistics::new());
        let enforcer = enforcer_with(Vec::new(), stats);
        let now = datetime!(2026-08-02 12:00 UTC);
        assert!(enforcer.check_access("anyone", "any-model", now).is_ok());
    }

    #[test]
    fn model_allow_list_denies_unlisted() {
        let stats = Arc::new(RequestStatistics::new());
        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                allowed_models: vec!["gpt-*".to_string()],
                ..Default::default()
            }],
            stats,
        );
        let now = datetime!(2026-08-02 12:00 UTC);
        assert!(enforcer.check_access("K", "gpt-4o", now).is_ok());
        assert_eq!(
            enforcer.check_access("K", "claude-3-opus", now),
            Err(AccessDenied::ModelNotAllowed {
                model: "claude-3-opus".to_string()
            })
        );
    }

    #[test]
    fn wildcard_quota_aggregates_matching_models() {
        let stats = Arc::new(RequestStatistics::new());
        let now = datetime!(2026-08-02 12:00 UTC);
        stats.record("K", "gpt-4o", 6, now);
        stats.record("K", "gpt-4o-mini", 5, now);

        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                monthly_quotas: [("gpt-*".to_string(), 10)].into_iter().collect(),
                ..Default::default()
            }],
            stats.clone(),
        );

        // 6 + 5 = 11 >= 10: denied even for a model with zero usage itself.
        assert_eq!(
            enforcer.check_access("K", "gpt-4", now),
            Err(AccessDenied::QuotaExceeded {
                model: "gpt-4".to_string(),
                limit: 10,
                current: 11,
            })
        );

        let stats = Arc::new(RequestStatistics::new());
        stats.record("K", "gpt-4o", 6, now);
        stats.record("K", "gpt-4o-mini", 3, now);
        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                monthly_quotas: [("gpt-*".to_string(), 10)].into_iter().collect(),
                ..Default::default()
            }],
            stats,
        );
        assert!(enforcer.check_access("K", "gpt-4", now).is_ok());
    }

    #[test]
    fn first_matching_quota_pattern_wins_lexicographically() {
        let stats = Arc::new(RequestStatistics::new());
        let now = datetime!(2026-08-02 12:00 UTC);
        stats.record("K", "gpt-4o", 1, now);

        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                monthly_quotas: [
                    ("*".to_string(), 1),
                    ("gpt-*".to_string(), 100),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            }],
            stats,
        );

        // "*" sorts before "gpt-*", matches first, and its quota of 1 is
        // already consumed.
        assert!(matches!(
            enforcer.check_access("K", "gpt-4o", now),
            Err(AccessDenied::QuotaExceeded { limit: 1, .. })
        ));
    }

    #[test]
    fn reload_replaces_the_whole_set() {
        let stats = Arc::new(RequestStatistics::new());
        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                allowed_models: vec!["gpt-*".to_string()],
                ..Default::default()
            }],
            stats,
        );
        let now = datetime!(2026-08-02 12:00 UTC);
        assert!(enforcer.check_access("K", "claude-3-opus", now).is_err());

        enforcer.reload(Vec::new());
        assert!(enforcer.check_access("K", "claude-3-opus", now).is_ok());
    }

    #[test]
    fn credential_and_provider_filters_expose_none_when_unrestricted() {
        let stats = Arc::new(RequestStatistics::new());
        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                allowed_credentials: vec!["cred-1".to_string()],
                ..Default::default()
            }],
            stats,
        );
        assert_eq!(
            enforcer.allowed_credentials("K"),
            Some(vec!["cred-1".to_string()])
        );
        assert_eq!(enforcer.allowed_credentials("other"), None);
        assert_eq!(enforcer.allowed_providers("K"), None);
    }

    #[test]
    fn quota_status_reports_aggregate_and_limit() {
        let stats = Arc::new(RequestStatistics::new());
        let now = datetime!(2026-08-02 12:00 UTC);
        stats.record("K", "gpt-4o", 6, now);
        stats.record("K", "gpt-4o-mini", 5, now);
        let enforcer = enforcer_with(
            vec![ApiKeyLimit {
                api_key: "K".to_string(),
                monthly_quotas: [("gpt-*".to_string(), 10)].into_iter().collect(),
                ..Default::default()
            }],
            stats,
        );
        let status = enforcer.quota_status("K", "gpt-4o", now);
        assert_eq!(
            status,
            QuotaStatus {
                current: 11,
                limit: 10,
                has_limit: true,
            }
        );
    }
}
