//! Failed-attempt tracking for the management surface. Five failures from
//! one address ban it for thirty minutes. The table is bounded: stale
//! entries are evicted when it fills so an adversarial scan cannot grow it
//! without limit.

use std::collections::HashMap;
use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

pub const MAX_FAILURES: u32 = 5;
pub const BAN_DURATION: Duration = Duration::minutes(30);
const MAX_TRACKED_ADDRESSES: usize = 1024;

#[derive(Debug, Clone)]
struct AttemptInfo {
    count: u32,
    blocked_until: Option<OffsetDateTime>,
    last_seen: OffsetDateTime,
}

#[derive(Debug, Default)]
pub struct FailedAttempts {
    inner: Mutex<HashMap<String, AttemptInfo>>,
}

impl FailedAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining ban time for `ip`, if it is currently blocked. An expired
    /// ban resets the entry.
    pub fn ban_remaining(&self, ip: &str, now: OffsetDateTime) -> Option<Duration> {
        let mut table = self.inner.lock().expect("attempts poisoned");
        let info = table.get_mut(ip)?;
        let blocked_until = info.blocked_until?;
        if now < blocked_until {
            return Some(blocked_until - now);
        }
        info.blocked_until = None;
        info.count = 0;
        None
    }

    pub fn record_failure(&self, ip: &str, now: OffsetDateTime) {
        let mut table = self.inner.lock().expect("attempts poisoned");
        if table.len() >= MAX_TRACKED_ADDRESSES && !table.contains_key(ip) {
            evict_stale(&mut table, now);
        }
        let info = table.entry(ip.to_string()).or_insert(AttemptInfo {
            count: 0,
            blocked_until: None,
            last_seen: now,
        });
        info.last_seen = now;
        info.count += 1;
        if info.count >= MAX_FAILURES {
            info.blocked_until = Some(now + BAN_DURATION);
            info.count = 0;
        }
    }

    /// Cleared lazily on successful auth.
    pub fn clear(&self, ip: &str) {
        let mut table = self.inner.lock().expect("attempts poisoned");
        table.remove(ip);
    }
}

fn evict_stale(table: &mut HashMap<String, AttemptInfo>, now: OffsetDateTime) {
    table.retain(|_, info| {
        let banned = info.blocked_until.is_some_and(|until| now < until);
        banned || now - info.last_seen < BAN_DURATION
    });
    if table.len() < MAX_TRACKED_ADDRESSES {
        return;
    }
    // Still full of live entries: drop the oldest.
    if let Some(oldest) = table
        .iter()
        .min_by_key(|(_, info)| info.last_seen)
        .map(|(ip, _)| ip.clone())
    {
        table.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_failures_ban_for_thirty_minutes() {
        let attempts = FailedAttempts::new();
        let now = OffsetDateTime::now_utc();
        for _ in 0..MAX_FAILURES {
            attempts.record_failure("1.2.3.4", now);
        }
        let remaining = attempts.ban_remaining("1.2.3.4", now).unwrap();
        assert_eq!(remaining, BAN_DURATION);

        // The ban lapses after thirty minutes.
        assert!(attempts
            .ban_remaining("1.2.3.4", now + BAN_DURATION + Duration::seconds(1))
            .is_none());
    }

    #[test]
    fn success_clears_the_counter() {
        let attempts = FailedAttempts::new();
        let now = OffsetDateTime::now_utc();
        for _ in 0..MAX_FAILURES - 1 {
            attempts.record_failure("1.2.3.4", now);
        }
        attempts.clear("1.2.3.4");
        for _ in 0..MAX_FAILURES - 1 {
            attempts.record_failure("1.2.3.4", now);
        }
        assert!(attempts.ban_remaining("1.2.3.4", now).is_none());
    }

    #[test]
    fn table_stays_bounded_under_scan() {
        let attempts = FailedAttempts::new();
        let now = OffsetDateTime::now_utc();
        for index in 0..5000 {
            attempts.record_failure(&format!("10.0.{}.{}", index / 256, index % 256), now);
        }
        let len = attempts.inner.lock().unwrap().len();
        assert!(len <= MAX_TRACKED_ADDRESSES + 1);
    }
}
