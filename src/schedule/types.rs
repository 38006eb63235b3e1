//! Cadence overrides.

use serde::{Deserialize, Serialize};

use crate::entitlement::AccountRefreshRate;
use crate::feed::Feed;

/// A named cadence override.
///
/// Applies to feeds whose title contains any keyword (case-insensitive) or
/// whose id is listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSchedule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub feed_ids: Vec<i64>,
    pub refresh_rate_minutes: u32,
}

impl FeedSchedule {
    pub fn new(name: impl Into<String>, refresh_rate_minutes: u32) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            feed_ids: Vec::new(),
            refresh_rate_minutes,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_feed_ids(mut self, feed_ids: Vec<i64>) -> Self {
        self.feed_ids = feed_ids;
        self
    }

    /// Cadence in seconds.
    pub fn rate_seconds(&self) -> u64 {
        u64::from(self.refresh_rate_minutes) * 60
    }

    /// Whether this override applies to `feed`.
    pub fn applies_to(&self, feed: &Feed) -> bool {
        let title = feed.title.to_lowercase();
        self.feed_ids.contains(&feed.id)
            || self
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .any(|k| title.contains(&k.to_lowercase()))
    }
}

/// Cadences of every override that applies to `feed`. Zero rates are
/// ignored.
pub fn override_rates(
    feed: &Feed,
    schedules: &[FeedSchedule],
    accounts: &[AccountRefreshRate],
) -> Vec<u64> {
    let mut rates: Vec<u64> = schedules
        .iter()
        .filter(|s| s.applies_to(feed))
        .map(FeedSchedule::rate_seconds)
        .chain(
            accounts
                .iter()
                .filter(|a| a.user_id == feed.owner_id)
                .map(AccountRefreshRate::rate_seconds),
        )
        .filter(|rate| *rate > 0)
        .collect();
    rates.sort_unstable();
    rates.dedup();
    rates
}

/// Whether `feed` is due at `cadence`.
///
/// Inactive feeds are never due. A feed with an applicable override is due
/// only at that override's cadence, even when it equals the default.
pub fn is_due(
    feed: &Feed,
    cadence: u64,
    default_cadence: u64,
    schedules: &[FeedSchedule],
    accounts: &[AccountRefreshRate],
) -> bool {
    if !feed.is_active() {
        return false;
    }

    let rates = override_rates(feed, schedules, accounts);
    if rates.is_empty() {
        cadence == default_cadence
    } else {
        rates.contains(&cadence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedDisabledCode, FeedHealthStatus};
    use chrono::Utc;

    fn feed(id: i64, title: &str, owner: &str) -> Feed {
        Feed {
            id,
            title: title.to_string(),
            url: format!("https://example.com/{id}"),
            owner_id: owner.to_string(),
            health_status: FeedHealthStatus::Ok,
            disabled_code: None,
            passing_comparisons: Vec::new(),
            blocking_comparisons: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let schedule = FeedSchedule::new("news", 5).with_keywords(vec!["NeWs".to_string()]);
        assert!(schedule.applies_to(&feed(1, "Daily news digest", "u")));
        assert!(!schedule.applies_to(&feed(2, "Sports", "u")));
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        let schedule = FeedSchedule::new("empty", 5).with_keywords(vec![String::new()]);
        assert!(!schedule.applies_to(&feed(1, "Anything", "u")));
    }

    #[test]
    fn test_default_population() {
        let f = feed(1, "Plain", "u");
        assert!(is_due(&f, 600, 600, &[], &[]));
        assert!(!is_due(&f, 300, 600, &[], &[]));
    }

    #[test]
    fn test_override_wins_even_at_default_rate() {
        let f = feed(1, "Plain", "u");
        let at_default = FeedSchedule::new("same", 10).with_feed_ids(vec![1]);
        assert!(is_due(&f, 600, 600, &[at_default], &[]));

        let faster = FeedSchedule::new("fast", 2).with_feed_ids(vec![1]);
        assert!(!is_due(&f, 600, 600, &[faster.clone()], &[]));
        assert!(is_due(&f, 120, 600, &[faster], &[]));
    }

    #[test]
    fn test_account_override() {
        let f = feed(1, "Plain", "supporter");
        let accounts = vec![AccountRefreshRate {
            user_id: "supporter".to_string(),
            refresh_rate_minutes: 2,
        }];
        assert!(is_due(&f, 120, 600, &[], &accounts));
        assert!(!is_due(&f, 600, 600, &[], &accounts));
        assert!(is_due(&feed(2, "Plain", "other"), 600, 600, &[], &accounts));
    }

    #[test]
    fn test_inactive_never_due() {
        let mut disabled = feed(1, "Plain", "u");
        disabled.disabled_code = Some(FeedDisabledCode::Manual);
        assert!(!is_due(&disabled, 600, 600, &[], &[]));

        let mut failed = feed(2, "Plain", "u");
        failed.health_status = FeedHealthStatus::Failed;
        let schedule = FeedSchedule::new("s", 10).with_feed_ids(vec![2]);
        assert!(!is_due(&failed, 600, 600, &[schedule], &[]));
    }

    #[test]
    fn test_non_ascii_keyword() {
        let schedule = FeedSchedule::new("economy", 2).with_keywords(vec!["économie".to_string()]);
        assert!(schedule.applies_to(&feed(1, "ÉCONOMIE Weekly", "u")));
        assert!(is_due(&feed(1, "ÉCONOMIE Weekly", "u"), 120, 600, &[schedule], &[]));
    }

    #[test]
    fn test_zero_rate_override_ignored() {
        let f = feed(1, "Plain", "u");
        let broken = FeedSchedule::new("broken", 0).with_feed_ids(vec![1]);
        assert!(override_rates(&f, &[broken.clone()], &[]).is_empty());
        assert!(is_due(&f, 600, 600, &[broken], &[]));
    }
}
