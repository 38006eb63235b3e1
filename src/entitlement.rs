//! Account entitlement lookup.
//!
//! Billing and subscription state live outside this service; the pipeline
//! only asks for the limits that apply to an owning account.

use std::collections::HashMap;

use crate::config::EntitlementsConfig;

/// Limits that apply to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Benefits {
    /// Maximum number of feeds the account may own.
    pub max_feeds: u32,
    /// Maximum delivered articles per feed per day.
    pub max_daily_articles: u32,
    /// Refresh rate override in minutes, if any.
    pub refresh_rate_minutes: Option<u32>,
}

/// An account whose feeds poll at a custom cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRefreshRate {
    pub user_id: String,
    pub refresh_rate_minutes: u32,
}

impl AccountRefreshRate {
    /// Cadence in seconds.
    pub fn rate_seconds(&self) -> u64 {
        u64::from(self.refresh_rate_minutes) * 60
    }
}

/// Source of account limits.
pub trait EntitlementLookup: Send + Sync {
    /// Limits of the given account.
    fn benefits_of(&self, user_id: &str) -> Benefits;

    /// Accounts that have a refresh rate override.
    fn refresh_rate_overrides(&self) -> Vec<AccountRefreshRate>;
}

/// Entitlements read from the `[entitlements]` config section.
#[derive(Debug, Clone)]
pub struct ConfiguredEntitlements {
    default_max_feeds: u32,
    default_max_daily_articles: u32,
    accounts: HashMap<String, Benefits>,
}

impl ConfiguredEntitlements {
    pub fn new(config: &EntitlementsConfig) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|account| {
                let benefits = Benefits {
                    max_feeds: account.max_feeds.unwrap_or(config.default_max_feeds),
                    max_daily_articles: account
                        .max_daily_articles
                        .unwrap_or(config.default_max_daily_articles),
                    refresh_rate_minutes: account.refresh_rate_minutes,
                };
                (account.user_id.clone(), benefits)
            })
            .collect();

        Self {
            default_max_feeds: config.default_max_feeds,
            default_max_daily_articles: config.default_max_daily_articles,
            accounts,
        }
    }
}

impl EntitlementLookup for ConfiguredEntitlements {
    fn benefits_of(&self, user_id: &str) -> Benefits {
        self.accounts.get(user_id).copied().unwrap_or(Benefits {
            max_feeds: self.default_max_feeds,
            max_daily_articles: self.default_max_daily_articles,
            refresh_rate_minutes: None,
        })
    }

    fn refresh_rate_overrides(&self) -> Vec<AccountRefreshRate> {
        let mut overrides: Vec<AccountRefreshRate> = self
            .accounts
            .iter()
            .filter_map(|(user_id, benefits)| {
                benefits
                    .refresh_rate_minutes
                    .filter(|minutes| *minutes > 0)
                    .map(|minutes| AccountRefreshRate {
                        user_id: user_id.clone(),
                        refresh_rate_minutes: minutes,
                    })
            })
            .collect();
        overrides.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        overrides
    }
}
