//! Polling cadences.
//!
//! Feeds poll at the default cadence unless a named override or an account
//! refresh rate applies to them, in which case they poll only at that rate.

pub mod handler;
pub mod matcher;
pub mod types;

pub use handler::{RefreshSummary, ScheduleHandler, Scheduler};
pub use matcher::{distinct_urls, ScheduleMatcher};
pub use types::{is_due, override_rates, FeedSchedule};
