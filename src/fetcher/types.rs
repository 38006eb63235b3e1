//! Fetch attempt types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Classified outcome of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    /// 2xx response.
    Ok,
    /// Non-2xx response.
    Failed,
    /// No response: DNS, refused connection, timeout, redirect loop.
    FetchError,
    /// Response body could not be read as text.
    ParseError,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Failed => "failed",
            FetchStatus::FetchError => "fetch-error",
            FetchStatus::ParseError => "parse-error",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FetchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(FetchStatus::Ok),
            "failed" => Ok(FetchStatus::Failed),
            "fetch-error" => Ok(FetchStatus::FetchError),
            "parse-error" => Ok(FetchStatus::ParseError),
            _ => Err(format!("unknown fetch status: {s}")),
        }
    }
}

/// Raw upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResponse {
    pub status_code: u16,
    /// Body text; `None` when it could not be read.
    pub body: Option<String>,
    /// The `server` header matched the anti-bot gateway signature.
    pub is_anti_block: bool,
}

/// Result of running the fetch strategy chain against one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    pub response: Option<FetchResponse>,
    pub error_message: Option<String>,
}

impl FetchOutcome {
    /// Transport failure with no response.
    pub fn fetch_error(message: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::FetchError,
            response: None,
            error_message: Some(message.into()),
        }
    }

    /// A response whose body was read.
    pub fn from_response(response: FetchResponse) -> Self {
        let status = if (200..300).contains(&response.status_code) {
            FetchStatus::Ok
        } else {
            FetchStatus::Failed
        };
        Self {
            status,
            response: Some(response),
            error_message: None,
        }
    }

    /// A response whose body could not be used.
    pub fn parse_error(status_code: u16, is_anti_block: bool, message: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::ParseError,
            response: Some(FetchResponse {
                status_code,
                body: None,
                is_anti_block,
            }),
            error_message: Some(message.into()),
        }
    }
}

/// A persisted fetch attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    pub id: i64,
    pub url: String,
    pub status: FetchStatus,
    pub error_message: Option<String>,
    pub response: Option<FetchResponse>,
    pub created_at: DateTime<Utc>,
}

/// Per-URL failure streak projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStreak {
    pub url: String,
    /// Start of the current streak; `None` when the last attempt succeeded.
    pub started_at: Option<DateTime<Utc>>,
    /// The disable signal was already emitted for this streak.
    pub breached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            FetchStatus::Ok,
            FetchStatus::Failed,
            FetchStatus::FetchError,
            FetchStatus::ParseError,
        ] {
            assert_eq!(status.as_str().parse::<FetchStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_outcome_from_response_classifies() {
        let response = |code| FetchResponse {
            status_code: code,
            body: Some(String::new()),
            is_anti_block: false,
        };
        assert_eq!(
            FetchOutcome::from_response(response(200)).status,
            FetchStatus::Ok
        );
        assert_eq!(
            FetchOutcome::from_response(response(204)).status,
            FetchStatus::Ok
        );
        assert_eq!(
            FetchOutcome::from_response(response(304)).status,
            FetchStatus::Failed
        );
        assert_eq!(
            FetchOutcome::from_response(response(503)).status,
            FetchStatus::Failed
        );
    }
}
