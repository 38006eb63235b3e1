//! HTTP feed client with SSRF checks and an anti-block fallback chain.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::header::SERVER;
use reqwest::{Client, Response};
use tracing::debug;

use super::types::{FetchOutcome, FetchResponse};
use crate::config::FetcherConfig;
use crate::{RelayError, Result};

/// How a request is sent. Strategies are tried in [`FetchStrategy::CHAIN`]
/// order; the next one runs only after a fallback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Configured user agent.
    Standard,
    /// No custom headers at all.
    Bare,
}

impl FetchStrategy {
    pub const CHAIN: [FetchStrategy; 2] = [FetchStrategy::Standard, FetchStrategy::Bare];

    pub fn name(&self) -> &'static str {
        match self {
            FetchStrategy::Standard => "standard",
            FetchStrategy::Bare => "bare",
        }
    }
}

/// Feed HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    standard: Client,
    bare: Client,
    max_feed_size: u64,
    anti_block_signature: String,
    fallback_statuses: Vec<u16>,
    allow_private_hosts: bool,
}

impl HttpFeedClient {
    /// Build the client from fetcher settings.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let builder = || {
            Client::builder()
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .timeout(Duration::from_secs(config.total_timeout_secs))
                .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        };

        let standard = builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelayError::Fetch(format!("failed to create HTTP client: {e}")))?;
        let bare = builder()
            .build()
            .map_err(|e| RelayError::Fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            standard,
            bare,
            max_feed_size: config.max_feed_size_bytes,
            anti_block_signature: config.anti_block_server_signature.to_lowercase(),
            fallback_statuses: config.fallback_statuses.clone(),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    fn client_for(&self, strategy: FetchStrategy) -> &Client {
        match strategy {
            FetchStrategy::Standard => &self.standard,
            FetchStrategy::Bare => &self.bare,
        }
    }

    /// Fetch `url`, classifying the result. Never returns an error; failures
    /// are part of the outcome.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let check = if self.allow_private_hosts {
            validate_scheme(url).map(|_| ())
        } else {
            validate_url(url)
        };
        if let Err(e) = check {
            return FetchOutcome::fetch_error(e.to_string());
        }

        let mut strategies = FetchStrategy::CHAIN.iter().peekable();
        while let Some(strategy) = strategies.next() {
            let response = match self.client_for(*strategy).get(url).send().await {
                Ok(response) => response,
                Err(e) => return FetchOutcome::fetch_error(describe_transport_error(&e)),
            };

            let status = response.status().as_u16();
            if strategies.peek().is_some() && self.fallback_statuses.contains(&status) {
                debug!(
                    url,
                    status,
                    strategy = strategy.name(),
                    "Fallback status, retrying with next fetch strategy"
                );
                continue;
            }

            return self.read_response(response).await;
        }

        FetchOutcome::fetch_error("no fetch strategy configured")
    }

    async fn read_response(&self, response: Response) -> FetchOutcome {
        let status_code = response.status().as_u16();
        let is_anti_block = !self.anti_block_signature.is_empty()
            && response
                .headers()
                .get(SERVER)
                .and_then(|v| v.to_str().ok())
                .map(|server| server.to_lowercase().contains(&self.anti_block_signature))
                .unwrap_or(false);

        if let Some(length) = response.content_length() {
            if length > self.max_feed_size {
                return FetchOutcome::parse_error(
                    status_code,
                    is_anti_block,
                    format!(
                        "response too large: {} bytes (max {} bytes)",
                        length, self.max_feed_size
                    ),
                );
            }
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return FetchOutcome::parse_error(
                    status_code,
                    is_anti_block,
                    format!("failed to read response body: {e}"),
                )
            }
        };

        if body.len() as u64 > self.max_feed_size {
            return FetchOutcome::parse_error(
                status_code,
                is_anti_block,
                format!(
                    "response too large: {} bytes (max {} bytes)",
                    body.len(),
                    self.max_feed_size
                ),
            );
        }

        FetchOutcome::from_response(FetchResponse {
            status_code,
            body: Some(body),
            is_anti_block,
        })
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_redirect() {
        format!("too many redirects: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

fn validate_scheme(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| RelayError::Fetch(format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(RelayError::Fetch(format!(
            "unsupported URL scheme: {scheme}"
        ))),
    }
}

/// Reject URLs that point at loopback, private or internal hosts.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = validate_scheme(url)?;
    let host = parsed
        .host()
        .ok_or_else(|| RelayError::Fetch("URL has no host".to_string()))?;

    match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(RelayError::Fetch(format!("forbidden host: {domain}")));
            }
        }
        url::Host::Ipv4(ipv4) => {
            if is_private_ip(&IpAddr::V4(ipv4)) {
                return Err(RelayError::Fetch(format!(
                    "private IP address not allowed: {ipv4}"
                )));
            }
        }
        url::Host::Ipv6(ipv6) => {
            if is_private_ip(&IpAddr::V6(ipv6)) {
                return Err(RelayError::Fetch(format!(
                    "private IP address not allowed: {ipv6}"
                )));
            }
        }
    }

    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    const FORBIDDEN_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || ipv4.is_documentation()
                // carrier-grade NAT 100.64.0.0/10
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || (segments[0] & 0xfe00) == 0xfc00
                || (segments[0] & 0xffc0) == 0xfe80
                || ipv6
                    .to_ipv4_mapped()
                    .map(|v4| is_private_ip(&IpAddr::V4(v4)))
                    .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchStatus;

    #[test]
    fn test_validate_url_public() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://93.184.216.34/rss").is_ok());
    }

    #[test]
    fn test_validate_url_scheme() {
        assert!(validate_url("ftp://example.com/feed").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_validate_url_internal_hosts() {
        assert!(validate_url("http://localhost/feed").is_err());
        assert!(validate_url("http://printer.local/feed").is_err());
        assert!(validate_url("http://wiki.corp/feed").is_err());
        assert!(validate_url("http://127.0.0.1:8080/feed").is_err());
        assert!(validate_url("http://10.1.2.3/feed").is_err());
        assert!(validate_url("http://172.20.0.1/feed").is_err());
        assert!(validate_url("http://192.168.1.1/feed").is_err());
        assert!(validate_url("http://169.254.169.254/latest").is_err());
        assert!(validate_url("http://[::1]/feed").is_err());
        assert!(validate_url("http://[::ffff:127.0.0.1]/feed").is_err());
    }

    #[test]
    fn test_is_private_ip_boundaries() {
        assert!(!is_private_ip(&"172.32.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"100.64.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"100.128.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_strategy_chain_order() {
        assert_eq!(
            FetchStrategy::CHAIN,
            [FetchStrategy::Standard, FetchStrategy::Bare]
        );
        assert_eq!(FetchStrategy::Bare.name(), "bare");
    }

    #[tokio::test]
    async fn test_fetch_rejects_private_host_without_request() {
        let client = HttpFeedClient::new(&FetcherConfig::default()).unwrap();
        let outcome = client.fetch("http://127.0.0.1:1/feed").await;
        assert_eq!(outcome.status, FetchStatus::FetchError);
        assert!(outcome.response.is_none());
        assert!(outcome
            .error_message
            .unwrap()
            .contains("private IP address"));
    }
}
