//! Configuration for the remote document API and the data service lifecycle.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PENDING_CHECK_SECS: u64 = 60;

/// Configuration for the remote document store API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the document API (e.g., `https://api.puppyplanner.app`)
    pub endpoint: String,
    /// Bearer token for authenticated requests
    pub auth_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Create a new remote configuration from a base endpoint URL.
    ///
    /// The endpoint must include an `http://` or `https://` scheme; a
    /// trailing slash is stripped.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = normalize_text_option(Some(endpoint.into()))
            .ok_or_else(|| Error::InvalidInput("endpoint must not be empty".to_string()))?;
        if !is_http_url(&endpoint) {
            return Err(Error::InvalidInput(
                "endpoint must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_token: None,
            timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        })
    }

    /// Set the bearer token used for authenticated requests.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Tunables for the unified data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How often the pending-operation heartbeat logs queue depth
    pub pending_check_interval: Duration,
    /// Run a full sync at `start()` when the monitor reports online
    pub startup_sync: bool,
}

impl ServiceConfig {
    /// Set the pending-operation heartbeat interval.
    #[must_use]
    pub const fn with_pending_check_interval(mut self, interval: Duration) -> Self {
        self.pending_check_interval = interval;
        self
    }

    /// Disable the sync normally performed at startup.
    #[must_use]
    pub const fn without_startup_sync(mut self) -> Self {
        self.startup_sync = false;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pending_check_interval: Duration::from_secs(DEFAULT_PENDING_CHECK_SECS),
            startup_sync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_config_rejects_invalid_endpoints() {
        assert!(RemoteConfig::new("  ").is_err());
        assert!(RemoteConfig::new("api.example.com").is_err());
    }

    #[test]
    fn remote_config_trims_trailing_slash() {
        let config = RemoteConfig::new("https://api.example.com/").unwrap();
        assert_eq!(config.endpoint, "https://api.example.com");
    }

    #[test]
    fn remote_config_normalizes_blank_token() {
        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_auth_token("  ");
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.pending_check_interval, Duration::from_secs(60));
        assert!(config.startup_sync);
    }
}
