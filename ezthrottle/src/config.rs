//! Client configuration.
//!
//! Configuration is constructed explicitly and handed to
//! [`crate::client::EzThrottleClient`]; nothing is read from global state
//! after construction. [`ClientConfig::from_env`] reads:
//!
//! - `EZTHROTTLE_API_KEY` (required)
//! - `EZTHROTTLE_URL`
//! - `TRACKTAGS_URL`
//! - `EZTHROTTLE_CUSTOMER_ID`
//! - `EZTHROTTLE_TIMEOUT_SECONDS`

use crate::errors::EzThrottleError;
use crate::webhook::mask_secret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "EZTHROTTLE_API_KEY";
/// Environment variable overriding the backend URL.
pub const ENV_EZTHROTTLE_URL: &str = "EZTHROTTLE_URL";
/// Environment variable overriding the proxy URL.
pub const ENV_TRACKTAGS_URL: &str = "TRACKTAGS_URL";
/// Environment variable setting the customer id.
pub const ENV_CUSTOMER_ID: &str = "EZTHROTTLE_CUSTOMER_ID";
/// Environment variable overriding the request timeout.
pub const ENV_TIMEOUT_SECONDS: &str = "EZTHROTTLE_TIMEOUT_SECONDS";

/// Connection settings for the backend and its admission proxy.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bearer key presented to the proxy.
    pub api_key: String,

    /// Base URL of the admission proxy.
    #[serde(default = "default_tracktags_url")]
    pub tracktags_url: String,

    /// Base URL of the job backend.
    #[serde(default = "default_ezthrottle_url")]
    pub ezthrottle_url: String,

    /// Customer id mixed into HASH idempotency keys.
    #[serde(default)]
    pub customer_id: String,

    /// Timeout for proxy and local HTTP requests, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub request_timeout_seconds: f64,
}

fn default_tracktags_url() -> String {
    "https://tracktags.fly.dev".to_string()
}

fn default_ezthrottle_url() -> String {
    "https://ezthrottle.fly.dev".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

impl ClientConfig {
    /// Creates a configuration with default URLs.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            tracktags_url: default_tracktags_url(),
            ezthrottle_url: default_ezthrottle_url(),
            customer_id: String::new(),
            request_timeout_seconds: default_timeout_seconds(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Config`] if the API key is missing or a
    /// value is invalid.
    pub fn from_env() -> Result<Self, EzThrottleError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through a variable lookup.
    ///
    /// # Errors
    ///
    /// As [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EzThrottleError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get(ENV_API_KEY)
            .ok_or_else(|| EzThrottleError::Config(format!("{ENV_API_KEY} is not set")))?;

        let mut config = Self::new(api_key);
        if let Some(url) = get(ENV_EZTHROTTLE_URL) {
            config.ezthrottle_url = url;
        }
        if let Some(url) = get(ENV_TRACKTAGS_URL) {
            config.tracktags_url = url;
        }
        if let Some(customer_id) = get(ENV_CUSTOMER_ID) {
            config.customer_id = customer_id;
        }
        if let Some(timeout) = get(ENV_TIMEOUT_SECONDS) {
            config.request_timeout_seconds = timeout.trim().parse().map_err(|_| {
                EzThrottleError::Config(format!("{ENV_TIMEOUT_SECONDS} must be a number, got '{timeout}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the proxy URL.
    #[must_use]
    pub fn with_tracktags_url(mut self, url: impl Into<String>) -> Self {
        self.tracktags_url = url.into();
        self
    }

    /// Sets the backend URL.
    #[must_use]
    pub fn with_ezthrottle_url(mut self, url: impl Into<String>) -> Self {
        self.ezthrottle_url = url.into();
        self
    }

    /// Sets the customer id.
    #[must_use]
    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = customer_id.into();
        self
    }

    /// Sets the request timeout in seconds.
    #[must_use]
    pub fn with_request_timeout(mut self, seconds: f64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Returns the request timeout, falling back to the default when the
    /// configured value is not a valid duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_timeout_seconds()))
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), EzThrottleError> {
        if self.api_key.trim().is_empty() {
            return Err(EzThrottleError::Config("api_key is required".to_string()));
        }
        for (name, url) in [
            ("tracktags_url", &self.tracktags_url),
            ("ezthrottle_url", &self.ezthrottle_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(EzThrottleError::Config(format!("{name} '{url}' is not a valid URL")));
            }
        }
        if !self.request_timeout_seconds.is_finite() || self.request_timeout_seconds <= 0.0 {
            return Err(EzThrottleError::Config(
                "request_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Proxy route that admits and forwards requests.
    #[must_use]
    pub fn proxy_url(&self) -> String {
        format!("{}/api/v1/proxy", self.tracktags_url.trim_end_matches('/'))
    }

    /// Backend route that creates jobs.
    #[must_use]
    pub fn jobs_url(&self) -> String {
        format!("{}/api/v1/jobs", self.ezthrottle_url.trim_end_matches('/'))
    }

    /// Backend route that manages webhook secrets.
    #[must_use]
    pub fn webhook_secrets_url(&self) -> String {
        format!("{}/api/v1/webhook-secrets", self.ezthrottle_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("tracktags_url", &self.tracktags_url)
            .field("ezthrottle_url", &self.ezthrottle_url)
            .field("customer_id", &self.customer_id)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, EzThrottleError::Config(ref m) if m.contains(ENV_API_KEY)));

        let blank = ClientConfig::from_lookup(lookup(&[(ENV_API_KEY, "  ")])).unwrap_err();
        assert!(matches!(blank, EzThrottleError::Config(_)));
    }

    #[test]
    fn test_defaults_and_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "ck_live_cust_1_abc"),
            (ENV_EZTHROTTLE_URL, "http://localhost:4000/"),
            (ENV_CUSTOMER_ID, "cust_1"),
        ]))
        .unwrap();

        assert_eq!(config.tracktags_url, "https://tracktags.fly.dev");
        assert_eq!(config.jobs_url(), "http://localhost:4000/api/v1/jobs");
        assert_eq!(config.customer_id, "cust_1");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "key"),
            (ENV_TIMEOUT_SECONDS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EzThrottleError::Config(_)));

        assert!(ClientConfig::new("key").with_request_timeout(0.0).validate().is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ClientConfig::new("key").with_tracktags_url("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = ClientConfig::new("ck_live_cust_secret_9876");
        let debug = format!("{config:?}");

        assert!(!debug.contains("ck_live"));
        assert!(debug.contains("9876"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"api_key": "k"}"#).unwrap();
        assert_eq!(config.proxy_url(), "https://tracktags.fly.dev/api/v1/proxy");
        assert_eq!(
            config.webhook_secrets_url(),
            "https://ezthrottle.fly.dev/api/v1/webhook-secrets"
        );
    }
}
