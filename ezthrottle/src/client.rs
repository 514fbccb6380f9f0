//! HTTP client for the backend and its admission proxy.
//!
//! Every backend call goes through the proxy: the client posts an envelope to
//! `{tracktags_url}/api/v1/proxy` naming the backend route, and the proxy
//! either refuses it (rate limit, plan limit) or forwards it and returns the
//! backend's response inside `forwarded_response`.

use crate::config::ClientConfig;
use crate::engine::{
    Engine, JobRequest, JobSubmission, LocalResponse, SubmitError, Transport, TransportError,
};
use crate::errors::{EzThrottleError, RemoteRejection};
use crate::step::Target;
use crate::webhook::{MaskedSecretSet, WebhookSecretSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Status used when the proxy answers 200 but does not admit the request.
pub const STATUS_DENIED: u16 = 403;

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    scope: &'a str,
    metric_name: &'a str,
    target_url: String,
    method: &'a str,
    headers: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    forwarded_response: Option<ForwardedResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct ForwardedResponse {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    body: String,
}

impl ForwardedResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Client for job submission, local calls and webhook secret management.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct EzThrottleClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
}

impl EzThrottleClient {
    /// Creates a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Config`] for an invalid configuration and
    /// [`EzThrottleError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, EzThrottleError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Creates a client from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`] and [`Self::new`].
    pub fn from_env() -> Result<Self, EzThrottleError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns an engine that uses this client as its transport.
    #[must_use]
    pub fn engine(&self) -> Engine {
        Engine::new(Arc::new(self.clone())).with_customer_id(self.config.customer_id.clone())
    }

    async fn proxy(
        &self,
        target_url: String,
        method: &str,
        body: Option<String>,
    ) -> Result<ForwardedResponse, SubmitError> {
        let envelope = ProxyRequest {
            scope: "customer",
            metric_name: "",
            target_url,
            method,
            headers: BTreeMap::from([("Content-Type", "application/json")]),
            body,
        };

        tracing::debug!(target_url = %envelope.target_url, method, "Sending proxy request");

        let timeout = self.config.request_timeout();
        let response = self
            .http
            .post(self.config.proxy_url())
            .bearer_auth(&self.config.api_key)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(map_reqwest_error(&e, timeout)))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_at = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(|secs| chrono::Utc::now().timestamp_millis() + secs * 1000);
            let text = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());

            tracing::warn!(retry_at, error = %error, "Rate limited by proxy");
            let mut rejection = RemoteRejection::new(429, format!("Rate limited: {error}"));
            if let Some(retry_at) = retry_at {
                rejection = rejection.with_retry_at(retry_at);
            }
            return Err(rejection.into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(map_reqwest_error(&e, timeout)))?;

        if status != 200 {
            return Err(RemoteRejection::new(status, format!("Proxy request failed: {text}")).into());
        }

        let proxied: ProxyResponse = serde_json::from_str(&text).map_err(|e| {
            SubmitError::Transport(TransportError::Connection(format!(
                "malformed proxy response: {e}"
            )))
        })?;

        if proxied.status != "allowed" {
            let error = proxied.error.unwrap_or_else(|| "Unknown error".to_string());
            return Err(RemoteRejection::new(STATUS_DENIED, format!("Request denied: {error}")).into());
        }

        Ok(proxied.forwarded_response.unwrap_or_default())
    }

    /// Stores a new secret pair for the account.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::RemoteRejection`] if the backend refuses
    /// the call, or [`EzThrottleError::Transport`] if it cannot be reached.
    pub async fn create_webhook_secret(
        &self,
        secrets: &WebhookSecretSet,
    ) -> Result<(), EzThrottleError> {
        let body = serde_json::to_string(secrets)?;
        self.secret_call(self.config.webhook_secrets_url(), "POST", Some(body))
            .await
            .map(|_| ())
    }

    /// Fetches the account's secrets with all but the last characters masked.
    ///
    /// # Errors
    ///
    /// As [`Self::create_webhook_secret`], plus
    /// [`EzThrottleError::Serialization`] for an unexpected response body.
    pub async fn get_webhook_secret(&self) -> Result<MaskedSecretSet, EzThrottleError> {
        let body = self
            .secret_call(self.config.webhook_secrets_url(), "GET", None)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Promotes a new primary secret; the current primary becomes secondary.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::InvalidSecret`] for a short secret, and
    /// otherwise as [`Self::create_webhook_secret`].
    pub async fn rotate_webhook_secret(&self, new_secret: &str) -> Result<(), EzThrottleError> {
        WebhookSecretSet::new(new_secret)?;
        let body = serde_json::json!({ "new_secret": new_secret }).to_string();
        let url = format!("{}/rotate", self.config.webhook_secrets_url());
        self.secret_call(url, "POST", Some(body)).await.map(|_| ())
    }

    /// Deletes the account's secrets.
    ///
    /// # Errors
    ///
    /// As [`Self::create_webhook_secret`].
    pub async fn delete_webhook_secret(&self) -> Result<(), EzThrottleError> {
        self.secret_call(self.config.webhook_secrets_url(), "DELETE", None)
            .await
            .map(|_| ())
    }

    async fn secret_call(
        &self,
        url: String,
        method: &str,
        body: Option<String>,
    ) -> Result<String, EzThrottleError> {
        let forwarded = self
            .proxy(url, method, body)
            .await
            .map_err(|e| EzThrottleError::RemoteRejection(e.into_rejection()))?;

        if !forwarded.is_success() {
            return Err(RemoteRejection::new(
                forwarded.status_code,
                format!("Webhook secret call failed: {}", forwarded.body),
            )
            .into());
        }
        Ok(forwarded.body)
    }
}

fn map_reqwest_error(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for EzThrottleClient {
    async fn send(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<LocalResponse, TransportError> {
        let method = reqwest::Method::from_bytes(target.method.as_bytes())
            .map_err(|e| TransportError::Connection(format!("invalid method: {e}")))?;

        // The step's own deadline replaces the client-wide one.
        let mut request = self.http.request(method, &target.url).timeout(timeout);
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &target.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;

        tracing::debug!(url = %target.url, status, "Local call finished");
        Ok(LocalResponse {
            status,
            headers,
            body,
        })
    }

    async fn submit_job(&self, job: &JobRequest) -> Result<JobSubmission, SubmitError> {
        let body = serde_json::to_string(job).map_err(|e| {
            SubmitError::Transport(TransportError::Connection(format!("cannot encode job: {e}")))
        })?;

        let forwarded = self.proxy(self.config.jobs_url(), "POST", Some(body)).await?;

        if forwarded.status_code != 201 {
            return Err(RemoteRejection::new(
                forwarded.status_code,
                format!("EZThrottle job creation failed: {}", forwarded.body),
            )
            .into());
        }

        serde_json::from_str(&forwarded.body).map_err(|e| {
            SubmitError::Transport(TransportError::Connection(format!(
                "malformed job response: {e}"
            )))
        })
    }
}
