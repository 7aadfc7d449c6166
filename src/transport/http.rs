//! HTTP transport backed by a blocking reqwest client

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TransportError};
use crate::transport::{interpret_response, SendMode, Transport};
use log::debug;
use serde_json::Value;
use std::time::Duration;

/// Posts JSON payloads to the collector
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
    request_timeout: Duration,
    unload_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_base_url(
            config.collector_url(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_millis(config.unload_timeout_ms),
        )
    }

    /// Transport against an explicit base URL (e.g. a plain-HTTP test collector)
    pub fn with_base_url(
        base_url: String,
        request_timeout: Duration,
        unload_timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            request_timeout,
            unload_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_for(&self, mode: SendMode) -> Duration {
        match mode {
            SendMode::Async | SendMode::Startup => self.request_timeout,
            SendMode::Blocking => self.unload_timeout,
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, path: &str, payload: &Value, mode: SendMode) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout_for(mode))
            .json(payload)
            .send()
            .map_err(|e| {
                debug!("POST {} failed: {}", url, e);
                TransportError::connection_timeout()
            })?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().map_err(|e| {
            debug!("reading response from {} failed: {}", url, e);
            TransportError::connection_timeout()
        })?;

        interpret_response(status.as_u16(), &status_text, &body)
    }
}
