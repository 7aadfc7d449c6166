//! Tracker configuration
//!
//! A page opts in by defining a global embed object (`{"cid": "...", "nodata": true}`).
//! Without it the tracker stays inert. Hosts combine the embed object with the
//! collector host they serve the tracker from.

use crate::error::TrackerError;
use crate::transport::{collector_url, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UNLOAD_TIMEOUT_MS: u64 = 1500;

/// The page-global object announcing the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Pixel identifier
    #[serde(alias = "pixelId")]
    pub cid: String,
    /// Suppress raw field values
    #[serde(default)]
    pub nodata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub pixel_id: String,
    /// Collector host, without scheme
    pub api_host: String,
    #[serde(default)]
    pub no_raw_data: bool,
    /// Maximum number of queued sends before the oldest is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for blocking sends made while the page unloads
    #[serde(default = "default_unload_timeout_ms")]
    pub unload_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_unload_timeout_ms() -> u64 {
    DEFAULT_UNLOAD_TIMEOUT_MS
}

impl TrackerConfig {
    pub fn new(pixel_id: &str, api_host: &str) -> Self {
        Self {
            pixel_id: pixel_id.to_string(),
            api_host: api_host.to_string(),
            no_raw_data: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            unload_timeout_ms: DEFAULT_UNLOAD_TIMEOUT_MS,
        }
    }

    pub fn from_embed(embed: &EmbedConfig, api_host: &str) -> Result<Self, TrackerError> {
        let config = Self {
            no_raw_data: embed.nodata,
            ..Self::new(&embed.cid, api_host)
        };
        config.validate()?;
        Ok(config)
    }

    /// Build from the page-global embed object. `Ok(None)` when the page did not
    /// define one (absent or `null`).
    pub fn from_global(global: Option<&Value>, api_host: &str) -> Result<Option<Self>, TrackerError> {
        match global {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let embed: EmbedConfig = serde_json::from_value(value.clone())?;
                Self::from_embed(&embed, api_host).map(Some)
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.pixel_id.trim().is_empty() {
            return Err(TrackerError::InvalidConfig("pixel id is empty".to_string()));
        }
        if self.api_host.trim().is_empty() {
            return Err(TrackerError::InvalidConfig("api host is empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(TrackerError::InvalidConfig("queue capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn collector_url(&self) -> String {
        collector_url(&self.api_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_global_is_inert() {
        assert!(TrackerConfig::from_global(None, "c.example").unwrap().is_none());
        assert!(TrackerConfig::from_global(Some(&Value::Null), "c.example").unwrap().is_none());
    }

    #[test]
    fn test_embed_object() {
        let global = json!({"cid": "px-1", "nodata": true});
        let config = TrackerConfig::from_global(Some(&global), "c.example").unwrap().unwrap();

        assert_eq!(config.pixel_id, "px-1");
        assert!(config.no_raw_data);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.collector_url(), "https://c.example/collector/");
    }

    #[test]
    fn test_nodata_defaults_to_false() {
        let global = json!({"cid": "px-1"});
        let config = TrackerConfig::from_global(Some(&global), "c.example").unwrap().unwrap();
        assert!(!config.no_raw_data);
    }

    #[test]
    fn test_invalid_embed() {
        let global = json!({"nodata": true});
        assert!(TrackerConfig::from_global(Some(&global), "c.example").is_err());

        let global = json!({"cid": "  "});
        assert!(matches!(
            TrackerConfig::from_global(Some(&global), "c.example"),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_file_defaults() {
        let config = TrackerConfig::from_json(r#"{"pixel_id": "px", "api_host": "h"}"#).unwrap();
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.unload_timeout_ms, DEFAULT_UNLOAD_TIMEOUT_MS);

        assert!(TrackerConfig::from_json(r#"{"pixel_id": "px", "api_host": "h", "queue_capacity": 0}"#).is_err());
    }
}
