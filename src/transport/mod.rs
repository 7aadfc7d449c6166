//! Collector transport
//!
//! Every request is a JSON POST under `https://<host>/collector/`. A send succeeds
//! only on HTTP 200 with a JSON body; anything else becomes a [`TransportError`].

pub mod dispatch;
pub mod http;
pub mod offline;

pub use dispatch::{Completion, Delivery, DispatchQueue, Outbound, DEFAULT_QUEUE_CAPACITY};
pub use http::HttpTransport;
pub use offline::{OfflineTransport, SentRequest};

use crate::error::TransportError;
use serde::Serialize;
use serde_json::Value;

pub const OPEN_SESSION_PATH: &str = "open-session/";
pub const COLLECT_EVENT_PATH: &str = "collect-event/";

/// How a send relates to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Delivered on the host's next idle tick
    Async,
    /// Delivered before returning; used for final sends during page unload
    Blocking,
    /// Delivered before returning with the regular timeout; used to open the session
    Startup,
}

/// Sends one JSON payload to a collector path
pub trait Transport {
    fn send(&self, path: &str, payload: &Value, mode: SendMode) -> Result<Value, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn send(&self, path: &str, payload: &Value, mode: SendMode) -> Result<Value, TransportError> {
        (**self).send(path, payload, mode)
    }
}

/// Base URL of the collector on `host`
pub fn collector_url(host: &str) -> String {
    format!("https://{}/collector/", host.trim_end_matches('/'))
}

/// Turn a raw HTTP response into the transport result.
///
/// Non-200 responses carry the body's JSON `error` field when there is one, else
/// the status text.
pub fn interpret_response(status: u16, status_text: &str, body: &str) -> Result<Value, TransportError> {
    if status == 200 {
        return serde_json::from_str(body)
            .map_err(|e| TransportError::new(200, format!("Malformed response: {}", e)));
    }

    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status_text.to_string());
    Err(TransportError::new(status, message))
}
