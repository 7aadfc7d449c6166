//! In-process transport that answers like a collector and records every request.
//!
//! Used for dry-run replays and as the collector stand-in in tests.

use crate::error::TransportError;
use crate::transport::{SendMode, Transport, OPEN_SESSION_PATH};
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use uuid::Uuid;

/// A request seen by the offline transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentRequest {
    pub path: String,
    pub mode: SendMode,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct OfflineTransport {
    requests: RefCell<Vec<SentRequest>>,
    session_id: Option<String>,
    failure: RefCell<Option<TransportError>>,
    path_failures: RefCell<HashMap<String, TransportError>>,
}

impl OfflineTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer open-session with a fixed id instead of a random one
    pub fn with_session_id(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Self::default()
        }
    }

    /// Fail every following request
    pub fn fail_with(&self, error: TransportError) {
        *self.failure.borrow_mut() = Some(error);
    }

    /// Fail following requests to one path
    pub fn fail_path(&self, path: &str, error: TransportError) {
        self.path_failures.borrow_mut().insert(path.to_string(), error);
    }

    pub fn recover(&self) {
        *self.failure.borrow_mut() = None;
        self.path_failures.borrow_mut().clear();
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<SentRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn take_requests(&self) -> Vec<SentRequest> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }
}

impl Transport for OfflineTransport {
    fn send(&self, path: &str, payload: &Value, mode: SendMode) -> Result<Value, TransportError> {
        self.requests.borrow_mut().push(SentRequest {
            path: path.to_string(),
            mode,
            payload: payload.clone(),
        });

        if let Some(error) = self.failure.borrow().clone() {
            return Err(error);
        }
        if let Some(error) = self.path_failures.borrow().get(path).cloned() {
            return Err(error);
        }

        if path == OPEN_SESSION_PATH {
            let session_id = self
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            Ok(json!({ "sessionId": session_id }))
        } else {
            Ok(json!({ "status": "ok" }))
        }
    }
}
