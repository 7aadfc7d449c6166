//! Session identity
//!
//! The session id lives in the `trackSessionId` cookie. When it is missing the
//! manager asks the collector for one, sending the page signals, and stores the
//! answer for a day. At most one open-session request is made per page load.

use crate::clock::Millis;
use crate::signals::{PageMetadata, SignalSource, Signals};
use crate::transport::{SendMode, Transport, OPEN_SESSION_PATH};
use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SESSION_COOKIE: &str = "trackSessionId";

/// Lifetime of the session cookie
pub const SESSION_TTL_MS: Millis = 24 * 60 * 60 * 1000;

/// Cookie storage of the page
pub trait CookieJar {
    /// Value of an unexpired cookie
    fn get(&self, name: &str, now: Millis) -> Option<String>;
    fn set(&mut self, name: &str, value: &str, expires: Millis);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    value: String,
    expires: Option<Millis>,
}

/// Cookie jar speaking the `document.cookie` string format
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentCookieJar {
    cookies: BTreeMap<String, StoredCookie>,
    written: Vec<String>,
}

impl DocumentCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `document.cookie` string (`a=1; b=2`). Cookies read this way never expire.
    pub fn from_header(header: &str) -> Self {
        let mut jar = Self::new();
        for pair in header.split(';') {
            let pair = pair.trim_start();
            if let Some((name, value)) = pair.split_once('=') {
                if name.is_empty() {
                    continue;
                }
                jar.cookies.insert(
                    name.to_string(),
                    StoredCookie {
                        value: value.to_string(),
                        expires: None,
                    },
                );
            }
        }
        jar
    }

    /// The jar as a `document.cookie` string, expired cookies excluded
    pub fn header(&self, now: Millis) -> String {
        self.cookies
            .iter()
            .filter(|(_, c)| c.expires.map_or(true, |at| at > now))
            .map(|(name, c)| format!("{}={}", name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Every assignment made through [`CookieJar::set`], in browser format
    pub fn written(&self) -> &[String] {
        &self.written
    }
}

impl CookieJar for DocumentCookieJar {
    fn get(&self, name: &str, now: Millis) -> Option<String> {
        self.cookies
            .get(name)
            .filter(|c| c.expires.map_or(true, |at| at > now))
            .map(|c| c.value.clone())
    }

    fn set(&mut self, name: &str, value: &str, expires: Millis) {
        self.written.push(cookie_assignment(name, value, expires));
        self.cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires: Some(expires),
            },
        );
    }
}

/// `name=value;expires=<UTC date>;path=/`
pub fn cookie_assignment(name: &str, value: &str, expires: Millis) -> String {
    let expires = Utc
        .timestamp_millis_opt(expires)
        .single()
        .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_default();
    format!("{}={};expires={};path=/", name, value, expires)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    /// Open-session request in flight
    Pending,
    Resolved(String),
    /// The collector could not provide an id; events go out without one
    Failed,
}

#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: SessionState::NoSession,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<String> {
        match &self.state {
            SessionState::Resolved(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Resolve the session from the cookie, or open one with the collector.
    ///
    /// Only the first call does any work; later calls return the current state.
    pub fn load_session(
        &mut self,
        cookies: &mut dyn CookieJar,
        transport: &dyn Transport,
        source: Box<dyn SignalSource>,
        pixel_id: &str,
        page: &PageMetadata,
        now: Millis,
    ) -> &SessionState {
        if self.state != SessionState::NoSession {
            debug!("session already loaded: {:?}", self.state);
            return &self.state;
        }

        if let Some(id) = cookies.get(SESSION_COOKIE, now).filter(|id| !id.is_empty()) {
            info!("session {} restored from cookie", id);
            self.state = SessionState::Resolved(id);
            return &self.state;
        }

        self.state = SessionState::Pending;
        let signals = Signals::assemble(pixel_id, page, source.collect_signals());

        self.state = match transport.send(OPEN_SESSION_PATH, &signals.to_json(), SendMode::Startup) {
            Ok(response) => match session_id_from(&response) {
                Some(id) => {
                    cookies.set(SESSION_COOKIE, &id, now + SESSION_TTL_MS);
                    info!("session {} opened", id);
                    SessionState::Resolved(id)
                }
                None => {
                    warn!("open-session response has no session id: {}", response);
                    SessionState::Failed
                }
            },
            Err(e) => {
                warn!("open-session failed: {}", e);
                SessionState::Failed
            }
        };
        &self.state
    }
}

/// `sessionId` of an open-session response: a non-empty string, or a number
fn session_id_from(response: &Value) -> Option<String> {
    match response.get("sessionId")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
