//! History navigation listener registry
//!
//! Single-page apps change routes through a history push without a real submit or
//! unload. Instead of wrapping the host's push primitive, the host routes pushes
//! through a [`NavigationHub`]: listeners run first, then the original backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One history push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationEvent {
    pub state: serde_json::Value,
    pub url: Option<String>,
}

impl NavigationEvent {
    pub fn to(url: &str) -> Self {
        Self {
            state: serde_json::Value::Null,
            url: Some(url.to_string()),
        }
    }
}

/// The host's original history push behavior
pub trait HistoryBackend {
    fn push_state(&mut self, event: &NavigationEvent);
}

/// Backend for hosts with no history of their own
#[derive(Debug, Default)]
pub struct DetachedHistory;

impl HistoryBackend for DetachedHistory {
    fn push_state(&mut self, _event: &NavigationEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&NavigationEvent)>;

/// Registry of history push listeners wrapping the original backend once
#[derive(Default)]
pub struct NavigationHub {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
    backend: Option<Box<dyn HistoryBackend>>,
}

impl fmt::Debug for NavigationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationHub")
            .field("listeners", &self.listeners.len())
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl NavigationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the host's original push behavior. Returns `false` and keeps the
    /// existing backend if the hub is already installed.
    pub fn install(&mut self, backend: Box<dyn HistoryBackend>) -> bool {
        if self.backend.is_some() {
            return false;
        }
        self.backend = Some(backend);
        true
    }

    pub fn is_installed(&self) -> bool {
        self.backend.is_some()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&NavigationEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Notify every listener in subscription order, then run the original push
    pub fn push_state(&mut self, event: &NavigationEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.push_state(event);
        }
    }
}
