//! Best-effort dispatch queue
//!
//! Finalized records are queued instead of sent inline so that event handlers
//! never wait on the network. The queue is bounded: when full, the oldest entry is
//! dropped so an unload never has to flush an unbounded backlog.

use crate::error::TransportError;
use crate::transport::{SendMode, Transport};
use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of sends held before the oldest is dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// What to do once a send has completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    None,
    /// Clear the form's submit guard
    ReleaseSubmitGuard,
}

/// A queued request
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub id: Uuid,
    pub path: &'static str,
    pub payload: Value,
    pub completion: Completion,
}

impl Outbound {
    pub fn new(path: &'static str, payload: Value, completion: Completion) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            payload,
            completion,
        }
    }
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub path: &'static str,
    pub completion: Completion,
    pub result: Result<Value, TransportError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Report for hosts: the collector's answer, or the failure status and message
    pub fn to_json(&self) -> Value {
        match &self.result {
            Ok(response) => json!({
                "id": self.id,
                "path": self.path,
                "ok": true,
                "response": response,
            }),
            Err(e) => json!({
                "id": self.id,
                "path": self.path,
                "ok": false,
                "status": e.status,
                "error": e.message,
            }),
        }
    }
}

/// Bounded FIFO of pending sends
#[derive(Debug)]
pub struct DispatchQueue {
    pending: VecDeque<Outbound>,
    capacity: usize,
    dropped: u64,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queue a send. If the queue was full, the evicted entry is returned as a
    /// failed delivery so its completion still runs.
    pub fn enqueue(&mut self, outbound: Outbound) -> Option<Delivery> {
        let evicted = if self.pending.len() >= self.capacity {
            self.pending.pop_front()
        } else {
            None
        };
        self.pending.push_back(outbound);

        evicted.map(|old| {
            self.dropped += 1;
            warn!("dispatch queue full, dropping {} to {}", old.id, old.path);
            Delivery {
                id: old.id,
                path: old.path,
                completion: old.completion,
                result: Err(TransportError::new(503, "Dispatch queue full")),
            }
        })
    }

    /// Deliver every queued entry in FIFO order
    pub fn pump(&mut self, transport: &dyn Transport, mode: SendMode) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(self.pending.len());
        while let Some(outbound) = self.pending.pop_front() {
            deliveries.push(Self::deliver(transport, outbound, mode));
        }
        deliveries
    }

    /// Send one request immediately, bypassing the queue
    pub fn deliver(transport: &dyn Transport, outbound: Outbound, mode: SendMode) -> Delivery {
        let result = transport.send(outbound.path, &outbound.payload, mode);
        match &result {
            Ok(_) => debug!("delivered {} to {}", outbound.id, outbound.path),
            Err(e) => warn!("send {} to {} failed: {}", outbound.id, outbound.path, e),
        }
        Delivery {
            id: outbound.id,
            path: outbound.path,
            completion: outbound.completion,
            result,
        }
    }
}
