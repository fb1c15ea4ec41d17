//! Live broadcast registry
//!
//! Each connection is an mpsc receiver handed to whatever transport serves it
//! (websocket, SSE). Broadcast never blocks: a receiver that is gone or full
//! counts as a write failure and is dropped from the registry.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub type ConnectionId = u64;

pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

pub struct ConnectionRegistry {
    name: &'static str,
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(name: &'static str) -> Self {
        Self::with_buffer(name, DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(name: &'static str, buffer: usize) -> Self {
        Self {
            name,
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(id, tx);
        debug!("🔌 {} connection {} registered ({} live)", self.name, id, self.connections.len());
        (id, rx)
    }

    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            debug!("🔌 {} connection {} unregistered", self.name, id);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the number of connections the message was queued for
    pub fn broadcast<T: Serialize>(&self, message: &T) -> usize {
        if self.connections.is_empty() {
            return 0;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {} broadcast: {}", self.name, e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            match entry.value().try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) | Err(TrySendError::Full(_)) => {
                    dead.push(*entry.key())
                }
            }
        }

        // Removal happens after iteration; holding a shard read guard while removing deadlocks
        for id in dead {
            self.connections.remove(&id);
            debug!("🔌 {} connection {} dropped after failed write", self.name, id);
        }

        delivered
    }
}
