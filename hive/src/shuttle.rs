//! Outbound transports, keyed by the top-level routing segment of an address.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{debug, error, message::Envelope, store::Store, trace};

/// Fire-and-forget delivery of messages leaving a runtime.
///
/// A shuttle makes at most one delivery attempt and reports nothing back.
pub trait Shuttle: Send + Sync {
    /// Top-level address segment this shuttle delivers to.
    fn prefix(&self) -> &str;

    fn send(&self, messages: Vec<Envelope>);
}

/// Registry of outbound shuttles shared by every worker.
///
/// Shuttles may be added and removed while workers are routing; a message
/// whose prefix has no shuttle is dropped.
#[derive(Default)]
pub struct Shuttles(RwLock<FxHashMap<String, Arc<dyn Shuttle>>>);

/// Hands messages to async code over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelShuttle {
    prefix: String,
    tx: UnboundedSender<Envelope>,
}

/// Inbound side of a runtime: messages sent here become store work.
#[derive(Clone)]
pub struct StoreShuttle {
    prefix: String,
    store: Arc<dyn Store>,
}

// Implementations

impl Shuttles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `shuttle`, returning the one it replaces.
    pub fn insert(&self, shuttle: Arc<dyn Shuttle>) -> Option<Arc<dyn Shuttle>> {
        let prefix = shuttle.prefix().to_string();
        debug!("registered shuttle for {prefix}");

        self.0.write().insert(prefix, shuttle)
    }

    pub fn remove(&self, prefix: &str) -> Option<Arc<dyn Shuttle>> {
        self.0.write().remove(prefix)
    }

    pub fn get(&self, prefix: &str) -> Option<Arc<dyn Shuttle>> {
        self.0.read().get(prefix).cloned()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.0.read().contains_key(prefix)
    }

    /// Hand `messages` to the shuttle registered for `prefix`, if any.
    pub fn deliver(&self, prefix: &str, messages: Vec<Envelope>) {
        // Lock is released before the shuttle runs
        let Some(shuttle) = self.get(prefix) else {
            debug!("no shuttle for {prefix}, dropping {} messages", messages.len());
            return;
        };

        trace!("shuttling {} messages to {prefix}", messages.len());
        shuttle.send(messages);
    }
}

impl std::fmt::Debug for Shuttles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.read().keys()).finish()
    }
}

impl ChannelShuttle {
    pub fn new(prefix: impl Into<String>) -> (Self, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                prefix: prefix.into(),
                tx,
            },
            rx,
        )
    }
}

impl Shuttle for ChannelShuttle {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Envelope>) {
        for message in messages {
            if self.tx.send(message).is_err() {
                debug!("receiver of {} is gone", self.prefix);
                return;
            }
        }
    }
}

impl StoreShuttle {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }
}

impl Shuttle for StoreShuttle {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Envelope>) {
        if let Err(e) = self.store.put_messages(messages) {
            error!("failed to enqueue inbound messages for {}: {e}", self.prefix);
        }
    }
}

impl std::fmt::Debug for StoreShuttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreShuttle")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
