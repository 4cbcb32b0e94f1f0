//! Concurrent identity-to-channel registry.

use crate::channel::Channel;
use dashmap::DashMap;
use std::sync::Arc;

/// Directory of live channels, keyed by identity.
///
/// All operations are safe to call concurrently from any number of tasks.
/// A channel is present iff it is Active or Closing; removal happens before
/// the channel is discarded so pushes to a dead identity fail fast.
pub trait ChannelMap: Send + Sync {
    /// Inserts under the channel's identity. A displaced channel with the
    /// same identity is closed (no orphaned sockets) and returned.
    fn add(&self, channel: Arc<Channel>) -> Option<Arc<Channel>>;

    /// Deletes the entry if present; no-op on a missing key.
    fn remove(&self, id: &str) -> Option<Arc<Channel>>;

    /// Deletes the entry only if it is this exact channel. Guards the exit
    /// path of a superseded channel against deregistering its successor.
    fn remove_if_same(&self, id: &str, channel: &Arc<Channel>) -> bool;

    /// Looks up a channel by identity. Never blocks on channel I/O.
    fn get(&self, id: &str) -> Option<Arc<Channel>>;

    /// Returns a point-in-time snapshot of all channels.
    fn all(&self) -> Vec<Arc<Channel>>;

    /// Returns the number of registered channels.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default [`ChannelMap`] backed by a sharded concurrent hash map, so
/// unrelated channels never contend on one global lock.
#[derive(Default)]
pub struct DashChannelMap {
    channels: DashMap<String, Arc<Channel>>,
}

impl DashChannelMap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelMap for DashChannelMap {
    fn add(&self, channel: Arc<Channel>) -> Option<Arc<Channel>> {
        let displaced = self.channels.insert(channel.id().to_string(), channel);
        if let Some(ref old) = displaced {
            tracing::debug!(id = %old.id(), "superseded channel closed");
            old.close();
        }
        displaced
    }

    fn remove(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.remove(id).map(|(_, ch)| ch)
    }

    fn remove_if_same(&self, id: &str, channel: &Arc<Channel>) -> bool {
        self.channels
            .remove_if(id, |_, current| Arc::ptr_eq(current, channel))
            .is_some()
    }

    fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.get(id).map(|entry| entry.value().clone())
    }

    fn all(&self) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.channels.len()
    }
}
