//! Room -> classifier endpoint registry

use drishti_api::RoomId;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Classifier registered for a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEndpoint {
    pub url: String,
    pub endpoint: String,
}

impl RoomEndpoint {
    /// Full upstream URL: `url` followed by `endpoint`
    pub fn target(&self) -> String {
        format!("{}{}", self.url, self.endpoint)
    }
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomEndpoint>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the classifier for `id`, replacing any previous one.
    /// A join without any url or endpoint leaves the room on the default classifier.
    pub fn register(&self, id: &str, url: &str, endpoint: &str) -> Option<RoomEndpoint> {
        if url.is_empty() && endpoint.is_empty() {
            debug!("Room '{}' joined without a classifier", id);
            return None;
        }

        let entry = RoomEndpoint {
            url: url.to_string(),
            endpoint: endpoint.to_string(),
        };
        info!("Room '{}' uses classifier {}", id, entry.target());
        self.rooms.write().insert(id.to_string(), entry)
    }

    /// Upstream URL for `id`, if one was registered
    pub fn target_for(&self, id: &str) -> Option<String> {
        self.rooms.read().get(id).map(RoomEndpoint::target)
    }

    pub fn get(&self, id: &str) -> Option<RoomEndpoint> {
        self.rooms.read().get(id).cloned()
    }

    /// Forget the classifier of `id` if the room has no members left.
    ///
    /// `member_count` is read while the registry is write-locked, so a join
    /// that registers after the count was taken cannot be lost.
    pub fn evict_if_empty(&self, id: &str, member_count: impl FnOnce() -> usize) -> Option<RoomEndpoint> {
        let mut rooms = self.rooms.write();
        if member_count() > 0 {
            debug!("Room '{}' was rejoined, keeping its classifier", id);
            return None;
        }

        let removed = rooms.remove(id);
        if removed.is_some() {
            info!("Room '{}' evicted", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}
