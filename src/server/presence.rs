use std::collections::HashMap;

use crate::common::protocol::{ConnectionId, UserId};

/// Map user_id -> active connection_id.
///
/// At most one connection per user: the last `register` wins. The registry
/// is not shared on its own; `SignalingHub` owns it behind its lock.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: HashMap<UserId, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection_id` for `user_id`, returning the connection it replaced.
    pub fn register(&mut self, user_id: &str, connection_id: &str) -> Option<ConnectionId> {
        let previous = self.users.insert(user_id.to_string(), connection_id.to_string());
        match &previous {
            Some(old) if old != connection_id => {
                log::info!("[PRESENCE] User {} moved from connection {} to {}", user_id, old, connection_id)
            }
            _ => log::info!("[PRESENCE] Registered user {} on connection {}", user_id, connection_id),
        }
        previous
    }

    /// Removes the entry for `user_id` only if it still points at `connection_id`.
    pub fn unregister(&mut self, user_id: &str, connection_id: &str) -> bool {
        match self.users.get(user_id) {
            Some(current) if current == connection_id => {
                self.users.remove(user_id);
                log::info!("[PRESENCE] Unregistered user {} (connection {})", user_id, connection_id);
                true
            }
            Some(current) => {
                log::debug!(
                    "[PRESENCE] Stale close for user {}: connection {} already replaced by {}",
                    user_id, connection_id, current
                );
                false
            }
            None => false,
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<&ConnectionId> {
        self.users.get(user_id)
    }

    /// Sorted list of online user ids.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
