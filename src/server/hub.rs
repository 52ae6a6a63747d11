use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::common::protocol::{ConnectionId, ServerEvent, UserId};
use crate::server::calls::CallTracker;
use crate::server::presence::PresenceRegistry;

pub type Outbound = mpsc::UnboundedSender<Message>;

pub struct WebSocketConnection {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    sender: Outbound,
}

/// Everything the socket handlers share. Only reachable through `SignalingHub::lock`.
pub struct HubState {
    // Mappa connection_id -> connessione
    connections: HashMap<ConnectionId, WebSocketConnection>,
    presence: PresenceRegistry,
    calls: CallTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub online_users: usize,
    pub connections: usize,
    pub active_calls: usize,
}

impl HubState {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            presence: PresenceRegistry::new(),
            calls: CallTracker::new(),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn calls(&self) -> &CallTracker {
        &self.calls
    }

    pub fn calls_mut(&mut self) -> &mut CallTracker {
        &mut self.calls
    }

    pub fn connection_user(&self, connection_id: &str) -> Option<&UserId> {
        self.connections.get(connection_id).and_then(|c| c.user_id.as_ref())
    }

    /// Sends `event` to a single connection. Returns false if it is gone.
    pub fn deliver(&self, connection_id: &str, event: &ServerEvent) -> bool {
        let Some(connection) = self.connections.get(connection_id) else {
            return false;
        };
        match encode(event) {
            Some(frame) => connection.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Sends `event` to the registered connection of `user_id`, if online.
    pub fn deliver_to_user(&self, user_id: &str, event: &ServerEvent) -> bool {
        match self.presence.lookup(user_id) {
            Some(connection_id) => self.deliver(connection_id, event),
            None => false,
        }
    }

    /// Sends `event` to every connection except `except`, returning how many accepted it.
    pub fn broadcast(&self, event: &ServerEvent, except: Option<&str>) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.connections
            .values()
            .filter(|c| except != Some(c.connection_id.as_str()))
            .filter(|c| c.sender.send(frame.clone()).is_ok())
            .count()
    }

    // Broadcast notifier: full replacement of the online set for every client
    fn publish_online_users(&self) {
        let online = self.presence.online_users();
        let count = online.len();
        let delivered = self.broadcast(&ServerEvent::OnlineUsers(online), None);
        log::debug!("[PRESENCE] Published {} online users to {} connections", count, delivered);
    }

    fn stats(&self) -> HubStats {
        HubStats {
            online_users: self.presence.len(),
            connections: self.connections.len(),
            active_calls: self.calls.len(),
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match event.to_json() {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            log::error!("[WS] Failed to encode server event: {}", e);
            None
        }
    }
}

/// Owner of the connection table, the presence registry and the call tracker.
///
/// Every mutation and the broadcast it triggers run under one lock, so all
/// clients see online-set updates in the order the mutations happened.
#[derive(Clone)]
pub struct SignalingHub {
    inner: Arc<Mutex<HubState>>,
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingHub {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HubState::new())) }
    }

    pub async fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().await
    }

    /// Adds a connection, registers its user (if any) and re-broadcasts the online set.
    pub async fn connect(&self, user_id: Option<UserId>, sender: Outbound) -> ConnectionId {
        let connection_id = Uuid::new_v4().to_string();
        let mut state = self.inner.lock().await;

        if let Some(user) = &user_id {
            state.presence.register(user, &connection_id);
        } else {
            log::info!("[WS] Anonymous connection {} (no userId)", connection_id);
        }
        state.connections.insert(
            connection_id.clone(),
            WebSocketConnection { connection_id: connection_id.clone(), user_id, sender },
        );
        state.publish_online_users();
        connection_id
    }

    /// Removes a connection, unregisters its user and re-broadcasts the online set.
    pub async fn disconnect(&self, connection_id: &str) {
        let mut state = self.inner.lock().await;
        let Some(connection) = state.connections.remove(connection_id) else {
            return;
        };

        if let Some(user) = &connection.user_id {
            if state.presence.unregister(user, connection_id) {
                let released = state.calls.release_user(user);
                if !released.is_empty() {
                    log::info!("[CALLS] Dropped {} call(s) of disconnected user {}", released.len(), user);
                }
            }
        }
        state.publish_online_users();
    }

    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.inner.lock().await.presence.lookup(user_id).cloned()
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.lock().await.presence.online_users()
    }

    pub async fn stats(&self) -> HubStats {
        self.inner.lock().await.stats()
    }
}
