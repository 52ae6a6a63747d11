use std::time::Duration;

use crate::common::protocol::{CallId, CallRef, ClientEvent, IncomingCall, InitiateCall, ServerEvent};
use crate::server::calls::CallTransition;
use crate::server::hub::SignalingHub;

/// What the relay did with one client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `incoming-call` handed to the callee's connection.
    Delivered,
    /// Lifecycle event fanned out to this many other connections.
    Broadcast(usize),
    /// Callee not online: dropped without telling the caller.
    CalleeOffline,
    /// The sending connection has no user id, so it cannot place calls.
    NoCallerIdentity,
}

/// Routes call signaling between connections.
///
/// `initiate-call` is targeted at the callee through the presence registry;
/// `accept-call`, `decline-call` and `end-call` are fanned out to every other
/// connection. The call tracker observes each event but never blocks it.
#[derive(Clone)]
pub struct SignalingRelay {
    hub: SignalingHub,
    ring_timeout: Option<Duration>,
}

impl SignalingRelay {
    pub fn new(hub: SignalingHub, ring_timeout: Option<Duration>) -> Self {
        Self { hub, ring_timeout }
    }

    pub fn hub(&self) -> &SignalingHub {
        &self.hub
    }

    pub async fn handle(&self, connection_id: &str, event: ClientEvent) -> RelayOutcome {
        log::debug!("[RELAY] {} from {} (call {})", event.name(), connection_id, event.call_id());
        match event {
            ClientEvent::InitiateCall(invite) => self.initiate(connection_id, invite).await,
            ClientEvent::AcceptCall(call) => {
                let event = ServerEvent::CallAccepted(call.clone());
                self.fan_out(connection_id, call, CallTransition::Accept, event).await
            }
            ClientEvent::DeclineCall(call) => {
                let event = ServerEvent::CallDeclined(call.clone());
                self.fan_out(connection_id, call, CallTransition::Decline, event).await
            }
            ClientEvent::EndCall(call) => {
                let event = ServerEvent::CallEnded(call.clone());
                self.fan_out(connection_id, call, CallTransition::End, event).await
            }
        }
    }

    async fn initiate(&self, connection_id: &str, invite: InitiateCall) -> RelayOutcome {
        let mut state = self.hub.lock().await;

        let Some(caller_id) = state.connection_user(connection_id).cloned() else {
            log::warn!("[RELAY] Dropping initiate-call {} from anonymous connection {}", invite.call_id, connection_id);
            return RelayOutcome::NoCallerIdentity;
        };
        let Some(target) = state.presence().lookup(&invite.receiver_id).cloned() else {
            log::info!("[RELAY] Callee {} offline, dropping call {} from {}", invite.receiver_id, invite.call_id, caller_id);
            return RelayOutcome::CalleeOffline;
        };

        let incoming = ServerEvent::IncomingCall(IncomingCall {
            call_id: invite.call_id.clone(),
            caller_name: invite.caller_name,
            caller_image: invite.caller_image,
            caller_id: caller_id.clone(),
        });
        if !state.deliver(&target, &incoming) {
            log::info!("[RELAY] Callee {} is closing, dropping call {}", invite.receiver_id, invite.call_id);
            return RelayOutcome::CalleeOffline;
        }
        log::info!("[RELAY] Call {} ringing: {} -> {}", invite.call_id, caller_id, invite.receiver_id);

        match state.calls_mut().begin(&invite.call_id, &caller_id, &invite.receiver_id) {
            Ok(attempt) => {
                if let Some(after) = self.ring_timeout {
                    self.spawn_ring_timeout(invite.call_id, attempt, after);
                }
            }
            Err(e) => log::warn!("[CALLS] {}", e),
        }
        RelayOutcome::Delivered
    }

    async fn fan_out(
        &self,
        connection_id: &str,
        call: CallRef,
        transition: CallTransition,
        event: ServerEvent,
    ) -> RelayOutcome {
        let mut state = self.hub.lock().await;
        if let Err(e) = state.calls_mut().apply(&call.call_id, transition) {
            log::debug!("[CALLS] {}; relaying anyway", e);
        }
        let delivered = state.broadcast(&event, Some(connection_id));
        log::info!("[RELAY] Call {}: {} relayed to {} connection(s)", call.call_id, transition, delivered);
        RelayOutcome::Broadcast(delivered)
    }

    // Server-side backstop for calls nobody answers or declines
    fn spawn_ring_timeout(&self, call_id: CallId, attempt: u64, after: Duration) {
        let hub = self.hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut state = hub.lock().await;
            if let Some(record) = state.calls_mut().expire(&call_id, attempt) {
                log::info!("[RELAY] Call {} unanswered after {:?}, declining", call_id, after);
                let declined = ServerEvent::CallDeclined(CallRef::new(call_id));
                state.deliver_to_user(&record.caller_id, &declined);
                if record.callee_id != record.caller_id {
                    state.deliver_to_user(&record.callee_id, &declined);
                }
            }
        });
    }
}
