use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type ConnectionId = String;
pub type CallId = String;

/// Eventi socket inviati dal client al server.
///
/// Every frame is `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "initiate-call")]
    InitiateCall(InitiateCall),
    #[serde(rename = "accept-call")]
    AcceptCall(CallRef),
    #[serde(rename = "decline-call")]
    DeclineCall(CallRef),
    #[serde(rename = "end-call")]
    EndCall(CallRef),
}

impl ClientEvent {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::InitiateCall(_) => "initiate-call",
            ClientEvent::AcceptCall(_) => "accept-call",
            ClientEvent::DeclineCall(_) => "decline-call",
            ClientEvent::EndCall(_) => "end-call",
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            ClientEvent::InitiateCall(invite) => &invite.call_id,
            ClientEvent::AcceptCall(r) | ClientEvent::DeclineCall(r) | ClientEvent::EndCall(r) => &r.call_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCall {
    pub receiver_id: UserId,
    pub call_id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRef {
    pub call_id: CallId,
}

impl CallRef {
    pub fn new(call_id: impl Into<CallId>) -> Self {
        Self { call_id: call_id.into() }
    }
}

/// Eventi socket inviati dal server ai client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full replacement of the online set.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<UserId>),
    #[serde(rename = "incoming-call")]
    IncomingCall(IncomingCall),
    #[serde(rename = "call-accepted")]
    CallAccepted(CallRef),
    #[serde(rename = "call-declined")]
    CallDeclined(CallRef),
    #[serde(rename = "call-ended")]
    CallEnded(CallRef),
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    pub call_id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_image: Option<String>,
    pub caller_id: UserId,
}
