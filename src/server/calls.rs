use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::common::protocol::{CallId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Accepted,
    Declined,
    TimedOut,
    Ended,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Declined | CallState::TimedOut | CallState::Ended)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Ringing => "ringing",
            CallState::Accepted => "accepted",
            CallState::Declined => "declined",
            CallState::TimedOut => "timed-out",
            CallState::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTransition {
    Accept,
    Decline,
    Timeout,
    End,
}

impl fmt::Display for CallTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallTransition::Accept => "accept",
            CallTransition::Decline => "decline",
            CallTransition::Timeout => "timeout",
            CallTransition::End => "end",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call_id: CallId,
    pub caller_id: UserId,
    pub callee_id: UserId,
    pub state: CallState,
    pub started_at: DateTime<Utc>,
    /// Distinguishes reuses of the same call id, so a stale ring timer cannot expire a newer call.
    pub attempt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("call {0} is already in progress")]
    AlreadyActive(CallId),
    #[error("call {0} is not tracked")]
    Unknown(CallId),
    #[error("call {call_id} cannot {transition} while {from}")]
    InvalidTransition {
        call_id: CallId,
        from: CallState,
        transition: CallTransition,
    },
}

/// Explicit state per call id: ringing -> {accepted | declined | timed-out} -> ended.
///
/// Records are dropped as soon as they reach a terminal state.
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: HashMap<CallId, CallRecord>,
    next_attempt: u64,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts ringing a call and returns its attempt number.
    pub fn begin(&mut self, call_id: &str, caller_id: &str, callee_id: &str) -> Result<u64, CallError> {
        if self.calls.contains_key(call_id) {
            return Err(CallError::AlreadyActive(call_id.to_string()));
        }
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        self.calls.insert(
            call_id.to_string(),
            CallRecord {
                call_id: call_id.to_string(),
                caller_id: caller_id.to_string(),
                callee_id: callee_id.to_string(),
                state: CallState::Ringing,
                started_at: Utc::now(),
                attempt,
            },
        );
        log::debug!("[CALLS] {} ringing: {} -> {}", call_id, caller_id, callee_id);
        Ok(attempt)
    }

    /// Applies a transition and returns the updated record.
    pub fn apply(&mut self, call_id: &str, transition: CallTransition) -> Result<CallRecord, CallError> {
        let record = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::Unknown(call_id.to_string()))?;

        let next = match (record.state, transition) {
            (CallState::Ringing, CallTransition::Accept) => CallState::Accepted,
            (CallState::Ringing, CallTransition::Decline) => CallState::Declined,
            (CallState::Ringing, CallTransition::Timeout) => CallState::TimedOut,
            (CallState::Ringing | CallState::Accepted, CallTransition::End) => CallState::Ended,
            (from, transition) => {
                return Err(CallError::InvalidTransition {
                    call_id: call_id.to_string(),
                    from,
                    transition,
                })
            }
        };
        log::debug!("[CALLS] {} {} -> {}", call_id, record.state, next);
        record.state = next;
        let snapshot = record.clone();

        if next.is_terminal() {
            self.calls.remove(call_id);
        }
        Ok(snapshot)
    }

    /// Times out the call if it is still the same ringing attempt.
    pub fn expire(&mut self, call_id: &str, attempt: u64) -> Option<CallRecord> {
        match self.calls.get(call_id) {
            Some(record) if record.attempt == attempt && record.state == CallState::Ringing => {
                self.apply(call_id, CallTransition::Timeout).ok()
            }
            _ => None,
        }
    }

    /// Forgets every call involving `user_id`, returning the dropped call ids.
    pub fn release_user(&mut self, user_id: &str) -> Vec<CallId> {
        let released: Vec<CallId> = self
            .calls
            .values()
            .filter(|r| r.caller_id == user_id || r.callee_id == user_id)
            .map(|r| r.call_id.clone())
            .collect();
        for call_id in &released {
            self.calls.remove(call_id);
        }
        released
    }

    pub fn get(&self, call_id: &str) -> Option<&CallRecord> {
        self.calls.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
