use std::fmt;

use thiserror::Error;

/// Progress of a single call. Calls only move forward; any failure ends in
/// `Failed` and every path finishes in `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Open,
    HandshakeSent,
    HandshakeParsed,
    RequestEncrypted,
    RequestSent,
    ResponseReceived,
    ResponseDecrypted,
    Closed,
    Failed(String),
}

#[derive(Debug, Error)]
#[error("invalid call state transition from {from} to {to}")]
pub struct CallStateError {
    pub from: String,
    pub to: String,
}

impl CallState {
    fn successor(&self) -> Option<CallState> {
        use CallState::*;
        match self {
            Open => Some(HandshakeSent),
            HandshakeSent => Some(HandshakeParsed),
            HandshakeParsed => Some(RequestEncrypted),
            RequestEncrypted => Some(RequestSent),
            RequestSent => Some(ResponseReceived),
            ResponseReceived => Some(ResponseDecrypted),
            ResponseDecrypted => Some(Closed),
            Closed | Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed)
    }

    pub fn transition(self, next: CallState) -> Result<CallState, CallStateError> {
        let allowed = match (&self, &next) {
            (CallState::Closed, _) => false,
            (CallState::Failed(_), CallState::Closed) => true,
            (CallState::Failed(_), _) => false,
            (_, CallState::Failed(_)) => true,
            _ => self.successor().as_ref() == Some(&next),
        };
        if allowed {
            Ok(next)
        } else {
            Err(CallStateError {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Open => write!(f, "open"),
            CallState::HandshakeSent => write!(f, "handshake_sent"),
            CallState::HandshakeParsed => write!(f, "handshake_parsed"),
            CallState::RequestEncrypted => write!(f, "request_encrypted"),
            CallState::RequestSent => write!(f, "request_sent"),
            CallState::ResponseReceived => write!(f, "response_received"),
            CallState::ResponseDecrypted => write!(f, "response_decrypted"),
            CallState::Closed => write!(f, "closed"),
            CallState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}
