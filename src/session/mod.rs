//! Single-call orchestration.
//!
//! A call opens its own socket, performs a fresh handshake, derives keys from
//! the token, sends one encrypted request and decrypts one response. Nothing
//! is cached between calls and the socket is dropped on every exit path.

use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::crypto::{cipher, DeviceKeys, Token};
use crate::error::{FrameError, MiioError};
use crate::frame::{self, Frame, HEADER_LEN};
use crate::handshake::transport::{TimedUdpTransport, DEFAULT_PORT};
use crate::handshake::{self, DatagramTransport};

pub mod state;
use state::{CallState, CallStateError};

/// Request id carried by every call.
pub const REQUEST_ID: i16 = 1;

/// Whether the response header checksum is validated before decrypting.
///
/// `Skip` matches what deployed clients do; `Verify` rejects responses whose
/// checksum does not cover the token and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseCheck {
    #[default]
    Skip,
    Verify,
}

/// JSON request body, serialized as `{"id":1,"method":..,"params":[..]}`.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: i16,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl<'a> Request<'a> {
    pub fn new(method: &'a str, params: &'a [Value]) -> Self {
        Self {
            id: REQUEST_ID,
            method,
            params,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MiioError> {
        serde_json::to_vec(self).map_err(|e| MiioError::Encoding(e.to_string()))
    }
}

/// Calls `method` on the device at `ip` (UDP port 54321).
///
/// Returns the decrypted response body including its trailing PKCS#7 padding.
/// Use [`cipher::strip_padding`] to obtain the bare JSON.
pub async fn call(
    ip: IpAddr,
    token: &Token,
    method: &str,
    params: &[Value],
) -> Result<Vec<u8>, MiioError> {
    let mut transport = TimedUdpTransport::open(SocketAddr::new(ip, DEFAULT_PORT)).await?;
    call_with_transport(
        &mut transport,
        token,
        &Request::new(method, params),
        ResponseCheck::Skip,
    )
    .await
}

/// Runs one call over an already opened transport.
pub async fn call_with_transport<T>(
    transport: &mut T,
    token: &Token,
    request: &Request<'_>,
    check: ResponseCheck,
) -> Result<Vec<u8>, MiioError>
where
    T: DatagramTransport + Send,
{
    let payload = request.to_json()?;
    let mut call = CallSession::new(token, check);
    match call.run(transport, &payload).await {
        Ok(plaintext) => {
            call.advance(CallState::Closed)?;
            debug!(
                method = request.method,
                response_len = plaintext.len(),
                "call complete"
            );
            Ok(plaintext)
        }
        Err(err) => {
            call.fail(&err);
            warn!(method = request.method, error = %err, "call failed");
            Err(err)
        }
    }
}

struct CallSession<'a> {
    token: &'a Token,
    check: ResponseCheck,
    state: CallState,
}

impl<'a> CallSession<'a> {
    fn new(token: &'a Token, check: ResponseCheck) -> Self {
        Self {
            token,
            check,
            state: CallState::Open,
        }
    }

    fn advance(&mut self, next: CallState) -> Result<(), CallStateError> {
        self.state = self.state.clone().transition(next)?;
        trace!(state = %self.state, "call state");
        Ok(())
    }

    fn fail(&mut self, err: &MiioError) {
        let closed = self
            .advance(CallState::Failed(err.to_string()))
            .and_then(|()| self.advance(CallState::Closed));
        if let Err(state_err) = closed {
            warn!(error = %state_err, "failed call could not be closed");
        }
    }

    async fn run<T>(&mut self, transport: &mut T, payload: &[u8]) -> Result<Vec<u8>, MiioError>
    where
        T: DatagramTransport + Send,
    {
        handshake::send_probe(transport).await?;
        self.advance(CallState::HandshakeSent)?;
        let handshake = handshake::read_reply(transport).await?;
        self.advance(CallState::HandshakeParsed)?;

        let keys = DeviceKeys::from_token(self.token);
        let body = cipher::encrypt(&keys, payload);
        let header = frame::build_request_header(self.token, &handshake, &body)?;
        let mut request = Vec::with_capacity(HEADER_LEN + body.len());
        request.extend_from_slice(&header);
        request.extend_from_slice(&body);
        self.advance(CallState::RequestEncrypted)?;

        transport.send(&request).await?;
        self.advance(CallState::RequestSent)?;

        let response = transport.recv().await?;
        self.advance(CallState::ResponseReceived)?;
        if response.len() < HEADER_LEN {
            return Err(FrameError::Truncated(response.len()).into());
        }
        if self.check == ResponseCheck::Verify {
            Frame::parse(&response)?.verify(self.token)?;
        }
        let plaintext = cipher::decrypt(&keys, &response[HEADER_LEN..])?;
        self.advance(CallState::ResponseDecrypted)?;
        Ok(plaintext)
    }
}
