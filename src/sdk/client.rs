use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::crypto::{cipher, Token};
use crate::error::MiioError;
use crate::handshake::transport::{TimedUdpTransport, DEFAULT_PORT, MAX_DATAGRAM, RECV_TIMEOUT};
use crate::session::{self, Request, ResponseCheck};

/// Tunables for [`MiioClient`]. Defaults are the protocol constants.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub port: u16,
    pub recv_timeout: Duration,
    pub max_datagram: usize,
    pub response_check: ResponseCheck,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            recv_timeout: RECV_TIMEOUT,
            max_datagram: MAX_DATAGRAM,
            response_check: ResponseCheck::Skip,
        }
    }
}

/// Parses the 32-character hex form of a device token.
pub fn parse_token(hex: &str) -> Result<Token, MiioError> {
    let hex = hex.trim();
    if hex.len() != 32 || !hex.is_ascii() {
        return Err(MiioError::InvalidToken(format!(
            "expected 32 hex characters, got {}",
            hex.len()
        )));
    }
    let mut token = [0u8; 16];
    for (i, byte) in token.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| MiioError::InvalidToken(e.to_string()))?;
    }
    Ok(token)
}

/// Handle to one device. Holds no socket; every call opens its own.
///
/// # Guarantees
/// * Each call performs a fresh handshake and key derivation.
/// * The socket is released before the call returns, on success or error.
#[derive(Debug, Clone)]
pub struct MiioClient {
    peer: SocketAddr,
    token: Token,
    config: ClientConfig,
}

impl MiioClient {
    pub fn new(ip: IpAddr, token: Token) -> Self {
        Self::with_config(ip, token, ClientConfig::default())
    }

    pub fn with_config(ip: IpAddr, token: Token, config: ClientConfig) -> Self {
        Self {
            peer: SocketAddr::new(ip, config.port),
            token,
            config,
        }
    }

    /// Builds a client from the hex token string printed by device tooling.
    pub fn from_hex_token(ip: IpAddr, token: &str) -> Result<Self, MiioError> {
        Ok(Self::new(ip, parse_token(token)?))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `method` and returns the decrypted body with its padding intact.
    ///
    /// # Errors
    /// `MiioError::Transport` for socket failures and timeouts,
    /// `MiioError::Format` for malformed handshake or response frames and
    /// `MiioError::Encoding` when the request cannot be serialized.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Vec<u8>, MiioError> {
        let mut transport = TimedUdpTransport::with_limits(
            self.peer,
            self.config.recv_timeout,
            self.config.max_datagram,
        )
        .await?;
        session::call_with_transport(
            &mut transport,
            &self.token,
            &Request::new(method, params),
            self.config.response_check,
        )
        .await
    }

    /// Like [`MiioClient::call`] but strips padding and parses the body as JSON.
    pub async fn call_json(&self, method: &str, params: &[Value]) -> Result<Value, MiioError> {
        let raw = self.call(method, params).await?;
        let body = trim_trailing_nul(cipher::strip_padding(&raw));
        debug!(peer = %self.peer, len = body.len(), "decoding response json");
        serde_json::from_slice(body).map_err(|e| MiioError::Decode(e.to_string()))
    }
}

// some firmware terminates the JSON with NUL bytes before padding
fn trim_trailing_nul(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &buf[..end]
}
