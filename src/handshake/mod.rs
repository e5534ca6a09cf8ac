//! Handshake exchange and the datagram transport seam.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{MiioError, TransportError};
use crate::frame;

pub mod transport;

/// Device identity and freshness counter returned by the handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub device_id: u32,
    pub server_stamp: u32,
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handshake{{device_id: {}, server_stamp: {}}}",
            self.device_id, self.server_stamp
        )
    }
}

/// One-request/one-reply datagram transport used by the call orchestrator.
#[async_trait]
pub trait DatagramTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Sends the fixed handshake probe.
pub async fn send_probe<T>(transport: &mut T) -> Result<(), MiioError>
where
    T: DatagramTransport + Send,
{
    transport.send(&frame::build_handshake_request()).await?;
    Ok(())
}

/// Reads and parses the device's reply to the probe.
pub async fn read_reply<T>(transport: &mut T) -> Result<Handshake, MiioError>
where
    T: DatagramTransport + Send,
{
    let reply = transport.recv().await?;
    trace!(len = reply.len(), "handshake reply received");
    let handshake = frame::parse_handshake(&reply)?;
    debug!(
        device_id = handshake.device_id,
        server_stamp = handshake.server_stamp,
        "handshake complete"
    );
    Ok(handshake)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    struct OneShot {
        sent: Vec<Vec<u8>>,
        reply: Option<Vec<u8>>,
    }

    #[async_trait]
    impl DatagramTransport for OneShot {
        async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
            self.reply
                .take()
                .ok_or_else(|| TransportError::Io("no reply queued".into()))
        }
    }

    #[tokio::test]
    async fn probe_and_reply_round() {
        let mut reply = vec![0u8; 32];
        reply[..4].copy_from_slice(&[0x21, 0x31, 0x00, 0x20]);
        reply[8..12].copy_from_slice(&42u32.to_be_bytes());
        reply[12..16].copy_from_slice(&1u32.to_be_bytes());
        let mut transport = OneShot {
            sent: Vec::new(),
            reply: Some(reply),
        };

        send_probe(&mut transport).await.unwrap();
        let handshake = read_reply(&mut transport).await.unwrap();
        assert_eq!(
            handshake,
            Handshake {
                device_id: 42,
                server_stamp: 1
            }
        );
        assert_eq!(transport.sent, vec![frame::HANDSHAKE_REQUEST.to_vec()]);
        assert_eq!(
            handshake.to_string(),
            "handshake{device_id: 42, server_stamp: 1}"
        );
    }

    #[tokio::test]
    async fn short_reply_is_a_format_error() {
        let mut transport = OneShot {
            sent: Vec::new(),
            reply: Some(vec![0u8; 20]),
        };
        let err = read_reply(&mut transport).await.unwrap_err();
        assert!(matches!(
            err,
            MiioError::Format(FrameError::Length {
                expected: 32,
                got: 20
            })
        ));
    }
}
