//! Loopback device emulator shared by the integration tests.
//!
//! The emulator answers the handshake probe with its device id and stamp,
//! checks the request checksum, decrypts the body and replies with an
//! encrypted JSON result sealed the same way a device seals it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::crypto::{cipher, DeviceKeys, Token};
use crate::frame::{Frame, FrameCodec, Header, HEADER_LEN};

/// How the emulator reacts to traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum EmulatorBehavior {
    /// Answer the handshake and every command with `{"id":..,"result":..}`.
    Respond(Value),
    /// Never answer anything.
    Silent,
    /// Answer the handshake with a truncated reply.
    ShortHandshake,
    /// Answer commands with a frame whose checksum is wrong.
    CorruptChecksum(Value),
}

/// A request the emulator accepted, decoded from JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    pub header: Header,
    pub body: Value,
}

pub struct DeviceEmulator {
    socket: UdpSocket,
    token: Token,
    device_id: u32,
    stamp: u32,
    behavior: EmulatorBehavior,
}

/// Running emulator; aborts its task on drop.
pub struct EmulatorHandle {
    pub addr: SocketAddr,
    pub device_id: u32,
    pub stamp: u32,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    task: JoinHandle<()>,
}

impl EmulatorHandle {
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DeviceEmulator {
    /// Binds to an ephemeral loopback port with a random device id and stamp.
    pub async fn bind(token: Token, behavior: EmulatorBehavior) -> io::Result<Self> {
        let (device_id, stamp) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1..u32::MAX), rng.gen_range(1..1_000_000))
        };
        Self::bind_with(token, device_id, stamp, behavior).await
    }

    pub async fn bind_with(
        token: Token,
        device_id: u32,
        stamp: u32,
        behavior: EmulatorBehavior,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).await?;
        Ok(Self {
            socket,
            token,
            device_id,
            stamp,
            behavior,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self) -> io::Result<EmulatorHandle> {
        let addr = self.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let device_id = self.device_id;
        let stamp = self.stamp;
        let task = tokio::spawn(self.serve(requests.clone()));
        Ok(EmulatorHandle {
            addr,
            device_id,
            stamp,
            requests,
            task,
        })
    }

    async fn serve(mut self, requests: Arc<Mutex<Vec<ReceivedRequest>>>) {
        let mut buf = vec![0u8; 4096];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "emulator recv failed");
                    return;
                }
            };
            if let Some(reply) = self.handle(&buf[..len], &requests) {
                if let Err(err) = self.socket.send_to(&reply, from).await {
                    warn!(error = %err, "emulator send failed");
                }
            }
        }
    }

    fn handle(
        &mut self,
        datagram: &[u8],
        requests: &Mutex<Vec<ReceivedRequest>>,
    ) -> Option<Vec<u8>> {
        if self.behavior == EmulatorBehavior::Silent {
            return None;
        }
        let mut codec = FrameCodec;
        let mut src = BytesMut::from(datagram);
        let frame = match codec.decode_eof(&mut src) {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(err) => {
                debug!(error = %err, "emulator dropped malformed datagram");
                return None;
            }
        };

        if frame.header.is_handshake_probe() {
            if self.behavior == EmulatorBehavior::ShortHandshake {
                return Some(vec![0x21, 0x31, 0x00, 0x10]);
            }
            let reply = Header::new(0, self.device_id, self.stamp, 0).ok()?;
            return Some(reply.to_bytes().to_vec());
        }

        if frame.verify(&self.token).is_err() {
            debug!("emulator dropped request with bad checksum");
            return None;
        }
        let keys = DeviceKeys::from_token(&self.token);
        let plaintext = cipher::decrypt(&keys, &frame.body).ok()?;
        let body: Value = serde_json::from_slice(cipher::strip_padding(&plaintext)).ok()?;
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        requests.lock().push(ReceivedRequest {
            header: frame.header,
            body,
        });

        self.stamp = self.stamp.wrapping_add(1);
        let (result, corrupt) = match &self.behavior {
            EmulatorBehavior::Respond(result) => (result.clone(), false),
            EmulatorBehavior::CorruptChecksum(result) => (result.clone(), true),
            EmulatorBehavior::Silent | EmulatorBehavior::ShortHandshake => return None,
        };
        let payload = serde_json::to_vec(&json!({ "result": result, "id": id })).ok()?;
        let mut reply = Frame::seal(
            &self.token,
            0,
            self.device_id,
            self.stamp,
            cipher::encrypt(&keys, &payload),
        )
        .ok()?;
        if corrupt {
            reply.header.checksum[0] ^= 0xff;
        }
        let mut out = BytesMut::with_capacity(HEADER_LEN + reply.body.len());
        codec.encode(reply, &mut out).ok()?;
        Some(out.to_vec())
    }
}
