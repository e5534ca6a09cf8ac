//! miIO protocol client.
//!
//! Implements the two-round-trip call used by miIO appliances: a handshake
//! that yields the device id and server stamp, then one request encrypted
//! with AES-128-CBC keys derived from the device token, framed behind a
//! 32-byte header whose MD5 checksum binds header, token and body.

pub mod crypto;
pub mod e2e_common;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod sdk;
pub mod session;

pub use crypto::{DeviceKeys, Token};
pub use error::{FrameError, MiioError, TransportError};
pub use frame::{Frame, FrameCodec, Header};
pub use handshake::transport::TimedUdpTransport;
pub use handshake::{DatagramTransport, Handshake};
pub use sdk::{ClientConfig, MiioClient};
pub use session::{call, call_with_transport, Request, ResponseCheck};
