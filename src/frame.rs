//! miIO wire framing.
//!
//! Every datagram is a 32-byte big-endian header followed by an optional
//! encrypted body:
//!
//! ```text
//!  0      2      4          8           12          16                 32
//!  +------+------+----------+-----------+-----------+------------------+
//!  |magic |length| unknown  | device id |   stamp   |     checksum     |
//!  +------+------+----------+-----------+-----------+------------------+
//! ```
//!
//! The checksum is `MD5(header[0..16] || token || body)` and is written last.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::crypto::{md5_digest, Token};
use crate::error::FrameError;
use crate::handshake::Handshake;

pub const MAGIC: u16 = 0x2131;
pub const HEADER_LEN: usize = 32;
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

const CHECKSUM_OFFSET: usize = 16;

/// Fixed probe sent to open a handshake.
pub const HANDSHAKE_REQUEST: [u8; HEADER_LEN] = [
    0x21, 0x31, 0x00, 0x20, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

pub fn build_handshake_request() -> [u8; HEADER_LEN] {
    HANDSHAKE_REQUEST
}

/// Parses a handshake reply. The reply must be exactly one bare header.
pub fn parse_handshake(bytes: &[u8]) -> Result<Handshake, FrameError> {
    if bytes.len() != HEADER_LEN {
        return Err(FrameError::Length {
            expected: HEADER_LEN,
            got: bytes.len(),
        });
    }
    Ok(Handshake {
        device_id: read_u32(bytes, 8),
        server_stamp: read_u32(bytes, 12),
    })
}

/// Builds the request header for `body` and seals it with the checksum.
pub fn build_request_header(
    token: &Token,
    handshake: &Handshake,
    body: &[u8],
) -> Result<[u8; HEADER_LEN], FrameError> {
    let header = Header::new(0, handshake.device_id, handshake.server_stamp, body.len())?;
    Ok(header.sealed(token, body).to_bytes())
}

/// `MD5(header[0..16] || token || body)`.
pub fn checksum(header_prefix: &[u8], token: &Token, body: &[u8]) -> [u8; 16] {
    md5_digest(&[&header_prefix[..CHECKSUM_OFFSET], &token[..], body])
}

/// Checks the integrity field of a complete frame against `token`.
pub fn verify_checksum(frame: &[u8], token: &Token) -> Result<(), FrameError> {
    if frame.len() < HEADER_LEN {
        return Err(FrameError::Truncated(frame.len()));
    }
    let expected = checksum(frame, token, &frame[HEADER_LEN..]);
    if frame[CHECKSUM_OFFSET..HEADER_LEN] == expected {
        Ok(())
    } else {
        Err(FrameError::ChecksumMismatch)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decoded view of the 32-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u16,
    pub unknown: u32,
    pub device_id: u32,
    pub stamp: u32,
    pub checksum: [u8; 16],
}

impl Header {
    /// Header with a zeroed checksum for a body of `body_len` bytes.
    pub fn new(
        unknown: u32,
        device_id: u32,
        stamp: u32,
        body_len: usize,
    ) -> Result<Self, FrameError> {
        let total = HEADER_LEN + body_len;
        if total > MAX_FRAME_LEN {
            return Err(FrameError::Oversized(total));
        }
        Ok(Self {
            length: total as u16,
            unknown,
            device_id,
            stamp,
            checksum: [0u8; 16],
        })
    }

    /// Reads the header from the front of `bytes`, checking magic only.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Truncated(bytes.len()));
        }
        let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[CHECKSUM_OFFSET..HEADER_LEN]);
        Ok(Self {
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
            unknown: read_u32(bytes, 4),
            device_id: read_u32(bytes, 8),
            stamp: read_u32(bytes, 12),
            checksum,
        })
    }

    /// Returns a copy with the checksum computed over this header, `token` and `body`.
    pub fn sealed(mut self, token: &Token, body: &[u8]) -> Self {
        self.checksum = [0u8; 16];
        self.checksum = checksum(&self.to_bytes(), token, body);
        self
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&MAGIC.to_be_bytes());
        out[2..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..8].copy_from_slice(&self.unknown.to_be_bytes());
        out[8..12].copy_from_slice(&self.device_id.to_be_bytes());
        out[12..16].copy_from_slice(&self.stamp.to_be_bytes());
        out[CHECKSUM_OFFSET..].copy_from_slice(&self.checksum);
        out
    }

    /// True for the all-`0xFF` handshake probe.
    pub fn is_handshake_probe(&self) -> bool {
        self.length as usize == HEADER_LEN
            && self.unknown == u32::MAX
            && self.device_id == u32::MAX
            && self.stamp == u32::MAX
    }
}

/// Header plus (still encrypted) body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Frame {
    /// Frames `body` for `device_id`/`stamp` and computes the checksum.
    pub fn seal(
        token: &Token,
        unknown: u32,
        device_id: u32,
        stamp: u32,
        body: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let header = Header::new(unknown, device_id, stamp, body.len())?.sealed(token, &body);
        Ok(Self { header, body })
    }

    /// Parses a full datagram, requiring the length field to match its size.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = Header::parse(bytes)?;
        let declared = header.length as usize;
        if declared != bytes.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            header,
            body: bytes[HEADER_LEN..].to_vec(),
        })
    }

    pub fn verify(&self, token: &Token) -> Result<(), FrameError> {
        let expected = checksum(&self.header.to_bytes(), token, &self.body);
        if self.header.checksum == expected {
            Ok(())
        } else {
            Err(FrameError::ChecksumMismatch)
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// One-frame-per-datagram codec.
///
/// A datagram buffer holds exactly one frame, so a partial header is an error
/// instead of a request for more bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.is_empty() {
            return Ok(None);
        }
        let header = Header::parse(src)?;
        let declared = header.length as usize;
        if declared < HEADER_LEN || declared > src.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: src.len(),
            });
        }
        let frame = src.split_to(declared);
        Ok(Some(Frame {
            header,
            body: frame[HEADER_LEN..].to_vec(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let frame = self.decode(src)?;
        // trailing bytes beyond the declared length are dropped with the datagram
        src.advance(src.len());
        Ok(frame)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let total = HEADER_LEN + frame.body.len();
        if total > MAX_FRAME_LEN {
            return Err(FrameError::Oversized(total));
        }
        dst.reserve(total);
        dst.put_slice(&frame.header.to_bytes());
        dst.put_slice(&frame.body);
        Ok(())
    }
}
