//! Request and response frames exchanged with the device daemon
//!
//! All integers are little-endian.
//!
//! ```text
//! request:  [op u8][_ 3][payload_len u32][request_id u64][offset u64][max_len u32][_ 4][payload]
//! response: [request_id u64][status i32][_ 4][payload]
//! ```
//!
//! A response `status` is the byte count on success or a negative errno.

use crate::mpsc_queue::MAX_REQUEST_SIZE;

pub const REQUEST_HEADER_SIZE: usize = 32;
pub const RESPONSE_HEADER_SIZE: usize = 16;

/// Largest write payload that fits one request frame
pub const MAX_WRITE_PAYLOAD: usize = MAX_REQUEST_SIZE - REQUEST_HEADER_SIZE;

mod opcode {
    pub const OPEN: u8 = 1;
    pub const CLOSE: u8 = 2;
    pub const WRITE: u8 = 3;
    pub const READ: u8 = 4;
    pub const SHUTDOWN: u8 = 0xFF;
}

/// Operation carried by a request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Start a fresh session on the sender's client slot
    Open,
    /// End the sender's session
    Close,
    Write(&'a [u8]),
    Read { offset: u64, max_len: u32 },
    /// Stop the daemon loop
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame<'a> {
    pub request_id: u64,
    pub request: Request<'a>,
}

impl<'a> RequestFrame<'a> {
    pub fn new(request_id: u64, request: Request<'a>) -> Self {
        Self {
            request_id,
            request,
        }
    }

    /// Encode into `buf`; returns the frame length, or `None` if the payload
    /// does not fit
    pub fn encode(&self, buf: &mut [u8; MAX_REQUEST_SIZE]) -> Option<usize> {
        const NONE: &[u8] = &[];
        let (op, offset, max_len, payload) = match self.request {
            Request::Open => (opcode::OPEN, 0u64, 0u32, NONE),
            Request::Close => (opcode::CLOSE, 0, 0, NONE),
            Request::Write(payload) => (opcode::WRITE, 0, 0, payload),
            Request::Read { offset, max_len } => (opcode::READ, offset, max_len, NONE),
            Request::Shutdown => (opcode::SHUTDOWN, 0, 0, NONE),
        };

        if payload.len() > MAX_WRITE_PAYLOAD {
            return None;
        }

        buf[..REQUEST_HEADER_SIZE].fill(0);
        buf[0] = op;
        buf[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[8..16].copy_from_slice(&self.request_id.to_le_bytes());
        buf[16..24].copy_from_slice(&offset.to_le_bytes());
        buf[24..28].copy_from_slice(&max_len.to_le_bytes());
        buf[REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + payload.len()].copy_from_slice(payload);

        Some(REQUEST_HEADER_SIZE + payload.len())
    }

    /// Decode a frame; `None` if it is truncated or has an unknown opcode
    pub fn decode(frame: &'a [u8]) -> Option<Self> {
        if frame.len() < REQUEST_HEADER_SIZE {
            return None;
        }

        let payload_len = u32::from_le_bytes(frame[4..8].try_into().ok()?) as usize;
        let request_id = u64::from_le_bytes(frame[8..16].try_into().ok()?);
        let offset = u64::from_le_bytes(frame[16..24].try_into().ok()?);
        let max_len = u32::from_le_bytes(frame[24..28].try_into().ok()?);
        let payload = frame.get(REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + payload_len)?;

        let request = match frame[0] {
            opcode::OPEN => Request::Open,
            opcode::CLOSE => Request::Close,
            opcode::WRITE => Request::Write(payload),
            opcode::READ => Request::Read { offset, max_len },
            opcode::SHUTDOWN => Request::Shutdown,
            _ => return None,
        };

        Some(Self {
            request_id,
            request,
        })
    }
}

/// Fixed part of a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub request_id: u64,
    pub status: i32,
}

impl ResponseHeader {
    pub fn to_bytes(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut out = [0u8; RESPONSE_HEADER_SIZE];
        out[..8].copy_from_slice(&self.request_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.status.to_le_bytes());
        out
    }

    /// Split a response frame into its header and payload
    pub fn parse(frame: &[u8]) -> Option<(Self, &[u8])> {
        if frame.len() < RESPONSE_HEADER_SIZE {
            return None;
        }
        let header = Self {
            request_id: u64::from_le_bytes(frame[..8].try_into().ok()?),
            status: i32::from_le_bytes(frame[8..12].try_into().ok()?),
        };
        Some((header, &frame[RESPONSE_HEADER_SIZE..]))
    }
}
