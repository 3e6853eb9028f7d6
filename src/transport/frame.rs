//! Length-prefixed JSON framing for remote calls.
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | RemoteCall as JSON (len)  |
//! +----------------+---------------------------+
//! ```
//!
//! A body that is not JSON breaks the stream and is an error.  A body that
//! is valid JSON but not a call this build understands (an unknown copy
//! name, a newer call, a bad field) is logged and skipped, and the frames
//! behind it are still delivered.

use super::TransportError;
use crate::protocol::{CopyKind, RemoteCall};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

pub const MAX_FRAME_LEN: usize = 1 << 20;

const HEADER_LEN: usize = 4;

pub fn encode(call: &RemoteCall) -> Result<Bytes, TransportError> {
    let body = serde_json::to_vec(call)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Accumulates raw bytes and yields complete calls.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete call, `Ok(None)` if more bytes are needed.
    pub fn next_call(&mut self) -> Result<Option<RemoteCall>, TransportError> {
        while let Some(body) = self.next_body()? {
            let value: Value = serde_json::from_slice(&body)?;
            match RemoteCall::deserialize(&value) {
                Ok(call) => return Ok(Some(call)),
                Err(e) => skip_frame(&value, &e),
            }
        }
        Ok(None)
    }

    fn next_body(&mut self) -> Result<Option<BytesMut>, TransportError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buf.advance(HEADER_LEN);
        Ok(Some(self.buf.split_to(len)))
    }
}

fn skip_frame(value: &Value, err: &serde_json::Error) {
    let call = value.get("call").and_then(Value::as_str);
    let copy = value.pointer("/args/name").and_then(Value::as_str);
    match (call, copy) {
        (Some(call), Some(name)) if CopyKind::parse(name).is_none() => {
            debug!("skipping {} of unknown copy {}", call, name);
        }
        (Some(call), _) if !["SendEvent", "DeliverEvent", "Announce"].contains(&call) => {
            debug!("skipping unknown call {}", call);
        }
        _ => warn!("skipping undecodable frame: {}", err),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
