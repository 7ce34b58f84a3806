//! NDJSON framing codec
//!
//! One JSON object per line. The router side decodes caller frames as raw
//! `serde_json::Value` so that malformed-but-parseable messages reach the
//! dispatcher (which answers with an `error` envelope) instead of failing
//! in the transport layer.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::RouterMessage;

/// Maximum frame size (16 MB)
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Codec for the router side of the caller boundary: decodes caller frames
/// (as raw JSON values), encodes [`RouterMessage`]s.
#[derive(Debug, Default)]
pub struct RouterCodec;

impl RouterCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RouterCodec {
    type Item = serde_json::Value;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_line(src)
    }
}

impl Encoder<RouterMessage> for RouterCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RouterMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&item, dst)
    }
}

/// Codec for the caller side: decodes [`RouterMessage`]s, encodes arbitrary
/// JSON frames. Used by embedding callers and by tests.
#[derive(Debug, Default)]
pub struct CallerCodec;

impl CallerCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for CallerCodec {
    type Item = RouterMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_line(src)
    }
}

impl Encoder<serde_json::Value> for CallerCodec {
    type Error = CodecError;

    fn encode(
        &mut self,
        item: serde_json::Value,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        encode_line(&item, dst)
    }
}

/// Decode one newline-terminated JSON frame
///
/// Blank lines are skipped. A parse failure consumes the offending line, so
/// the stream survives one bad frame.
fn decode_line<T: serde::de::DeserializeOwned>(
    src: &mut BytesMut,
) -> Result<Option<T>, CodecError> {
    loop {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge {
                    size: src.len(),
                    max: MAX_FRAME_SIZE,
                });
            }
            return Ok(None);
        };

        let line = src.split_to(pos + 1);
        let trimmed = trim_line(&line);
        if trimmed.is_empty() {
            continue;
        }

        let msg: T = serde_json::from_slice(trimmed)?;
        return Ok(Some(msg));
    }
}

/// Encode one JSON frame followed by a newline
fn encode_line<T: serde::Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let data = serde_json::to_vec(item)?;

    if data.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: data.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    dst.reserve(data.len() + 1);
    dst.put_slice(&data);
    dst.put_u8(b'\n');
    Ok(())
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r' && b != b' ' && b != b'\t')
        .map(|p| p + 1)
        .unwrap_or(0);
    let start = line[..end]
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(end);
    &line[start..end]
}
