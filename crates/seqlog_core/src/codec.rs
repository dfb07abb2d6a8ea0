//! Record framing.
//!
//! Every record is stored as a length-prefixed frame:
//!
//! ```text
//! | length (4, u32 LE) | payload (length) |
//! ```
//!
//! The codec never interprets the payload. A frame is never split across
//! segments, which is why payloads are bounded by a configured maximum.

use crate::error::{CoreError, CoreResult};
use thiserror::Error;

/// Size of the length header preceding every payload.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Why a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The header declares a length no writer could have produced.
    #[error("declared length {declared} exceeds maximum payload of {max} bytes")]
    Oversized {
        /// Length from the header.
        declared: u32,
        /// Maximum the reader accepts.
        max: u32,
    },

    /// The buffer was known to be complete but ends inside the frame.
    #[error("declared length {declared} runs past the written boundary ({available} bytes available)")]
    Truncated {
        /// Length from the header (0 if the header itself is cut).
        declared: u32,
        /// Bytes available after the header start.
        available: usize,
    },
}

/// Outcome of decoding a buffer that may still be growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A whole frame was present.
    Complete {
        /// The payload bytes.
        payload: &'a [u8],
        /// Header plus payload length.
        consumed: usize,
    },
    /// The buffer ends inside the header or payload.
    Incomplete,
}

/// Returns the framed size of a payload of `payload_len` bytes.
#[must_use]
pub const fn framed_len(payload_len: u32) -> u64 {
    payload_len as u64 + FRAME_HEADER_SIZE as u64
}

/// Frames a payload.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload exceeds `max_payload`.
pub fn encode(payload: &[u8], max_payload: u32) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max_payload)
        .ok_or_else(|| CoreError::PayloadTooLarge {
            len: payload.len(),
            max: max_payload,
        })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Reads the declared payload length from a frame header.
///
/// Returns `None` if fewer than [`FRAME_HEADER_SIZE`] bytes are available.
#[must_use]
pub fn declared_len(buf: &[u8]) -> Option<u32> {
    let header: [u8; FRAME_HEADER_SIZE] = buf.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(header))
}

/// Decodes the frame at the start of `buf`, which may end mid-frame because
/// the writer is still going (or crashed).
///
/// # Errors
///
/// Returns `Oversized` if the header declares more than `max_payload` bytes.
pub fn decode(buf: &[u8], max_payload: u32) -> Result<Frame<'_>, FrameError> {
    let Some(declared) = declared_len(buf) else {
        return Ok(Frame::Incomplete);
    };

    if declared > max_payload {
        return Err(FrameError::Oversized {
            declared,
            max: max_payload,
        });
    }

    let end = FRAME_HEADER_SIZE + declared as usize;
    if buf.len() < end {
        return Ok(Frame::Incomplete);
    }

    Ok(Frame::Complete {
        payload: &buf[FRAME_HEADER_SIZE..end],
        consumed: end,
    })
}

/// Decodes a frame from a buffer bounded by a published high-water mark.
///
/// Any incompleteness is an error here: the bytes were promised to exist.
///
/// # Errors
///
/// Returns `Oversized` or `Truncated`.
pub fn decode_complete(buf: &[u8], max_payload: u32) -> Result<(&[u8], usize), FrameError> {
    match decode(buf, max_payload)? {
        Frame::Complete { payload, consumed } => Ok((payload, consumed)),
        Frame::Incomplete => Err(FrameError::Truncated {
            declared: declared_len(buf).unwrap_or(0),
            available: buf.len(),
        }),
    }
}
