use std::io::{Read, Write};

use serde::Serialize;
use thiserror::Error;

/// Upper bound on a single frame's payload. The wire format itself carries no
/// limit; we cap at 16 MiB so a bad length prefix cannot make us allocate
/// unbounded memory. Exceeding it poisons the connection.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    /// The peer closed the socket mid-prefix or mid-payload.
    #[error("connection closed mid-frame")]
    Truncated,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN}-byte cap")]
    Oversize(usize),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes `message` as UTF-8 JSON behind a u32 big-endian length prefix.
pub fn write_message<W: Write, T: Serialize>(w: &mut W, message: &T) -> Result<(), FramingError> {
    let payload = serde_json::to_vec(message).map_err(|e| FramingError::Io(e.into()))?;
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::Oversize(payload.len()))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame.
///
/// `Ok(None)` means the peer closed cleanly before the first prefix byte.
/// A close anywhere after that is `Truncated`. Payload bytes are read in a
/// loop, so short reads are fine. The payload is returned raw: JSON parsing
/// is the caller's problem, because a malformed payload must not kill the
/// connection while a malformed frame must.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>, FramingError> {
    let mut prefix = [0u8; 4];
    let mut got = 0;
    while got < prefix.len() {
        match r.read(&mut prefix[got..])? {
            0 if got == 0 => return Ok(None),
            0 => return Err(FramingError::Truncated),
            n => got += n,
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FramingError::Oversize(len));
    }

    let mut payload = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match r.read(&mut payload[filled..])? {
            0 => return Err(FramingError::Truncated),
            n => filled += n,
        }
    }
    Ok(Some(payload))
}

/// Frame + parse in one step, for callers (the client side) that treat any
/// failure the same way.
pub fn read_message<R: Read>(r: &mut R) -> Result<Option<serde_json::Value>, FramingError> {
    let Some(payload) = read_frame(r)? else {
        return Ok(None);
    };
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| FramingError::Io(e.into()))
}
