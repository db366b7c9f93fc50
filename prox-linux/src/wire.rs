//! Radio frame codec: length-prefix (4 bytes LE) + bincode `RadioFrame`.

use prox_core::Payload;
use serde::{Deserialize, Serialize};

const LEN_SIZE: usize = 4;
// Radio packets are tiny; anything bigger is not ours.
const MAX_FRAME_LEN: u32 = 1024;

/// One over-the-air transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioFrame {
    pub group: u8,
    /// Sender's transmit power level (0..=7); the receiver derives RSSI from it.
    pub transmit_power: u8,
    /// Sender clock (ms since its radio started).
    pub send_time: u32,
    /// Present only when the sender transmits its serial.
    pub serial: Option<u32>,
    pub payload: Payload,
}

pub fn encode_frame(frame: &RadioFrame) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(frame).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the frame and bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(RadioFrame, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let frame: RadioFrame = bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len])
        .map_err(FrameDecodeError::Decode)?;
    Ok((frame, LEN_SIZE + len))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
