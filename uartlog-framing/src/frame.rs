//! Frame encoding for the two wire formats and the log text channel
//!
//! # Direct format
//! ```text
//! [type:1][payload:N]
//! ```
//! The H4 layout Wireshark understands. No integrity field.
//!
//! # Checked format
//! ```text
//! [sync:2 = A5 8E][marker:1 = C5][length:2 LE]
//! [logical_type:1][direction:1][payload:N][logical_length:2 LE]
//! [crc8:1]
//! ```
//! `length` counts the payload region: header, payload and trailing logical
//! length (`N + 4`). The CRC8 covers exactly the same region.

use crate::crc8::Crc8;
use crate::packet::Direction;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uartlog_core::{UartLogError, UartLogResult};

/// Checked frame sync bytes
pub const SYNC: [u8; 2] = [0xA5, 0x8E];

/// Checked frame type marker
pub const CHECKED_MARKER: u8 = 0xC5;

/// Bytes a checked frame adds around the payload
pub const CHECKED_OVERHEAD: usize = 2 + 1 + 2 + 2 + 2 + 1;

/// Default size of the encoder's output buffer
pub const DEFAULT_FRAME_CAPACITY: usize = 1024;

/// Prefix of a log text record
pub const LOG_PREFIX: &[u8] = b"LOG: ";

/// Terminator of a log text record
pub const LOG_TERMINATOR: &[u8] = b"\n";

/// Wire format used for packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// `[type][payload]`
    #[default]
    Direct,
    /// Sync, length and CRC8 protected frame
    Checked,
}

impl FrameFormat {
    /// Encoded size of a frame carrying `payload_len` bytes
    pub fn encoded_size(&self, payload_len: usize) -> usize {
        match self {
            FrameFormat::Direct => 1 + payload_len,
            FrameFormat::Checked => CHECKED_OVERHEAD + payload_len,
        }
    }

    /// Get human-readable format name
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameFormat::Direct => "direct",
            FrameFormat::Checked => "checked",
        }
    }
}

/// Encode a direct frame
///
/// # Returns
/// `Err(FrameTooLarge)` if the frame would not fit in `capacity` bytes
pub fn encode_direct(logical_type: u8, payload: &[u8], capacity: usize) -> UartLogResult<Bytes> {
    let size = FrameFormat::Direct.encoded_size(payload.len());
    if size > capacity {
        return Err(UartLogError::FrameTooLarge { size, capacity });
    }

    let mut frame = BytesMut::with_capacity(size);
    frame.put_u8(logical_type);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Encode a checked frame
///
/// # Returns
/// `Err(FrameTooLarge)` if the frame would not fit in `capacity` bytes,
/// `Err(LengthOverflow)` if the payload region would overflow the 16-bit
/// length field
pub fn encode_checked(
    logical_type: u8,
    direction: Direction,
    payload: &[u8],
    capacity: usize,
) -> UartLogResult<Bytes> {
    let size = FrameFormat::Checked.encoded_size(payload.len());
    let region_len = 2 + payload.len() + 2;
    if size > capacity {
        return Err(UartLogError::FrameTooLarge { size, capacity });
    }
    if region_len > u16::MAX as usize {
        return Err(UartLogError::LengthOverflow {
            len: region_len,
            max: u16::MAX as usize,
        });
    }

    let mut frame = BytesMut::with_capacity(size);
    frame.put_slice(&SYNC);
    frame.put_u8(CHECKED_MARKER);
    frame.put_u16_le(region_len as u16);

    let region_start = frame.len();
    frame.put_u8(logical_type);
    frame.put_u8(direction.to_byte());
    frame.put_slice(payload);
    frame.put_u16_le(payload.len() as u16);

    let mut crc = Crc8::new();
    crc.update_bytes(&frame[region_start..]);
    frame.put_u8(crc.value());

    Ok(frame.freeze())
}

/// Build a log text record: prefix, message, terminator
///
/// The record is returned as one buffer so it can be enqueued atomically.
pub fn encode_log_text(message: &[u8]) -> Bytes {
    let mut record = BytesMut::with_capacity(LOG_PREFIX.len() + message.len() + LOG_TERMINATOR.len());
    record.put_slice(LOG_PREFIX);
    record.put_slice(message);
    record.put_slice(LOG_TERMINATOR);
    record.freeze()
}

/// Decoded view of a checked frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedFrame<'a> {
    pub logical_type: u8,
    pub direction: u8,
    pub payload: &'a [u8],
    pub crc: u8,
}

/// Validate a complete checked frame and return its fields
///
/// Checks sync bytes, marker, length field, trailing logical length and
/// CRC8.
pub fn verify_checked(frame: &[u8]) -> UartLogResult<CheckedFrame<'_>> {
    if frame.len() < CHECKED_OVERHEAD {
        return Err(UartLogError::InvalidData(format!(
            "Checked frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0..2] != SYNC {
        return Err(UartLogError::InvalidData(format!(
            "Expected sync A5 8E, got {:02X} {:02X}",
            frame[0], frame[1]
        )));
    }
    if frame[2] != CHECKED_MARKER {
        return Err(UartLogError::InvalidData(format!(
            "Expected frame marker 0x{:02X}, got 0x{:02X}",
            CHECKED_MARKER, frame[2]
        )));
    }

    let length = u16::from_le_bytes([frame[3], frame[4]]) as usize;
    if length + 6 != frame.len() {
        return Err(UartLogError::InvalidData(format!(
            "Length field {} does not match frame size {}",
            length,
            frame.len()
        )));
    }

    let region = &frame[5..5 + length];
    let crc = frame[frame.len() - 1];
    let mut calc = Crc8::new();
    calc.update_bytes(region);
    calc.validate(crc)?;

    let payload = &region[2..length - 2];
    let logical_length = u16::from_le_bytes([region[length - 2], region[length - 1]]) as usize;
    if logical_length != payload.len() {
        return Err(UartLogError::InvalidData(format!(
            "Logical length {} does not match payload size {}",
            logical_length,
            payload.len()
        )));
    }

    Ok(CheckedFrame {
        logical_type: region[0],
        direction: region[1],
        payload,
        crc,
    })
}

/// Stateless encoder bound to a format and an output capacity
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    format: FrameFormat,
    capacity: usize,
}

impl FrameEncoder {
    /// Create a new encoder
    pub fn new(format: FrameFormat, capacity: usize) -> Self {
        Self { format, capacity }
    }

    /// Active format
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Output buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Encode a logical record in the active format
    ///
    /// The direction is only carried by the checked format.
    pub fn encode(&self, logical_type: u8, direction: Direction, payload: &[u8]) -> UartLogResult<Bytes> {
        match self.format {
            FrameFormat::Direct => encode_direct(logical_type, payload, self.capacity),
            FrameFormat::Checked => encode_checked(logical_type, direction, payload, self.capacity),
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(FrameFormat::Direct, DEFAULT_FRAME_CAPACITY)
    }
}
