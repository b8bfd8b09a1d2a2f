//! Transmit-path framing for the uartlog transport
//!
//! Turns logical records (packet type, direction, payload) into the bytes
//! that get enqueued for transmission:
//!
//! - **Direct frames**: `[type][payload]`, H4 compatible
//! - **Checked frames**: sync, length and CRC8 protected
//! - **Log text**: `LOG: <message>\n`, no framing at all

pub mod crc8;
pub mod frame;
pub mod packet;

pub use crc8::{crc8, Crc8};
pub use frame::{
    encode_checked, encode_direct, encode_log_text, verify_checked, CheckedFrame, FrameEncoder,
    FrameFormat, CHECKED_MARKER, CHECKED_OVERHEAD, DEFAULT_FRAME_CAPACITY, LOG_PREFIX,
    LOG_TERMINATOR, SYNC,
};
pub use packet::{Direction, PacketType};
