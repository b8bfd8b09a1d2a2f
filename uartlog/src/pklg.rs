//! PacketLogger trace file records
//!
//! Every record is a 13-byte header followed by the packet bytes:
//!
//! ```text
//! [length: u32 BE][seconds: u32 BE][microseconds: u32 BE][type: u8][payload]
//! ```
//!
//! `length` counts everything after itself. Log text uses type `0xFC`.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uartlog_framing::{Direction, PacketType};

/// Header size of one record
pub const HEADER_LEN: usize = 13;

/// PacketLogger record type for an HCI packet
pub fn record_type(packet_type: PacketType, direction: Direction) -> u8 {
    let incoming = direction == Direction::Incoming;
    match packet_type {
        PacketType::Command => 0x00,
        PacketType::Event => 0x01,
        PacketType::AclData => 0x02 | incoming as u8,
        PacketType::ScoData => 0x08 | incoming as u8,
        PacketType::IsoData => 0x0C | incoming as u8,
        PacketType::LogMessage => 0xFC,
    }
}

/// Build one record stamped with `timestamp` since the Unix epoch
pub fn encode_record(
    packet_type: PacketType,
    direction: Direction,
    payload: &[u8],
    timestamp: Duration,
) -> Bytes {
    let mut record = BytesMut::with_capacity(HEADER_LEN + payload.len());
    record.put_u32((HEADER_LEN - 4 + payload.len()) as u32);
    record.put_u32(timestamp.as_secs() as u32);
    record.put_u32(timestamp.subsec_micros());
    record.put_u8(record_type(packet_type, direction));
    record.put_slice(payload);
    record.freeze()
}

/// Current wall-clock time for record headers
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let record = encode_record(
            PacketType::Command,
            Direction::Outgoing,
            &[0x03, 0x0C, 0x00],
            Duration::new(0x0102_0304, 5_000),
        );
        assert_eq!(
            record.as_ref(),
            &[
                0x00, 0x00, 0x00, 0x0C, // length
                0x01, 0x02, 0x03, 0x04, // seconds
                0x00, 0x00, 0x00, 0x05, // microseconds
                0x00, // command
                0x03, 0x0C, 0x00,
            ]
        );
    }

    #[test]
    fn test_record_types_follow_direction() {
        use Direction::{Incoming, Outgoing};
        assert_eq!(record_type(PacketType::Event, Incoming), 0x01);
        assert_eq!(record_type(PacketType::AclData, Outgoing), 0x02);
        assert_eq!(record_type(PacketType::AclData, Incoming), 0x03);
        assert_eq!(record_type(PacketType::ScoData, Outgoing), 0x08);
        assert_eq!(record_type(PacketType::ScoData, Incoming), 0x09);
        assert_eq!(record_type(PacketType::IsoData, Incoming), 0x0D);
        assert_eq!(record_type(PacketType::LogMessage, Incoming), 0xFC);
    }
}
