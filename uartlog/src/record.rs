//! Trace records read by the command-line tool
//!
//! One record per input line. Lines starting with `>` (host to controller)
//! or `<` (controller to host) followed by hex bytes are HCI packets whose
//! first byte is the packet type:
//!
//! ```text
//! > 01 03 0c 00
//! < 04 0e 04 01 03 0c 00
//! ```
//!
//! Every other line is log text.

use crate::pklg;
use bytes::Bytes;
use std::time::Duration;
use uartlog_core::UartLogResult;
use uartlog_framing::{Direction, PacketType};
use uartlog_sink::{HciDump, LogSink};
use uartlog_transport::PhysicalPort;

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Packet {
        packet_type: u8,
        direction: Direction,
        payload: Vec<u8>,
    },
    Text(String),
}

impl TraceRecord {
    /// Parse one input line
    ///
    /// Packet lines with malformed hex fall back to text.
    pub fn parse(line: &str) -> Self {
        let (direction, rest) = if let Some(rest) = line.strip_prefix('>') {
            (Direction::Outgoing, rest)
        } else if let Some(rest) = line.strip_prefix('<') {
            (Direction::Incoming, rest)
        } else {
            return TraceRecord::Text(line.to_string());
        };

        let bytes: Result<Vec<u8>, _> = rest
            .split_whitespace()
            .map(|token| u8::from_str_radix(token, 16))
            .collect();
        match bytes {
            Ok(bytes) if !bytes.is_empty() => TraceRecord::Packet {
                packet_type: bytes[0],
                direction,
                payload: bytes[1..].to_vec(),
            },
            _ => TraceRecord::Text(line.to_string()),
        }
    }

    /// Hand the record to the sink
    ///
    /// # Returns
    /// `true` if the sink queued it; filtered and dropped records return
    /// `false` and must not be mirrored
    pub fn submit<P: PhysicalPort>(&self, dump: &HciDump, sink: &mut LogSink<P>) -> bool {
        match self {
            TraceRecord::Packet {
                packet_type,
                direction,
                payload,
            } => dump.log_packet(sink, *packet_type, *direction, payload),
            TraceRecord::Text(text) => sink.write_log_text(text.as_bytes()),
        }
    }

    /// PacketLogger record for the local trace file
    pub fn to_packet_log(&self, timestamp: Duration) -> UartLogResult<Bytes> {
        match self {
            TraceRecord::Packet {
                packet_type,
                direction,
                payload,
            } => {
                let packet_type = PacketType::from_byte(*packet_type)?;
                Ok(pklg::encode_record(packet_type, *direction, payload, timestamp))
            }
            TraceRecord::Text(text) => Ok(pklg::encode_record(
                PacketType::LogMessage,
                Direction::Outgoing,
                text.as_bytes(),
                timestamp,
            )),
        }
    }
}
