//! HCI packet logger on top of the sink
//!
//! Maps HCI trace records onto the sink's two channels. Packets of the five
//! H4 types are framed, log-message packets go to the text channel, anything
//! else is filtered. A record whose type byte and payload together exceed
//! the frame capacity is filtered on either channel. Filtered records are
//! counted in
//! [`SinkStatistics::packets_filtered`](uartlog_core::SinkStatistics).

use crate::config::SinkConfig;
use crate::sink::LogSink;
use std::fmt;
use uartlog_framing::{Direction, PacketType};
use uartlog_transport::PhysicalPort;

/// HCI dump adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciDump {
    forward_log_messages: bool,
    frame_capacity: usize,
    max_message_len: usize,
    max_acl_size: Option<usize>,
    max_sco_size: Option<usize>,
    max_iso_size: Option<usize>,
}

impl HciDump {
    /// Create an adapter with the filters of `config`
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            forward_log_messages: config.forward_log_messages,
            frame_capacity: config.frame_capacity,
            max_message_len: config.max_message_len,
            max_acl_size: config.max_acl_size,
            max_sco_size: config.max_sco_size,
            max_iso_size: config.max_iso_size,
        }
    }

    /// Enable or disable forwarding of formatted log messages
    pub fn set_forward_log_messages(&mut self, enabled: bool) {
        self.forward_log_messages = enabled;
    }

    pub fn forwards_log_messages(&self) -> bool {
        self.forward_log_messages
    }

    fn size_limit(&self, packet_type: PacketType) -> Option<usize> {
        match packet_type {
            PacketType::AclData => self.max_acl_size,
            PacketType::ScoData => self.max_sco_size,
            PacketType::IsoData => self.max_iso_size,
            _ => None,
        }
    }

    /// Log one HCI packet
    ///
    /// # Returns
    /// `true` if the record was queued on the sink
    pub fn log_packet<P: PhysicalPort>(
        &self,
        sink: &mut LogSink<P>,
        packet_type: u8,
        direction: Direction,
        payload: &[u8],
    ) -> bool {
        if payload.len() + 1 > self.frame_capacity {
            log::debug!(
                "hci dump: 0x{:02X} record of {} bytes over capacity {}",
                packet_type,
                payload.len() + 1,
                self.frame_capacity
            );
            sink.statistics_mut().increment_packets_filtered();
            return false;
        }

        let packet_type = match PacketType::from_byte(packet_type) {
            Ok(packet_type) => packet_type,
            Err(err) => {
                log::debug!("hci dump: {}", err);
                sink.statistics_mut().increment_packets_filtered();
                return false;
            }
        };

        if packet_type == PacketType::LogMessage {
            return sink.write_log_text(payload);
        }

        if let Some(limit) = self.size_limit(packet_type) {
            if payload.len() > limit {
                log::debug!(
                    "hci dump: {} packet of {} bytes over limit {}",
                    packet_type.as_str(),
                    payload.len(),
                    limit
                );
                sink.statistics_mut().increment_packets_filtered();
                return false;
            }
        }

        sink.write_packet(packet_type.to_byte(), direction, payload)
    }

    /// Log a formatted message through the text channel
    ///
    /// Does nothing unless forwarding is enabled. Empty messages and messages
    /// of `max_message_len` bytes or more are filtered.
    pub fn log_message<P: PhysicalPort>(
        &self,
        sink: &mut LogSink<P>,
        _level: log::Level,
        args: fmt::Arguments<'_>,
    ) -> bool {
        if !self.forward_log_messages {
            return false;
        }
        let message = fmt::format(args);
        if message.is_empty() || message.len() >= self.max_message_len {
            sink.statistics_mut().increment_packets_filtered();
            return false;
        }
        self.log_packet(
            sink,
            PacketType::LogMessage.to_byte(),
            Direction::Outgoing,
            message.as_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uartlog_core::RunLoop;
    use uartlog_transport::{MemoryPort, MemoryPortHandle, PortSettings};

    fn setup(config: SinkConfig) -> (HciDump, LogSink<MemoryPort>, MemoryPortHandle) {
        let dump = HciDump::new(&config);
        let mut sink = LogSink::with_run_loop(config, RunLoop::with_manual_clock()).unwrap();
        let (port, handle) = MemoryPort::new();
        sink.attach(PortSettings::new("mem", 500_000), port).unwrap();
        (dump, sink, handle)
    }

    fn flush(sink: &mut LogSink<MemoryPort>) {
        while !sink.is_idle() {
            sink.poll();
            let backoff = sink.config().backoff();
            sink.run_loop_mut().advance(backoff);
        }
    }

    #[test]
    fn test_h4_packets_are_framed() {
        let (dump, mut sink, handle) = setup(SinkConfig::default());
        dump.log_packet(&mut sink, 0x01, Direction::Outgoing, &[0x03, 0x0C, 0x00]);
        dump.log_packet(&mut sink, 0x04, Direction::Incoming, &[0x0E, 0x01]);
        flush(&mut sink);
        assert_eq!(handle.written(), vec![0x01, 0x03, 0x0C, 0x00, 0x04, 0x0E, 0x01]);
    }

    #[test]
    fn test_log_message_packet_goes_to_text_channel() {
        let (dump, mut sink, handle) = setup(SinkConfig::default());
        dump.log_packet(&mut sink, 0xFC, Direction::Outgoing, b"controller reset");
        flush(&mut sink);
        assert_eq!(handle.written(), b"LOG: controller reset\n");
    }

    #[test]
    fn test_unknown_and_oversized_packets_are_filtered() {
        let (dump, mut sink, handle) = setup(SinkConfig {
            max_acl_size: Some(8),
            ..SinkConfig::default()
        });
        assert!(!dump.log_packet(&mut sink, 0x42, Direction::Outgoing, &[0x00]));
        assert!(!dump.log_packet(&mut sink, 0x02, Direction::Outgoing, &[0x00; 9]));
        assert!(dump.log_packet(&mut sink, 0x02, Direction::Outgoing, &[0x00; 8]));
        flush(&mut sink);

        assert_eq!(sink.statistics().packets_filtered, 2);
        assert_eq!(sink.lost_count(), 0);
        assert_eq!(handle.written().len(), 9);
    }

    #[test]
    fn test_log_message_forwarding() {
        let (mut dump, mut sink, handle) = setup(SinkConfig {
            max_message_len: 16,
            ..SinkConfig::default()
        });
        dump.log_message(&mut sink, log::Level::Info, format_args!("dropped"));
        assert_eq!(sink.buffer_usage(), 0);

        dump.set_forward_log_messages(true);
        dump.log_message(&mut sink, log::Level::Info, format_args!("conn {}", 0x40));
        dump.log_message(&mut sink, log::Level::Info, format_args!("{}", "x".repeat(16)));
        flush(&mut sink);

        assert_eq!(handle.written(), b"LOG: conn 64\n");
        assert_eq!(sink.statistics().packets_filtered, 1);
    }

    #[test]
    fn test_records_over_frame_capacity_are_filtered() {
        let (dump, mut sink, handle) = setup(SinkConfig {
            frame_capacity: 8,
            ..SinkConfig::default()
        });
        assert!(!dump.log_packet(&mut sink, 0xFC, Direction::Outgoing, b"too long!"));
        assert!(!dump.log_packet(&mut sink, 0x04, Direction::Incoming, &[0x0E; 8]));
        assert!(dump.log_packet(&mut sink, 0xFC, Direction::Outgoing, b"fits"));
        assert!(dump.log_packet(&mut sink, 0x04, Direction::Incoming, &[0x0E; 7]));
        flush(&mut sink);

        let mut expected = b"LOG: fits\n".to_vec();
        expected.push(0x04);
        expected.extend_from_slice(&[0x0E; 7]);
        assert_eq!(handle.written(), expected);
        assert_eq!(sink.statistics().packets_filtered, 2);
        assert_eq!(sink.lost_count(), 0);
    }
}
