//! Logical packet types and directions

use serde::{Deserialize, Serialize};
use uartlog_core::{UartLogError, UartLogResult};

/// HCI packet type as carried in the H4 type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Command,
    AclData,
    ScoData,
    Event,
    IsoData,
    /// Free-form log text, never framed
    LogMessage,
}

impl PacketType {
    /// H4 type byte
    pub fn to_byte(&self) -> u8 {
        match self {
            PacketType::Command => 0x01,
            PacketType::AclData => 0x02,
            PacketType::ScoData => 0x03,
            PacketType::Event => 0x04,
            PacketType::IsoData => 0x05,
            PacketType::LogMessage => 0xFC,
        }
    }

    /// Get packet type from an H4 type byte
    pub fn from_byte(value: u8) -> UartLogResult<Self> {
        match value {
            0x01 => Ok(PacketType::Command),
            0x02 => Ok(PacketType::AclData),
            0x03 => Ok(PacketType::ScoData),
            0x04 => Ok(PacketType::Event),
            0x05 => Ok(PacketType::IsoData),
            0xFC => Ok(PacketType::LogMessage),
            _ => Err(UartLogError::InvalidData(format!(
                "Unknown packet type: 0x{:02X}",
                value
            ))),
        }
    }

    /// Get human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Command => "Command",
            PacketType::AclData => "ACL",
            PacketType::ScoData => "SCO",
            PacketType::Event => "Event",
            PacketType::IsoData => "ISO",
            PacketType::LogMessage => "Log",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = UartLogError;

    fn try_from(value: u8) -> UartLogResult<Self> {
        PacketType::from_byte(value)
    }
}

/// Direction of a logged packet relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Host to controller
    #[default]
    Outgoing,
    /// Controller to host
    Incoming,
}

impl Direction {
    /// Direction byte used in the checked frame header
    pub fn to_byte(&self) -> u8 {
        match self {
            Direction::Outgoing => 0,
            Direction::Incoming => 1,
        }
    }

    /// Map the `in` flag used by packet loggers
    pub fn from_incoming(incoming: bool) -> Self {
        if incoming {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_bytes() {
        for ty in [
            PacketType::Command,
            PacketType::AclData,
            PacketType::ScoData,
            PacketType::Event,
            PacketType::IsoData,
            PacketType::LogMessage,
        ] {
            assert_eq!(PacketType::from_byte(ty.to_byte()).unwrap(), ty);
        }
        assert!(PacketType::try_from(0x42).is_err());
    }

    #[test]
    fn test_direction_bytes() {
        assert_eq!(Direction::from_incoming(true).to_byte(), 1);
        assert_eq!(Direction::from_incoming(false).to_byte(), 0);
    }
}
