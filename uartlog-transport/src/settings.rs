//! Serial port settings

use serde::{Deserialize, Serialize};
use uartlog_core::{UartLogError, UartLogResult};

/// Default port name
#[cfg(windows)]
pub const DEFAULT_PORT: &str = r"\\.\COM44";
/// Default port name
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 500_000;

/// Parity setting, configured as 0 = none, 1 = even, 2 = odd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl TryFrom<u8> for Parity {
    type Error = UartLogError;

    fn try_from(value: u8) -> UartLogResult<Self> {
        match value {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Even),
            2 => Ok(Parity::Odd),
            _ => Err(UartLogError::ConfigRejected(format!(
                "Invalid parity {}: expected 0 (none), 1 (even) or 2 (odd)",
                value
            ))),
        }
    }
}

impl From<Parity> for u8 {
    fn from(parity: Parity) -> u8 {
        match parity {
            Parity::None => 0,
            Parity::Even => 1,
            Parity::Odd => 2,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

/// Serial port settings
///
/// Data bits and stop bits are fixed at 8 and 1. Flow control maps to the
/// RTS/CTS hardware handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub flow_control: bool,
}

impl PortSettings {
    /// Create new port settings with no parity and no flow control
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            parity: Parity::None,
            flow_control: false,
        }
    }

    /// Set the parity
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Enable or disable RTS/CTS flow control
    pub fn with_flow_control(mut self, flow_control: bool) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Check the settings before they are applied to a port
    pub fn validate(&self) -> UartLogResult<()> {
        if self.port_name.is_empty() {
            return Err(UartLogError::ConfigRejected("Port name is empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(UartLogError::ConfigRejected(
                "Baud rate must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Flow control as understood by the serial driver
    pub fn serial_flow_control(&self) -> tokio_serial::FlowControl {
        if self.flow_control {
            tokio_serial::FlowControl::Hardware
        } else {
            tokio_serial::FlowControl::None
        }
    }

    /// Build the serial port builder for these settings (8 data bits, 1 stop bit)
    pub fn builder(&self) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(&self.port_name, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(self.parity.into())
            .flow_control(self.serial_flow_control())
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_BAUD_RATE)
    }
}
