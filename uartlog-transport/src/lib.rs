//! Transport layer for uartlog
//!
//! Provides the non-blocking transport driver and the ports it runs on:
//! - Serial ports via tokio-serial
//! - In-memory ports for virtual devices and tests

pub mod driver;
pub mod memory;
pub mod port;
pub mod serial;
pub mod settings;
pub mod state;

pub use driver::{DriverEvent, TransportDriver, TransportErrorKind};
pub use memory::{MemoryPort, MemoryPortHandle};
pub use port::{is_device_removed, IoCompletion, IoStart, OpenPort, PhysicalPort};
pub use serial::SerialPort;
pub use settings::{Parity, PortSettings, DEFAULT_BAUD_RATE, DEFAULT_PORT};
pub use state::TransportState;
pub use uartlog_core::{UartLogError, UartLogResult};
