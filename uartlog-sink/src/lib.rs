//! Log sink for uartlog
//!
//! The producer-facing side of the stack: a non-blocking byte sink backed by
//! a ring buffer, the flush scheduler that drains it into the transport
//! driver, and an HCI dump adapter that frames trace packets.

pub mod config;
pub mod flush;
pub mod hci_dump;
pub mod sink;

pub use config::{
    SinkConfig, DEFAULT_BACKOFF_MS, DEFAULT_BUFFER_CAPACITY, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_MESSAGE_LEN,
};
pub use flush::{FlushScheduler, FlushTick};
pub use hci_dump::HciDump;
pub use sink::LogSink;
pub use uartlog_core::{UartLogError, UartLogResult};
