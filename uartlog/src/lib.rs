//! uartlog - non-blocking serial trace transport
//!
//! Ships log text and framed HCI packets out of a serial port without ever
//! blocking the producer. Bytes are buffered in a fixed-size ring, drained in
//! chunks on a cooperative run loop, and written with overlapped-style
//! non-blocking I/O. When the buffer is full or the port fails, data is
//! dropped and counted instead of stalling the caller.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `uartlog-core`: Error handling, ring buffer, run loop, loss accounting
//! - `uartlog-framing`: Direct and CRC8-checked frames, log text records
//! - `uartlog-transport`: Transport driver, serial and in-memory ports
//! - `uartlog-sink`: Log sink, flush scheduler, HCI dump adapter
//!
//! # Usage
//!
//! ```no_run
//! use uartlog::{LogSink, PortSettings, SerialPort, SinkConfig};
//!
//! # async fn run() -> uartlog::UartLogResult<()> {
//! let mut sink: LogSink<SerialPort> = LogSink::new(SinkConfig::default())?;
//! sink.open(PortSettings::new("/dev/ttyUSB0", 500_000))?;
//! sink.write_log_text(b"hello");
//! sink.run_until_idle().await?;
//! sink.deinit();
//! # Ok(())
//! # }
//! ```

pub mod pklg;
pub mod record;

pub use record::TraceRecord;

// Re-export core types
pub use uartlog_core::{
    LossCounter, ReadySignal, RingBuffer, RunLoop, SinkStatistics, SourceId, TimerId,
    UartLogError, UartLogResult, Wakeup,
};

// Re-export the sink API
pub use uartlog_sink::{FlushScheduler, FlushTick, HciDump, LogSink, SinkConfig};

// Re-export the transport API
pub use uartlog_transport::{
    DriverEvent, MemoryPort, MemoryPortHandle, Parity, PortSettings, SerialPort,
    TransportDriver, TransportErrorKind, TransportState,
};

pub mod framing {
    pub use uartlog_framing::*;
}

pub mod transport {
    pub use uartlog_transport::*;
}
