//! Core types and utilities for the uartlog transport
//!
//! This crate provides the error taxonomy, the fixed-capacity ring buffer,
//! loss accounting, and the cooperative run loop that every other layer of
//! the stack builds on.

pub mod error;
pub mod ring_buffer;
pub mod run_loop;
pub mod statistics;

pub use error::{UartLogError, UartLogResult};
pub use ring_buffer::RingBuffer;
pub use run_loop::{ReadySignal, RunLoop, SourceId, TimerId, Wakeup};
pub use statistics::{LossCounter, SinkStatistics};
