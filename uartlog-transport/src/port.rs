//! Physical port abstraction
//!
//! A physical port performs non-blocking, overlapped-style I/O. Every
//! operation is started once and then, if it did not finish right away,
//! queried again each time its readiness signal fires.
//!
//! The port receives the signal of the operation so it can register it with
//! whatever wakes it up (a tokio reactor, a test harness). The driver arms
//! the signal before every call and disarms it when the outcome is final, so
//! a port never has to manage arming itself.

use crate::settings::PortSettings;
use std::io;
use uartlog_core::{ReadySignal, UartLogResult};

/// Outcome of starting an I/O operation
#[derive(Debug)]
pub enum IoStart {
    /// The operation completed synchronously, transferring this many bytes
    ImmediateComplete(usize),
    /// The operation is in progress; the signal fires when it can be queried
    Pending,
    /// The operation failed
    Failed(io::Error),
}

/// Outcome of querying an operation after its signal fired
#[derive(Debug)]
pub enum IoCompletion {
    /// The operation finished, transferring this many bytes
    Complete(usize),
    /// Not finished yet; the signal will fire again
    StillIncomplete,
    /// The operation failed
    Failed(io::Error),
}

/// Non-blocking byte port
#[cfg_attr(test, mockall::automock)]
pub trait PhysicalPort {
    /// Start writing `data`
    fn start_write(&mut self, data: &[u8], signal: &ReadySignal) -> IoStart;

    /// Query the write started by [`PhysicalPort::start_write`]
    ///
    /// `data` is the same buffer the write was started with.
    fn write_result(&mut self, data: &[u8], signal: &ReadySignal) -> IoCompletion;

    /// Start reading into `buf`
    fn start_read(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoStart;

    /// Query the read started by [`PhysicalPort::start_read`]
    fn read_result(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoCompletion;

    /// Release the port
    fn close(&mut self);
}

/// A port that can be acquired from settings alone
pub trait OpenPort: PhysicalPort + Sized {
    /// Acquire and configure the port
    ///
    /// # Returns
    /// `Err(PortUnavailable)` if the device cannot be acquired,
    /// `Err(ConfigRejected)` if the settings cannot be applied
    fn open_port(settings: &PortSettings) -> UartLogResult<Self>;
}

/// Check if an I/O error means the device went away
///
/// Such errors end the session rather than just the current operation.
pub fn is_device_removed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::NotFound
    )
}
