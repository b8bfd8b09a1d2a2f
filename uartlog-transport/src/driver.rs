//! Asynchronous transport driver
//!
//! Owns one physical port and runs at most one write and one read on it at
//! a time. Results are reported as [`DriverEvent`]s which the owner drains
//! after every call; the driver never calls back into its owner.
//!
//! # Write path
//!
//! ```text
//! send ──► start_write ──┬─ ImmediateComplete(n) ── all sent? ── Sent
//!              ▲         │                              │ no
//!              └─────────┼──────────────────────────────┘
//!                        ├─ Pending ──► (signal) ──► write_result
//!                        │                              ├─ StillIncomplete ─► wait again
//!                        │                              ├─ Complete(n) ───► all sent? Sent : re-issue
//!                        │                              └─ Failed ────────► Error(WriteFailed)
//!                        └─ Failed ──────────────────────────────────────► Error(WriteFailed)
//! ```
//!
//! Failed bytes are never re-queued. Every error event carries the number of
//! bytes it dropped so the owner can account for them.

use crate::port::{is_device_removed, IoCompletion, IoStart, OpenPort, PhysicalPort};
use crate::settings::PortSettings;
use crate::state::TransportState;
use std::collections::VecDeque;
use std::io;
use uartlog_core::{ReadySignal, RunLoop, SourceId, UartLogError, UartLogResult};

/// Kind of a reported transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The port is not open
    PortUnavailable,
    /// A write failed
    WriteFailed,
    /// A read failed
    ReadFailed,
    /// The port was closed while the operation was in flight
    PortClosed,
}

impl TransportErrorKind {
    /// Get human-readable kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::PortUnavailable => "PortUnavailable",
            TransportErrorKind::WriteFailed => "WriteFailed",
            TransportErrorKind::ReadFailed => "ReadFailed",
            TransportErrorKind::PortClosed => "PortClosed",
        }
    }
}

/// Notification produced by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A whole `send` buffer was transmitted
    Sent { len: usize },
    /// A read completed
    Received(Vec<u8>),
    /// An operation failed; `dropped` bytes of it were not transmitted
    Error { kind: TransportErrorKind, dropped: usize },
}

#[derive(Debug)]
struct WriteOp {
    data: Vec<u8>,
    sent: usize,
}

impl WriteOp {
    fn remaining(&self) -> usize {
        self.data.len() - self.sent
    }
}

#[derive(Debug)]
struct ReadOp {
    buf: Vec<u8>,
}

enum WriteStep {
    Done,
    Wait,
    Continue,
    Fail(io::Error),
}

/// Non-blocking transport session over a [`PhysicalPort`]
#[derive(Debug)]
pub struct TransportDriver<P> {
    port: Option<P>,
    settings: Option<PortSettings>,
    session: TransportState,
    write: Option<WriteOp>,
    read: Option<ReadOp>,
    write_signal: ReadySignal,
    read_signal: ReadySignal,
    events: VecDeque<DriverEvent>,
    last_error: Option<TransportErrorKind>,
}

impl<P: PhysicalPort> TransportDriver<P> {
    /// Create a closed driver whose readiness signals belong to `run_loop`
    pub fn new(run_loop: &mut RunLoop) -> Self {
        Self {
            port: None,
            settings: None,
            session: TransportState::Closed,
            write: None,
            read: None,
            write_signal: run_loop.signal(),
            read_signal: run_loop.signal(),
            events: VecDeque::new(),
            last_error: None,
        }
    }

    /// Current state
    ///
    /// An in-flight write is reported before an in-flight read.
    pub fn state(&self) -> TransportState {
        if self.session != TransportState::Open {
            self.session
        } else if self.write.is_some() {
            TransportState::WritePending
        } else if self.read.is_some() {
            TransportState::ReadPending
        } else {
            TransportState::Open
        }
    }

    /// Check if the port can accept a new write
    pub fn is_ready(&self) -> bool {
        self.session == TransportState::Open && self.write.is_none()
    }

    /// Settings of the open session
    pub fn settings(&self) -> Option<&PortSettings> {
        self.settings.as_ref()
    }

    /// Kind of the most recent failure
    pub fn last_error(&self) -> Option<TransportErrorKind> {
        self.last_error
    }

    /// Source id of the write readiness signal
    pub fn write_source(&self) -> SourceId {
        self.write_signal.source()
    }

    /// Source id of the read readiness signal
    pub fn read_source(&self) -> SourceId {
        self.read_signal.source()
    }

    /// Bytes of the in-flight write not yet transmitted
    pub fn bytes_in_flight(&self) -> usize {
        self.write.as_ref().map_or(0, WriteOp::remaining)
    }

    /// Pop the oldest pending event
    pub fn poll_event(&mut self) -> Option<DriverEvent> {
        self.events.pop_front()
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> impl Iterator<Item = DriverEvent> + '_ {
        self.events.drain(..)
    }

    fn set_session(&mut self, new_state: TransportState) -> UartLogResult<()> {
        self.session.validate_transition(new_state)?;
        log::debug!(
            "transport: {} -> {}",
            self.session.as_str(),
            new_state.as_str()
        );
        self.session = new_state;
        Ok(())
    }

    fn emit_error(&mut self, kind: TransportErrorKind, dropped: usize) {
        self.last_error = Some(kind);
        self.events.push_back(DriverEvent::Error { kind, dropped });
    }

    /// Take over an already acquired port
    ///
    /// Performs the same transition as [`TransportDriver::open`].
    pub fn attach(&mut self, settings: PortSettings, port: P) -> UartLogResult<()> {
        if !self.session.can_open() {
            return Err(UartLogError::InvalidState(format!(
                "Cannot attach a port in state {}",
                self.session.as_str()
            )));
        }
        self.set_session(TransportState::Opening)?;
        if let Err(err) = settings.validate() {
            self.set_session(TransportState::Error)?;
            return Err(err);
        }

        log::info!(
            "transport: port {} attached ({} baud)",
            settings.port_name,
            settings.baud_rate
        );
        self.port = Some(port);
        self.settings = Some(settings);
        self.last_error = None;
        self.set_session(TransportState::Open)
    }

    /// Start sending `data`
    ///
    /// The outcome is reported through events: exactly one `Sent` or one
    /// `Error` per call. An empty `data` on an open port reports nothing.
    ///
    /// # Returns
    /// `Err(Busy)` if a write is already in flight; `data` is not taken
    pub fn send(&mut self, data: &[u8]) -> UartLogResult<()> {
        if self.write.is_some() {
            return Err(UartLogError::Busy("A write is already in flight".to_string()));
        }
        if self.session != TransportState::Open {
            log::warn!(
                "transport: send of {} bytes while {}",
                data.len(),
                self.session.as_str()
            );
            self.emit_error(TransportErrorKind::PortUnavailable, data.len());
            return Ok(());
        }
        if data.is_empty() {
            return Ok(());
        }

        self.write = Some(WriteOp {
            data: data.to_vec(),
            sent: 0,
        });
        self.issue_write();
        Ok(())
    }

    fn issue_write(&mut self) {
        loop {
            let step = match (self.write.as_mut(), self.port.as_mut()) {
                (Some(write), Some(port)) => {
                    self.write_signal.arm();
                    let outcome = port.start_write(&write.data[write.sent..], &self.write_signal);
                    Self::advance_write(write, &self.write_signal, outcome)
                }
                _ => return,
            };
            match step {
                WriteStep::Continue => continue,
                WriteStep::Wait => return,
                WriteStep::Done => return self.finish_write(),
                WriteStep::Fail(err) => return self.fail_write(err),
            }
        }
    }

    fn advance_write(write: &mut WriteOp, signal: &ReadySignal, outcome: IoStart) -> WriteStep {
        match outcome {
            IoStart::Pending => {
                log::debug!("transport: write of {} bytes pending", write.remaining());
                WriteStep::Wait
            }
            IoStart::ImmediateComplete(n) => {
                signal.disarm();
                Self::accumulate(write, n)
            }
            IoStart::Failed(err) => {
                signal.disarm();
                WriteStep::Fail(err)
            }
        }
    }

    fn accumulate(write: &mut WriteOp, n: usize) -> WriteStep {
        // Zero progress would re-issue forever
        if n == 0 {
            return WriteStep::Fail(io::Error::from(io::ErrorKind::WriteZero));
        }
        write.sent += n.min(write.remaining());
        if write.remaining() == 0 {
            WriteStep::Done
        } else {
            log::debug!(
                "transport: partial write {} bytes, {} remaining",
                n,
                write.remaining()
            );
            WriteStep::Continue
        }
    }

    /// Handle the write readiness signal firing
    pub fn on_write_ready(&mut self) {
        if self.session != TransportState::Open {
            log::debug!("transport: write ready while {}, ignored", self.session.as_str());
            return;
        }
        let step = match (self.write.as_mut(), self.port.as_mut()) {
            (Some(write), Some(port)) => {
                self.write_signal.arm();
                match port.write_result(&write.data[write.sent..], &self.write_signal) {
                    IoCompletion::StillIncomplete => WriteStep::Wait,
                    IoCompletion::Complete(n) => {
                        self.write_signal.disarm();
                        Self::accumulate(write, n)
                    }
                    IoCompletion::Failed(err) => {
                        self.write_signal.disarm();
                        WriteStep::Fail(err)
                    }
                }
            }
            _ => {
                log::debug!("transport: write ready with no write in flight, ignored");
                return;
            }
        };
        match step {
            WriteStep::Wait => {}
            WriteStep::Done => self.finish_write(),
            WriteStep::Continue => self.issue_write(),
            WriteStep::Fail(err) => self.fail_write(err),
        }
    }

    fn finish_write(&mut self) {
        if let Some(write) = self.write.take() {
            log::debug!("transport: sent {} bytes", write.data.len());
            self.events.push_back(DriverEvent::Sent {
                len: write.data.len(),
            });
        }
    }

    fn fail_write(&mut self, err: io::Error) {
        let dropped = self.write.take().map_or(0, |write| write.remaining());
        log::error!("transport: write failed, {} bytes dropped: {}", dropped, err);
        self.emit_error(TransportErrorKind::WriteFailed, dropped);
        if is_device_removed(&err) {
            self.enter_error();
        }
    }

    /// Start reading up to `len` bytes
    ///
    /// Completes with a `Received` event carrying whatever arrived, or a
    /// `ReadFailed` error event.
    ///
    /// # Returns
    /// `Err(Busy)` if a read is already in flight
    pub fn receive(&mut self, len: usize) -> UartLogResult<()> {
        if self.read.is_some() {
            return Err(UartLogError::Busy("A read is already in flight".to_string()));
        }
        if self.session != TransportState::Open {
            self.emit_error(TransportErrorKind::PortUnavailable, 0);
            return Ok(());
        }
        if len == 0 {
            return Ok(());
        }

        let mut read = ReadOp { buf: vec![0; len] };
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };
        self.read_signal.arm();
        match port.start_read(&mut read.buf, &self.read_signal) {
            IoStart::Pending => self.read = Some(read),
            IoStart::ImmediateComplete(n) => {
                self.read_signal.disarm();
                self.finish_read(read, n);
            }
            IoStart::Failed(err) => {
                self.read_signal.disarm();
                self.fail_read(err);
            }
        }
        Ok(())
    }

    /// Handle the read readiness signal firing
    pub fn on_read_ready(&mut self) {
        if self.session != TransportState::Open {
            log::debug!("transport: read ready while {}, ignored", self.session.as_str());
            return;
        }
        let (Some(mut read), Some(port)) = (self.read.take(), self.port.as_mut()) else {
            log::debug!("transport: read ready with no read in flight, ignored");
            return;
        };
        self.read_signal.arm();
        match port.read_result(&mut read.buf, &self.read_signal) {
            IoCompletion::StillIncomplete => self.read = Some(read),
            IoCompletion::Complete(n) => {
                self.read_signal.disarm();
                self.finish_read(read, n);
            }
            IoCompletion::Failed(err) => {
                self.read_signal.disarm();
                self.fail_read(err);
            }
        }
    }

    fn finish_read(&mut self, mut read: ReadOp, n: usize) {
        if n == 0 {
            return self.fail_read(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        read.buf.truncate(n);
        log::debug!("transport: received {} bytes", n);
        self.events.push_back(DriverEvent::Received(read.buf));
    }

    fn fail_read(&mut self, err: io::Error) {
        log::error!("transport: read failed: {}", err);
        self.emit_error(TransportErrorKind::ReadFailed, 0);
        if is_device_removed(&err) {
            self.enter_error();
        }
    }

    /// Route a fired readiness signal
    ///
    /// # Returns
    /// `true` if the source belongs to this driver
    pub fn handle_ready(&mut self, source: SourceId) -> bool {
        if source == self.write_signal.source() {
            self.on_write_ready();
            true
        } else if source == self.read_signal.source() {
            self.on_read_ready();
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.write_signal.disarm();
        self.read_signal.disarm();
        if let Some(write) = self.write.take() {
            self.emit_error(TransportErrorKind::PortClosed, write.remaining());
        }
        if self.read.take().is_some() {
            self.emit_error(TransportErrorKind::PortClosed, 0);
        }
        if let Some(mut port) = self.port.take() {
            port.close();
        }
    }

    fn enter_error(&mut self) {
        log::error!("transport: device removed, releasing port");
        self.release();
        self.session = TransportState::Error;
    }

    /// Close the session
    ///
    /// In-flight operations are reported as `PortClosed`. Closing a closed
    /// driver does nothing.
    pub fn close(&mut self) {
        if self.session == TransportState::Closed {
            return;
        }
        if let Some(settings) = &self.settings {
            log::info!("transport: closing {}", settings.port_name);
        }
        self.release();
        self.session = TransportState::Closed;
    }
}

impl<P: OpenPort> TransportDriver<P> {
    /// Acquire and configure a port
    ///
    /// On `PortUnavailable` the driver returns to `Closed`; on
    /// `ConfigRejected` it ends in `Error`.
    pub fn open(&mut self, settings: PortSettings) -> UartLogResult<()> {
        if !self.session.can_open() {
            return Err(UartLogError::InvalidState(format!(
                "Cannot open a port in state {}",
                self.session.as_str()
            )));
        }
        self.set_session(TransportState::Opening)?;

        match settings.validate().and_then(|()| P::open_port(&settings)) {
            Ok(port) => {
                log::info!(
                    "transport: opened {} at {} baud",
                    settings.port_name,
                    settings.baud_rate
                );
                self.port = Some(port);
                self.settings = Some(settings);
                self.last_error = None;
                self.set_session(TransportState::Open)
            }
            Err(err) => {
                log::error!("transport: cannot open {}: {}", settings.port_name, err);
                let next = match err {
                    UartLogError::ConfigRejected(_) => TransportState::Error,
                    _ => {
                        self.last_error = Some(TransportErrorKind::PortUnavailable);
                        TransportState::Closed
                    }
                };
                self.set_session(next)?;
                Err(err)
            }
        }
    }
}
