//! In-memory port
//!
//! Captures everything written and serves reads from an inbound queue. Used
//! for virtual ports and end-to-end tests of the sink.

use crate::port::{IoCompletion, IoStart, PhysicalPort};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use uartlog_core::ReadySignal;

#[derive(Debug, Default)]
struct Shared {
    written: Vec<u8>,
    write_calls: usize,
    write_limit: Option<usize>,
    inbound: VecDeque<u8>,
    read_waiter: Option<ReadySignal>,
    disconnected: bool,
    closed: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Inspection and control handle of a [`MemoryPort`]
#[derive(Debug, Clone)]
pub struct MemoryPortHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPortHandle {
    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared).written.clone()
    }

    /// Take everything written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.shared).written)
    }

    /// Number of write calls the port accepted
    pub fn write_calls(&self) -> usize {
        lock(&self.shared).write_calls
    }

    /// Queue bytes for the reader and wake a pending read
    pub fn push_inbound(&self, data: &[u8]) {
        let waiter = {
            let mut shared = lock(&self.shared);
            shared.inbound.extend(data.iter().copied());
            shared.read_waiter.take()
        };
        if let Some(signal) = waiter {
            signal.fire();
        }
    }

    /// Make every further operation fail as if the device was unplugged
    pub fn disconnect(&self) {
        let waiter = {
            let mut shared = lock(&self.shared);
            shared.disconnected = true;
            shared.read_waiter.take()
        };
        if let Some(signal) = waiter {
            signal.fire();
        }
    }

    /// Check if the port was closed by its owner
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }
}

/// Port that keeps its traffic in memory
///
/// Writes always complete immediately. With a write limit, each write call
/// accepts at most that many bytes, which exercises partial completion.
#[derive(Debug)]
pub struct MemoryPort {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPort {
    /// Create a port and its handle
    pub fn new() -> (Self, MemoryPortHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            MemoryPortHandle { shared },
        )
    }

    /// Create a port that accepts at most `limit` bytes per write call
    pub fn with_write_limit(limit: usize) -> (Self, MemoryPortHandle) {
        let (port, handle) = Self::new();
        lock(&port.shared).write_limit = Some(limit);
        (port, handle)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut shared = lock(&self.shared);
        if shared.disconnected {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let n = shared.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        shared.written.extend_from_slice(&data[..n]);
        shared.write_calls += 1;
        Ok(n)
    }

    /// `None` means nothing to read yet and the signal has been stored
    fn read(&mut self, buf: &mut [u8], signal: &ReadySignal) -> Option<io::Result<usize>> {
        let mut shared = lock(&self.shared);
        if shared.disconnected {
            return Some(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        if shared.inbound.is_empty() {
            shared.read_waiter = Some(signal.clone());
            return None;
        }
        let n = buf.len().min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Some(Ok(n))
    }
}

impl PhysicalPort for MemoryPort {
    fn start_write(&mut self, data: &[u8], _signal: &ReadySignal) -> IoStart {
        match self.write(data) {
            Ok(n) => IoStart::ImmediateComplete(n),
            Err(e) => IoStart::Failed(e),
        }
    }

    fn write_result(&mut self, data: &[u8], _signal: &ReadySignal) -> IoCompletion {
        match self.write(data) {
            Ok(n) => IoCompletion::Complete(n),
            Err(e) => IoCompletion::Failed(e),
        }
    }

    fn start_read(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoStart {
        match self.read(buf, signal) {
            Some(Ok(n)) => IoStart::ImmediateComplete(n),
            Some(Err(e)) => IoStart::Failed(e),
            None => IoStart::Pending,
        }
    }

    fn read_result(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoCompletion {
        match self.read(buf, signal) {
            Some(Ok(n)) => IoCompletion::Complete(n),
            Some(Err(e)) => IoCompletion::Failed(e),
            None => IoCompletion::StillIncomplete,
        }
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.read_waiter = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uartlog_core::{RunLoop, Wakeup};

    #[test]
    fn test_writes_are_captured() {
        let mut run_loop = RunLoop::with_manual_clock();
        let signal = run_loop.signal();
        let (mut port, handle) = MemoryPort::new();

        assert!(matches!(port.start_write(b"abc", &signal), IoStart::ImmediateComplete(3)));
        assert!(matches!(port.start_write(b"de", &signal), IoStart::ImmediateComplete(2)));
        assert_eq!(handle.written(), b"abcde");
        assert_eq!(handle.write_calls(), 2);
        assert_eq!(handle.take_written(), b"abcde");
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_write_limit_splits_writes() {
        let mut run_loop = RunLoop::with_manual_clock();
        let signal = run_loop.signal();
        let (mut port, handle) = MemoryPort::with_write_limit(4);

        assert!(matches!(port.start_write(&[1; 10], &signal), IoStart::ImmediateComplete(4)));
        assert_eq!(handle.written().len(), 4);
    }

    #[test]
    fn test_pending_read_woken_by_inbound_data() {
        let mut run_loop = RunLoop::with_manual_clock();
        let signal = run_loop.signal();
        let (mut port, handle) = MemoryPort::new();
        let mut buf = [0u8; 8];

        signal.arm();
        assert!(matches!(port.start_read(&mut buf, &signal), IoStart::Pending));
        handle.push_inbound(b"hi");
        assert_eq!(run_loop.next_wakeup(), Some(Wakeup::Ready(signal.source())));

        assert!(matches!(port.read_result(&mut buf, &signal), IoCompletion::Complete(2)));
        assert_eq!(&buf[..2], b"hi");
    }

    #[test]
    fn test_disconnect_fails_io() {
        let mut run_loop = RunLoop::with_manual_clock();
        let signal = run_loop.signal();
        let (mut port, handle) = MemoryPort::new();

        handle.disconnect();
        match port.start_write(b"x", &signal) {
            IoStart::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected outcome: {:?}", other),
        }
        port.close();
        assert!(handle.is_closed());
    }
}
