//! Flush scheduler
//!
//! Moves bytes from the ring buffer to the transport driver one chunk per
//! tick. Ticks are one-shot run loop timers: the first one is armed with zero
//! delay, every following one (port busy, bytes left over) with the backoff
//! interval, so a busy port never turns into a zero-delay spin.

use std::time::Duration;
use uartlog_core::{RingBuffer, RunLoop, TimerId};
use uartlog_transport::{PhysicalPort, TransportDriver};

/// What a flush tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTick {
    /// The port was not ready; re-armed after the backoff interval
    NotReady,
    /// Nothing left to send; the scheduler went idle
    Idle,
    /// A chunk was handed to the driver
    Submitted { len: usize, rescheduled: bool },
    /// The driver refused the chunk; its bytes are lost
    Rejected { len: usize },
}

/// Chunked, backoff-paced flush of a ring buffer into a transport driver
#[derive(Debug)]
pub struct FlushScheduler {
    timer: Option<TimerId>,
    scheduled: bool,
    backoff: Duration,
    chunk: Vec<u8>,
}

impl FlushScheduler {
    /// Create an idle scheduler
    pub fn new(chunk_size: usize, backoff: Duration) -> Self {
        Self {
            timer: None,
            scheduled: false,
            backoff,
            chunk: vec![0; chunk_size],
        }
    }

    /// Check if a flush is scheduled or in progress
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Check if `id` is this scheduler's pending timer
    pub fn owns(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    /// Bytes submitted per tick
    pub fn chunk_size(&self) -> usize {
        self.chunk.len()
    }

    /// Arm a zero-delay tick unless one is already scheduled
    pub fn schedule(&mut self, run_loop: &mut RunLoop) {
        if self.scheduled {
            return;
        }
        self.timer = Some(run_loop.add_timer(Duration::ZERO));
        self.scheduled = true;
    }

    fn reschedule(&mut self, run_loop: &mut RunLoop) {
        self.timer = Some(run_loop.add_timer(self.backoff));
    }

    /// Run one tick
    ///
    /// Called when the scheduler's timer fires.
    pub fn run<P: PhysicalPort>(
        &mut self,
        run_loop: &mut RunLoop,
        ring: &mut RingBuffer,
        driver: &mut TransportDriver<P>,
    ) -> FlushTick {
        self.timer = None;

        if !driver.is_ready() {
            log::debug!("flush: port not ready ({}), backing off", driver.state().as_str());
            self.reschedule(run_loop);
            return FlushTick::NotReady;
        }

        if ring.is_empty() {
            self.scheduled = false;
            return FlushTick::Idle;
        }

        let len = ring.dequeue(&mut self.chunk);
        let submitted = driver.send(&self.chunk[..len]);

        let rescheduled = !ring.is_empty();
        if rescheduled {
            self.reschedule(run_loop);
        } else {
            self.scheduled = false;
        }

        match submitted {
            Ok(()) => {
                log::debug!("flush: submitted {} bytes, {} buffered", len, ring.bytes_available());
                FlushTick::Submitted { len, rescheduled }
            }
            Err(err) => {
                log::warn!("flush: driver refused {} bytes: {}", len, err);
                FlushTick::Rejected { len }
            }
        }
    }

    /// Remove the pending tick and go idle
    pub fn cancel(&mut self, run_loop: &mut RunLoop) {
        if let Some(id) = self.timer.take() {
            run_loop.remove_timer(id);
        }
        self.scheduled = false;
    }
}
