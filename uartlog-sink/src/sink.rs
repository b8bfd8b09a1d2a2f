//! Non-blocking log sink
//!
//! The sink is the one object producers talk to. `write` copies into the
//! ring buffer and returns; draining happens later on the run loop:
//!
//! ```text
//! write ──► RingBuffer ──(flush tick)──► TransportDriver ──► port
//!   │                                          │
//!   └─ overflow: count, drop        events ◄───┘ Sent / Error(dropped)
//! ```
//!
//! Logging traffic never blocks or fails the caller. Everything that gets
//! dropped on the way is added to the loss counter.

use crate::config::SinkConfig;
use crate::flush::{FlushScheduler, FlushTick};
use uartlog_core::{RingBuffer, RunLoop, SinkStatistics, UartLogError, UartLogResult, Wakeup};
use uartlog_framing::{encode_log_text, Direction, FrameEncoder};
use uartlog_transport::{DriverEvent, OpenPort, PhysicalPort, PortSettings, TransportDriver};

/// Non-blocking byte sink draining into a transport driver
#[derive(Debug)]
pub struct LogSink<P> {
    run_loop: RunLoop,
    ring: RingBuffer,
    encoder: FrameEncoder,
    scheduler: FlushScheduler,
    driver: TransportDriver<P>,
    stats: SinkStatistics,
    config: SinkConfig,
    initialized: bool,
}

impl<P: PhysicalPort> LogSink<P> {
    /// Create an initialized sink on a system-clock run loop
    pub fn new(config: SinkConfig) -> UartLogResult<Self> {
        Self::with_run_loop(config, RunLoop::new())
    }

    /// Create an initialized sink on the given run loop
    pub fn with_run_loop(config: SinkConfig, mut run_loop: RunLoop) -> UartLogResult<Self> {
        config.validate()?;
        let driver = TransportDriver::new(&mut run_loop);
        log::info!(
            "sink: initialized with {} byte ring buffer ({} format)",
            config.buffer_capacity,
            config.format.as_str()
        );
        Ok(Self {
            run_loop,
            ring: RingBuffer::new(config.buffer_capacity),
            encoder: FrameEncoder::new(config.format, config.frame_capacity),
            scheduler: FlushScheduler::new(config.chunk_size, config.backoff()),
            driver,
            stats: SinkStatistics::new(),
            config,
            initialized: true,
        })
    }

    /// Re-initialize after [`LogSink::deinit`]
    ///
    /// Empties the ring buffer and resets the loss counter. Does nothing on
    /// an initialized sink.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.ring.reset();
        self.stats.lost.reset();
        self.initialized = true;
        log::info!("sink: re-initialized");
    }

    /// Check if the sink accepts writes
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Hand an acquired port to the driver
    pub fn attach(&mut self, settings: PortSettings, port: P) -> UartLogResult<()> {
        self.driver.attach(settings, port)?;
        self.schedule_if_pending();
        Ok(())
    }

    /// Close the port; buffered bytes stay queued until a port is attached
    pub fn close_port(&mut self) {
        self.driver.close();
        self.process_events();
    }

    fn schedule_if_pending(&mut self) {
        if self.initialized && !self.ring.is_empty() {
            self.scheduler.schedule(&mut self.run_loop);
        }
    }

    /// Queue raw bytes for transmission
    ///
    /// Never blocks. If the ring buffer cannot take all of `data` nothing is
    /// queued and its length is added to the loss counter. Writes to an
    /// uninitialized sink are ignored.
    ///
    /// # Returns
    /// `true` if `data` was queued
    pub fn write(&mut self, data: &[u8]) -> bool {
        if !self.initialized || data.is_empty() {
            return false;
        }
        match self.ring.enqueue(data) {
            Ok(()) => {
                self.stats.record_enqueued(data.len());
                self.scheduler.schedule(&mut self.run_loop);
                true
            }
            Err(UartLogError::BufferOverflow { requested, free }) => {
                log::warn!("sink: buffer full, dropped {} bytes ({} free)", requested, free);
                self.stats.lost.add(requested);
                false
            }
            Err(err) => {
                log::warn!("sink: dropped {} bytes: {}", data.len(), err);
                self.stats.lost.add(data.len());
                false
            }
        }
    }

    /// Frame a logical record in the configured format and queue it
    ///
    /// Frames the encoder rejects are dropped and their encoded size counted
    /// as lost. Returns `true` if the frame was queued.
    pub fn write_packet(&mut self, logical_type: u8, direction: Direction, payload: &[u8]) -> bool {
        if !self.initialized {
            return false;
        }
        match self.encoder.encode(logical_type, direction, payload) {
            Ok(frame) => self.write(&frame),
            Err(UartLogError::FrameTooLarge { size, capacity }) => {
                log::warn!(
                    "sink: dropped 0x{:02X} frame of {} bytes (capacity {})",
                    logical_type,
                    size,
                    capacity
                );
                self.stats.record_frame_dropped(size);
                false
            }
            Err(err) => {
                let size = self.encoder.format().encoded_size(payload.len());
                log::warn!("sink: dropped 0x{:02X} frame: {}", logical_type, err);
                self.stats.record_frame_dropped(size);
                false
            }
        }
    }

    /// Queue a `LOG: <message>\n` text record as a single write
    pub fn write_log_text(&mut self, message: &[u8]) -> bool {
        if !self.initialized {
            return false;
        }
        let record = encode_log_text(message);
        self.write(&record)
    }

    /// Bytes lost since the last reset
    pub fn lost_count(&self) -> u64 {
        self.stats.lost.get()
    }

    /// Reset the loss counter
    pub fn reset_lost_count(&mut self) {
        self.stats.lost.reset();
    }

    /// Bytes waiting in the ring buffer (0 when uninitialized)
    pub fn buffer_usage(&self) -> usize {
        if self.initialized {
            self.ring.bytes_available()
        } else {
            0
        }
    }

    /// Free space in the ring buffer (0 when uninitialized)
    pub fn buffer_free(&self) -> usize {
        if self.initialized {
            self.ring.bytes_free()
        } else {
            0
        }
    }

    pub fn statistics(&self) -> &SinkStatistics {
        &self.stats
    }

    pub(crate) fn statistics_mut(&mut self) -> &mut SinkStatistics {
        &mut self.stats
    }

    pub fn clear_statistics(&mut self) {
        self.stats.clear();
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn driver(&self) -> &TransportDriver<P> {
        &self.driver
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    /// Mutable run loop access, e.g. to advance a manual clock
    pub fn run_loop_mut(&mut self) -> &mut RunLoop {
        &mut self.run_loop
    }

    /// Check if everything queued has been handed to the port
    pub fn is_idle(&self) -> bool {
        self.ring.is_empty() && self.driver.bytes_in_flight() == 0
    }

    /// Handle every wakeup that is due now
    ///
    /// # Returns
    /// Number of wakeups handled
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(wakeup) = self.run_loop.next_wakeup() {
            self.dispatch(wakeup);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::Timer(id) if self.scheduler.owns(id) => {
                if !self.initialized {
                    return;
                }
                let tick = self.scheduler.run(&mut self.run_loop, &mut self.ring, &mut self.driver);
                match tick {
                    FlushTick::NotReady => self.stats.increment_backoff_reschedules(),
                    FlushTick::Submitted { .. } => self.stats.record_submitted(),
                    FlushTick::Rejected { len } => self.stats.lost.add(len),
                    FlushTick::Idle => {}
                }
            }
            Wakeup::Timer(id) => log::debug!("sink: stray timer {:?}", id),
            Wakeup::Ready(source) => {
                if !self.driver.handle_ready(source) {
                    log::debug!("sink: stray readiness {:?}", source);
                }
            }
        }
        self.process_events();
    }

    fn process_events(&mut self) {
        while let Some(event) = self.driver.poll_event() {
            match event {
                DriverEvent::Sent { len } => {
                    self.stats.record_sent(len);
                    self.schedule_if_pending();
                }
                DriverEvent::Error { kind, dropped } => {
                    log::warn!("sink: {} dropped {} bytes", kind.as_str(), dropped);
                    self.stats.record_write_error(dropped);
                }
                DriverEvent::Received(data) => {
                    log::debug!("sink: ignoring {} received bytes", data.len());
                }
            }
        }
    }

    /// Wait until a wakeup is due
    pub async fn wait(&self) {
        self.run_loop.wait().await;
    }

    /// Drive the sink until everything queued has been handed to the port
    ///
    /// # Returns
    /// `Err(PortClosed)` if the port is not open, since nothing could drain
    pub async fn run_until_idle(&mut self) -> UartLogResult<()> {
        loop {
            self.poll();
            if self.is_idle() {
                return Ok(());
            }
            if !self.driver.state().is_open() {
                return Err(UartLogError::PortClosed);
            }
            self.run_loop.wait().await;
        }
    }

    /// Shut the sink down
    ///
    /// Cancels the pending flush, hands as much of the buffered data to the
    /// port as it will take right now, then closes the port. Whatever could
    /// not be submitted is discarded and counted as lost.
    pub fn deinit(&mut self) {
        if !self.initialized {
            return;
        }
        // Stops completions from scheduling new ticks
        self.initialized = false;
        self.scheduler.cancel(&mut self.run_loop);

        let mut chunk = vec![0u8; self.scheduler.chunk_size()];
        while !self.ring.is_empty() && self.driver.is_ready() {
            let len = self.ring.dequeue(&mut chunk);
            match self.driver.send(&chunk[..len]) {
                Ok(()) => self.stats.record_submitted(),
                Err(_) => self.stats.lost.add(len),
            }
            self.process_events();
        }

        let discarded = self.ring.bytes_available();
        if discarded > 0 {
            log::warn!("sink: discarding {} buffered bytes", discarded);
            self.stats.lost.add(discarded);
            self.ring.reset();
        }

        self.driver.close();
        self.process_events();
        log::info!("sink: deinitialized, {} bytes lost total", self.stats.lost.get());
    }
}

impl<P: OpenPort> LogSink<P> {
    /// Open a port from settings and start draining into it
    pub fn open(&mut self, settings: PortSettings) -> UartLogResult<()> {
        self.driver.open(settings)?;
        self.schedule_if_pending();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uartlog_framing::{verify_checked, FrameFormat};
    use uartlog_transport::{MemoryPort, MemoryPortHandle, TransportState};

    fn sink_with(config: SinkConfig) -> (LogSink<MemoryPort>, MemoryPortHandle) {
        let mut sink = LogSink::with_run_loop(config, RunLoop::with_manual_clock()).unwrap();
        let (port, handle) = MemoryPort::new();
        sink.attach(PortSettings::new("mem", 500_000), port).unwrap();
        (sink, handle)
    }

    fn drain(sink: &mut LogSink<MemoryPort>) {
        for _ in 0..1000 {
            sink.poll();
            if sink.is_idle() {
                return;
            }
            let backoff = sink.config().backoff();
            sink.run_loop_mut().advance(backoff);
        }
        panic!("sink did not drain");
    }

    #[test]
    fn test_writes_drain_in_order() {
        let (mut sink, handle) = sink_with(SinkConfig {
            chunk_size: 5,
            ..SinkConfig::default()
        });
        sink.write(b"first ");
        sink.write(b"second ");
        sink.write(b"third");
        drain(&mut sink);

        assert_eq!(handle.written(), b"first second third");
        assert_eq!(sink.lost_count(), 0);
        assert_eq!(sink.statistics().bytes_sent, 18);
        assert_eq!(sink.statistics().chunks_submitted, 4);
    }

    #[test]
    fn test_overflow_counts_and_leaves_buffer_unchanged() {
        let mut sink: LogSink<MemoryPort> =
            LogSink::with_run_loop(SinkConfig::default(), RunLoop::with_manual_clock()).unwrap();

        assert!(sink.write(&[0x42; 4096]));
        assert_eq!(sink.buffer_usage(), 4096);
        assert_eq!(sink.buffer_free(), 0);

        assert!(!sink.write(&[0x43]));
        assert_eq!(sink.lost_count(), 1);
        assert_eq!(sink.buffer_usage(), 4096);

        let (port, handle) = MemoryPort::new();
        sink.attach(PortSettings::new("mem", 500_000), port).unwrap();
        drain(&mut sink);
        assert_eq!(handle.written(), vec![0x42; 4096]);
    }

    #[test]
    fn test_not_ready_port_backs_off() {
        let mut sink: LogSink<MemoryPort> =
            LogSink::with_run_loop(SinkConfig::default(), RunLoop::with_manual_clock()).unwrap();
        sink.write(b"waiting for a port");

        // First tick is immediate, later ones wait for the backoff interval
        for _ in 0..3 {
            assert_eq!(sink.poll(), 1);
            assert_eq!(sink.poll(), 0);
            assert_eq!(
                sink.run_loop().time_until_next_timer(),
                Some(Duration::from_millis(10))
            );
            sink.run_loop_mut().advance(Duration::from_millis(10));
        }
        assert_eq!(sink.statistics().backoff_reschedules, 3);
        assert_eq!(sink.buffer_usage(), 18);
    }

    #[test]
    fn test_oversized_frame_counts_encoded_size() {
        let (mut sink, handle) = sink_with(SinkConfig {
            frame_capacity: 16,
            ..SinkConfig::default()
        });
        assert!(!sink.write_packet(0x02, Direction::Outgoing, &[0u8; 16]));
        assert_eq!(sink.lost_count(), 17);
        assert_eq!(sink.statistics().frames_dropped, 1);

        assert!(sink.write_packet(0x02, Direction::Outgoing, &[0xAA; 10]));
        drain(&mut sink);
        let mut expected = vec![0x02];
        expected.extend_from_slice(&[0xAA; 10]);
        assert_eq!(handle.written(), expected);
    }

    #[test]
    fn test_checked_format_packets() {
        let (mut sink, handle) = sink_with(SinkConfig {
            format: FrameFormat::Checked,
            ..SinkConfig::default()
        });
        sink.write_packet(0x04, Direction::Incoming, &[0x0E, 0x04]);
        drain(&mut sink);

        let written = handle.written();
        let frame = verify_checked(&written).unwrap();
        assert_eq!(frame.logical_type, 0x04);
        assert_eq!(frame.direction, 1);
        assert_eq!(frame.payload, &[0x0E, 0x04]);
    }

    #[test]
    fn test_log_text_is_one_record() {
        let (mut sink, handle) = sink_with(SinkConfig::default());
        sink.write_log_text(b"boot complete");
        assert_eq!(sink.statistics().bytes_enqueued, 19);
        drain(&mut sink);
        assert_eq!(handle.written(), b"LOG: boot complete\n");
    }

    #[test]
    fn test_write_failure_is_counted_not_retried() {
        let (mut sink, handle) = sink_with(SinkConfig::default());
        handle.disconnect();
        sink.write(&[0x55; 40]);
        sink.poll();

        assert_eq!(sink.lost_count(), 40);
        assert_eq!(sink.statistics().write_errors, 1);
        assert_eq!(sink.driver().state(), TransportState::Error);
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_reset_lost_count() {
        let (mut sink, _handle) = sink_with(SinkConfig {
            buffer_capacity: 8,
            chunk_size: 8,
            ..SinkConfig::default()
        });
        sink.write(&[0; 9]);
        assert_eq!(sink.lost_count(), 9);
        sink.clear_statistics();
        assert_eq!(sink.lost_count(), 9);
        sink.reset_lost_count();
        assert_eq!(sink.lost_count(), 0);
    }

    #[test]
    fn test_deinit_flushes_then_ignores_writes() {
        let (mut sink, handle) = sink_with(SinkConfig {
            chunk_size: 4,
            ..SinkConfig::default()
        });
        sink.write(b"last words");
        sink.deinit();

        assert_eq!(handle.written(), b"last words");
        assert!(handle.is_closed());
        assert_eq!(sink.lost_count(), 0);
        assert!(!sink.is_initialized());

        assert!(!sink.write(b"ignored"));
        assert!(!sink.write_log_text(b"ignored"));
        assert_eq!(sink.buffer_usage(), 0);
        assert_eq!(sink.lost_count(), 0);

        sink.deinit();
        sink.init();
        assert!(sink.is_initialized());
        assert_eq!(sink.buffer_free(), 4096);
    }

    #[test]
    fn test_deinit_counts_undeliverable_bytes() {
        let mut sink: LogSink<MemoryPort> =
            LogSink::with_run_loop(SinkConfig::default(), RunLoop::with_manual_clock()).unwrap();
        sink.write(&[0x01; 100]);
        sink.deinit();
        assert_eq!(sink.lost_count(), 100);
    }

    #[test]
    fn test_partial_port_writes_complete() {
        let mut sink: LogSink<MemoryPort> =
            LogSink::with_run_loop(SinkConfig::default(), RunLoop::with_manual_clock()).unwrap();
        let (port, handle) = MemoryPort::with_write_limit(50);
        sink.attach(PortSettings::new("mem", 500_000), port).unwrap();

        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        sink.write(&data);
        drain(&mut sink);
        assert_eq!(handle.written(), data);
        assert_eq!(sink.statistics().chunks_completed, 4);
    }

    #[tokio::test]
    async fn test_run_until_idle() {
        let mut sink: LogSink<MemoryPort> = LogSink::new(SinkConfig::default()).unwrap();
        let (port, handle) = MemoryPort::new();
        sink.attach(PortSettings::new("mem", 500_000), port).unwrap();

        let data = vec![0x33; 3000];
        sink.write(&data);
        sink.run_until_idle().await.unwrap();
        assert_eq!(handle.written(), data);
    }

    #[test]
    fn test_run_until_idle_without_port() {
        let mut sink: LogSink<MemoryPort> = LogSink::new(SinkConfig::default()).unwrap();
        sink.write(b"stuck");
        let result = tokio_test::block_on(sink.run_until_idle());
        assert!(matches!(result, Err(UartLogError::PortClosed)));
    }
}
