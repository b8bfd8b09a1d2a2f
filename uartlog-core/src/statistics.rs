//! Loss accounting and sink statistics

/// Monotonic count of bytes dropped by the sink
///
/// Every drop path adds to this counter: ring buffer overflow, frames the
/// encoder refused, bytes of a failed physical write, and data discarded at
/// teardown. It only goes back to zero through [`LossCounter::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossCounter {
    bytes: u64,
}

impl LossCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bytes` lost bytes
    pub fn add(&mut self, bytes: usize) {
        self.bytes = self.bytes.saturating_add(bytes as u64);
    }

    /// Total bytes lost since the last reset
    pub fn get(&self) -> u64 {
        self.bytes
    }

    /// Reset to zero (operator action)
    pub fn reset(&mut self) {
        self.bytes = 0;
    }
}

/// Sink statistics
///
/// Tracks the flow of bytes through the sink for monitoring and debugging.
/// The loss counter is kept separately from the other counters: `clear()`
/// leaves it alone, since loss is only reset by explicit operator action.
#[derive(Debug, Clone, Default)]
pub struct SinkStatistics {
    /// Bytes dropped (see [`LossCounter`])
    pub lost: LossCounter,
    /// Bytes accepted into the ring buffer
    pub bytes_enqueued: u64,
    /// Bytes confirmed written by the port
    pub bytes_sent: u64,
    /// Chunks handed to the transport driver
    pub chunks_submitted: u64,
    /// Chunks the driver reported as fully sent
    pub chunks_completed: u64,
    /// Flush ticks that found the port not ready and backed off
    pub backoff_reschedules: u64,
    /// Write failures reported by the driver
    pub write_errors: u64,
    /// Frames rejected by the encoder (too large for the output buffer)
    pub frames_dropped: u64,
    /// Packets filtered before encoding (size limits, unknown types)
    pub packets_filtered: u64,
}

impl SinkStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all counters except the loss counter
    pub fn clear(&mut self) {
        let lost = self.lost;
        *self = Self { lost, ..Self::default() };
    }

    /// Record bytes accepted into the ring buffer
    pub fn record_enqueued(&mut self, bytes: usize) {
        self.bytes_enqueued += bytes as u64;
    }

    /// Record a chunk handed to the driver
    pub fn record_submitted(&mut self) {
        self.chunks_submitted += 1;
    }

    /// Record a chunk fully written
    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.chunks_completed += 1;
    }

    /// Record a backoff reschedule
    pub fn increment_backoff_reschedules(&mut self) {
        self.backoff_reschedules += 1;
    }

    /// Record a write failure that dropped `lost` bytes
    pub fn record_write_error(&mut self, lost: usize) {
        self.write_errors += 1;
        self.lost.add(lost);
    }

    /// Record a frame rejected by the encoder
    pub fn record_frame_dropped(&mut self, encoded_size: usize) {
        self.frames_dropped += 1;
        self.lost.add(encoded_size);
    }

    /// Record a filtered packet
    pub fn increment_packets_filtered(&mut self) {
        self.packets_filtered += 1;
    }

    /// Fraction of enqueued bytes that were confirmed sent, in percent
    ///
    /// Returns 100.0 if nothing has been enqueued yet.
    pub fn delivery_rate(&self) -> f64 {
        if self.bytes_enqueued == 0 {
            100.0
        } else {
            (self.bytes_sent as f64 / self.bytes_enqueued as f64) * 100.0
        }
    }
}
