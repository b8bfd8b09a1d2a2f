//! Fixed-capacity circular byte store

use crate::error::{UartLogError, UartLogResult};

/// Fixed-capacity FIFO of bytes
///
/// The buffer is allocated once and never resized. `count` bytes starting at
/// the read index (modulo capacity) are valid; physically they may wrap
/// around the end of the storage.
///
/// # Message Integrity
/// `enqueue` is all-or-nothing: either every byte of the call is stored or
/// none is. Callers are expected to enqueue one complete logical message per
/// call, so that two messages never interleave in the output stream. The
/// buffer cannot enforce this, it only guarantees that it never splits a
/// single call.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    read_index: usize,
    count: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity in bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            read_index: 0,
            count: 0,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes currently stored
    pub fn bytes_available(&self) -> usize {
        self.count
    }

    /// Number of bytes that can still be enqueued
    pub fn bytes_free(&self) -> usize {
        self.storage.len() - self.count
    }

    /// Check if the buffer holds no data
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append all of `data`
    ///
    /// # Returns
    /// `Err(BufferOverflow)` if `data` does not fit in the free space. The
    /// buffer is left untouched in that case.
    pub fn enqueue(&mut self, data: &[u8]) -> UartLogResult<()> {
        let free = self.bytes_free();
        if data.len() > free {
            return Err(UartLogError::BufferOverflow {
                requested: data.len(),
                free,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let capacity = self.storage.len();
        let write_index = (self.read_index + self.count) % capacity;
        let first = data.len().min(capacity - write_index);
        self.storage[write_index..write_index + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.storage[..rest].copy_from_slice(&data[first..]);
        }

        self.count += data.len();
        Ok(())
    }

    /// Copy up to `out.len()` bytes into `out` and remove them from the buffer
    ///
    /// # Returns
    /// Number of bytes read, 0 if the buffer is empty
    pub fn dequeue(&mut self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.count);
        if to_read == 0 {
            return 0;
        }

        let capacity = self.storage.len();
        let first = to_read.min(capacity - self.read_index);
        out[..first].copy_from_slice(&self.storage[self.read_index..self.read_index + first]);
        let rest = to_read - first;
        if rest > 0 {
            out[first..to_read].copy_from_slice(&self.storage[..rest]);
        }

        self.read_index = (self.read_index + to_read) % capacity;
        self.count -= to_read;
        if self.count == 0 {
            self.read_index = 0;
        }
        to_read
    }

    /// Discard all buffered content
    pub fn reset(&mut self) {
        self.read_index = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ring: &mut RingBuffer, chunk: usize) -> Vec<u8> {
        let mut result = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = ring.dequeue(&mut buf);
            if n == 0 {
                break;
            }
            result.extend_from_slice(&buf[..n]);
        }
        result
    }

    #[test]
    fn test_enqueue_dequeue_in_order() {
        let mut ring = RingBuffer::new(64);
        ring.enqueue(b"hello ").unwrap();
        ring.enqueue(b"uart ").unwrap();
        ring.enqueue(b"world").unwrap();
        assert_eq!(drain(&mut ring, 4), b"hello uart world".to_vec());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let mut ring = RingBuffer::new(10);
        ring.enqueue(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(ring.dequeue(&mut buf), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);

        // Write index is at 7, this wraps to the start of the storage
        ring.enqueue(&[8, 9, 10, 11, 12, 13]).unwrap();
        assert_eq!(ring.bytes_available(), 8);
        assert_eq!(drain(&mut ring, 3), vec![6, 7, 8, 9, 10, 11, 12, 13]);
    }

    #[test]
    fn test_overflow_leaves_buffer_unchanged() {
        let mut ring = RingBuffer::new(8);
        ring.enqueue(&[1, 2, 3, 4, 5]).unwrap();
        let err = ring.enqueue(&[6, 7, 8, 9]).unwrap_err();
        assert!(matches!(
            err,
            UartLogError::BufferOverflow { requested: 4, free: 3 }
        ));
        assert_eq!(ring.bytes_available(), 5);
        assert_eq!(drain(&mut ring, 8), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_full_capacity_then_one_more() {
        let mut ring = RingBuffer::new(4096);
        ring.enqueue(&[0x42; 4096]).unwrap();
        assert_eq!(ring.bytes_available(), 4096);
        assert_eq!(ring.bytes_free(), 0);

        assert!(ring.enqueue(&[0x00]).is_err());
        assert_eq!(ring.bytes_available(), 4096);
        assert!(drain(&mut ring, 256).iter().all(|&b| b == 0x42));
    }

    #[test]
    fn test_available_plus_free_is_capacity() {
        let mut ring = RingBuffer::new(37);
        let mut buf = [0u8; 11];
        for round in 0..50usize {
            let len = (round * 7) % 13 + 1;
            let _ = ring.enqueue(&vec![round as u8; len]);
            assert_eq!(ring.bytes_available() + ring.bytes_free(), ring.capacity());
            if round % 3 == 0 {
                ring.dequeue(&mut buf);
                assert_eq!(ring.bytes_available() + ring.bytes_free(), ring.capacity());
            }
        }
    }

    #[test]
    fn test_dequeue_empty_returns_zero() {
        let mut ring = RingBuffer::new(16);
        let mut buf = [0u8; 4];
        assert_eq!(ring.dequeue(&mut buf), 0);
    }

    #[test]
    fn test_reset_discards_content() {
        let mut ring = RingBuffer::new(16);
        ring.enqueue(b"abcdef").unwrap();
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.bytes_free(), 16);
    }
}
