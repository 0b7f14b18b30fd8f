use std::collections::VecDeque;

/// Default cap for a session's trailing output record (1 MiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Bounded, append-only byte accumulator.
///
/// Once full, every append drops the oldest bytes first so the buffer always
/// holds the most recent `capacity` bytes the subprocess produced.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    capacity: usize,
    bytes: VecDeque<u8>,
    dropped: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            dropped: 0,
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        if data.len() >= self.capacity {
            // Only the tail of this chunk can survive.
            self.dropped += (self.bytes.len() + data.len() - self.capacity) as u64;
            self.bytes.clear();
            self.bytes.extend(&data[data.len() - self.capacity..]);
            return;
        }

        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.bytes.extend(data);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let (front, back) = self.bytes.as_slices();
        let mut out = Vec::with_capacity(self.bytes.len());
        out.extend_from_slice(front);
        out.extend_from_slice(back);
        out
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Total bytes discarded by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
