//! Linear byte buffer with explicit read and write cursors.
//!
//! # Layout
//! ```text
//! 0            read            write            capacity
//! |  consumed  |   readable    |    writable     |
//! ```
//!
//! # Rules
//! - `read <= write <= capacity` after every call
//! - Fully drained buffers snap both cursors back to 0
//! - Growth compacts before it allocates and never shrinks
//! - No syscalls, no blocking

/// Default initial capacity for connection buffers.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Growable byte store owned by exactly one connection.
#[derive(Debug)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
}

impl ByteBuffer {
    /// Create a buffer with `capacity` bytes of writable space.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read: 0,
            write: 0,
        }
    }

    /// Total size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes committed but not yet consumed.
    pub fn readable_len(&self) -> usize {
        self.write - self.read
    }

    /// Number of bytes that can be written without growing.
    pub fn writable_len(&self) -> usize {
        self.data.len() - self.write
    }

    /// Whether there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// The readable region `[read, write)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    /// The writable region `[write, capacity)`.
    ///
    /// Bytes placed here are invisible until [`commit`](Self::commit) is called.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.write..]
    }

    /// Publish `n` bytes previously written into the writable region.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(
            n <= self.writable_len(),
            "commit({n}) exceeds writable region of {}",
            self.writable_len()
        );
        self.write += n.min(self.writable_len());
    }

    /// Drop `n` bytes from the front of the readable region.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(
            n <= self.readable_len(),
            "consume({n}) exceeds readable region of {}",
            self.readable_len()
        );
        self.read += n.min(self.readable_len());

        if self.read == self.write {
            self.read = 0;
            self.write = 0;
        }
    }

    /// Discard everything, readable or not.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Make sure at least `additional` bytes are writable.
    pub fn reserve(&mut self, additional: usize) {
        if self.writable_len() >= additional {
            return;
        }

        if self.read > 0 {
            let readable = self.readable_len();
            self.data.copy_within(self.read..self.write, 0);
            self.read = 0;
            self.write = readable;
        }

        if self.writable_len() < additional {
            self.data.resize(self.write + additional, 0);
        }
    }

    /// Append `bytes` to the readable region, growing if needed.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data[self.write..self.write + bytes.len()].copy_from_slice(bytes);
        self.commit(bytes.len());
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
