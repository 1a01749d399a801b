//! Fixed-capacity I/O buffers shared between a producer and a decoder.
//!
//! An [`IoBuffer`] owns a boxed slice that never grows. The readable region
//! is `[reader_index, writer_index)` and the writable region is
//! `[writer_index, capacity)`. Producers append at the writer index, decoders
//! consume from the reader index, and [`IoBuffer::compact`] slides the unread
//! tail back to offset zero without reallocating.
//!
//! The buffer also tracks the absolute stream position of its first slot so
//! decoders can report where in the stream a frame or redirect begins, and a
//! `closed` flag meaning no further bytes will ever be appended.

use alloc::{boxed::Box, vec};

use thiserror::Error;

/// A caller tried to move one of the cursors outside the buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Appending or committing would run past the capacity.
    #[error("buffer overflow: {requested} items requested, {available} available")]
    Overflow {
        /// Items the caller tried to add.
        requested: usize,
        /// Writable slots left.
        available: usize,
    },
    /// Consuming would run past the writer index.
    #[error("buffer underflow: {requested} items requested, {available} available")]
    Underflow {
        /// Items the caller tried to consume.
        requested: usize,
        /// Readable items left.
        available: usize,
    },
    /// The buffer was already closed.
    #[error("buffer is closed")]
    Closed,
}

/// A bounded region with a read cursor, a write cursor, an absolute stream
/// position and a closed flag.
///
/// Invariant: `reader_index <= writer_index <= capacity`. Every mutating
/// method either upholds it or fails without changing anything.
#[derive(Clone)]
pub struct IoBuffer<T> {
    data: Box<[T]>,
    ri: usize,
    wi: usize,
    pos: u64,
    closed: bool,
}

/// Bytes in, bytes out.
pub type ByteBuffer = IoBuffer<u8>;

impl<T: Copy + Default> IoBuffer<T> {
    /// Allocates an empty, open buffer holding at most `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity].into_boxed_slice(),
            ri: 0,
            wi: 0,
            pos: 0,
            closed: false,
        }
    }

    /// Builds a buffer that is already full of `items`.
    ///
    /// This is the usual way to decode an in-memory input in one go:
    /// `IoBuffer::from_slice(bytes, true)`.
    #[must_use]
    pub fn from_slice(items: &[T], closed: bool) -> Self {
        Self {
            data: items.into(),
            ri: 0,
            wi: items.len(),
            pos: 0,
            closed,
        }
    }

    /// Copies `items` in at the writer index.
    ///
    /// # Errors
    ///
    /// Fails without writing anything if the buffer is closed or there is not
    /// room for every item.
    pub fn append(&mut self, items: &[T]) -> Result<(), BufferError> {
        if self.closed {
            return Err(BufferError::Closed);
        }
        let available = self.writer_len();
        if items.len() > available {
            return Err(BufferError::Overflow {
                requested: items.len(),
                available,
            });
        }
        self.data[self.wi..self.wi + items.len()].copy_from_slice(items);
        self.wi += items.len();
        Ok(())
    }

    /// Appends a single item.
    ///
    /// # Errors
    ///
    /// Same as [`IoBuffer::append`].
    pub fn push(&mut self, item: T) -> Result<(), BufferError> {
        self.append(core::slice::from_ref(&item))
    }
}

impl<T> IoBuffer<T> {
    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Index of the next unread item.
    #[must_use]
    pub fn reader_index(&self) -> usize {
        self.ri
    }

    /// Index one past the last written item.
    #[must_use]
    pub fn writer_index(&self) -> usize {
        self.wi
    }

    /// Number of unread items.
    #[must_use]
    pub fn reader_len(&self) -> usize {
        self.wi - self.ri
    }

    /// Number of free slots after the writer index.
    #[must_use]
    pub fn writer_len(&self) -> usize {
        self.data.len() - self.wi
    }

    /// The unread items.
    #[must_use]
    pub fn readable(&self) -> &[T] {
        &self.data[self.ri..self.wi]
    }

    /// The free slots. Pair with [`IoBuffer::commit`] after filling a prefix.
    pub fn writable(&mut self) -> &mut [T] {
        &mut self.data[self.wi..]
    }

    /// Everything written so far, consumed or not, since the last compaction.
    #[must_use]
    pub fn written(&self) -> &[T] {
        &self.data[..self.wi]
    }

    /// Marks `n` readable items as consumed.
    ///
    /// # Errors
    ///
    /// Fails without moving the cursor if fewer than `n` items are readable.
    pub fn consume(&mut self, n: usize) -> Result<(), BufferError> {
        let available = self.reader_len();
        if n > available {
            return Err(BufferError::Underflow {
                requested: n,
                available,
            });
        }
        self.ri += n;
        Ok(())
    }

    /// Marks the first `n` writable slots as filled.
    ///
    /// # Errors
    ///
    /// Fails without moving the cursor if the buffer is closed or fewer than
    /// `n` slots are free.
    pub fn commit(&mut self, n: usize) -> Result<(), BufferError> {
        if self.closed {
            return Err(BufferError::Closed);
        }
        let available = self.writer_len();
        if n > available {
            return Err(BufferError::Overflow {
                requested: n,
                available,
            });
        }
        self.wi += n;
        Ok(())
    }

    /// Whether no further items will ever be appended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Declares the end of the stream.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Absolute stream position of slot zero.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Absolute stream position of the next unread item.
    #[must_use]
    pub fn reader_position(&self) -> u64 {
        self.pos.saturating_add(self.ri as u64)
    }

    /// Absolute stream position of the next written item.
    #[must_use]
    pub fn writer_position(&self) -> u64 {
        self.pos.saturating_add(self.wi as u64)
    }

    /// Discards everything, keeping the position in step.
    ///
    /// Used by sinks after draining a destination buffer; the closed flag is
    /// left alone.
    pub fn clear(&mut self) {
        self.pos = self.pos.saturating_add(self.wi as u64);
        self.ri = 0;
        self.wi = 0;
    }
}

impl<T: Copy> IoBuffer<T> {
    /// Slides the unread items to offset zero.
    ///
    /// The discarded prefix is added to the absolute position, so
    /// [`IoBuffer::reader_position`] is unchanged.
    pub fn compact(&mut self) {
        if self.ri == 0 {
            return;
        }
        self.data.copy_within(self.ri..self.wi, 0);
        self.pos = self.pos.saturating_add(self.ri as u64);
        self.wi -= self.ri;
        self.ri = 0;
    }
}

impl<T> core::fmt::Debug for IoBuffer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoBuffer")
            .field("ri", &self.ri)
            .field("wi", &self.wi)
            .field("capacity", &self.data.len())
            .field("pos", &self.pos)
            .field("closed", &self.closed)
            .finish()
    }
}
