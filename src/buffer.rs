//! Byte buffer with a read cursor
//!
//! [`Buffer`] is an append-only byte sequence with a monotonic read position.
//! It backs the consumer-visible receive side of a connection and is handy for
//! assembling outbound payloads.
//!
//! Running out of data is never an error here: every read returns at most what
//! is left and the caller decides whether a short read matters.
//!
//! # Examples
//!
//! ```
//! use tcpduct::Buffer;
//!
//! let mut buf = Buffer::new();
//! buf.write_string("abc", true);
//! buf.write(b"def");
//! assert_eq!(buf.read_delimited_string(), "abc");
//! assert_eq!(buf.read(2), b"de");
//! assert_eq!(buf.bytes_remaining(), 1);
//! ```

use std::io;

/// A growable byte buffer with a read cursor.
///
/// The cursor `r` always satisfies `0 <= r <= len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    /// Every byte written since the last `clear()`
    data: Vec<u8>,
    /// Index of the next unread byte
    read_pos: usize,
}

impl Buffer {
    /// Creates a new empty `Buffer`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tcpduct::Buffer;
    ///
    /// let buf = Buffer::new();
    /// assert_eq!(buf.len(), 0);
    /// assert_eq!(buf.bytes_remaining(), 0);
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            read_pos: 0,
        }
    }

    /// Creates a new `Buffer` able to hold `capacity` bytes without reallocating.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Empties the buffer and rewinds the read position.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    /// Returns the number of bytes in the buffer, read or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written since the last clear.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of bytes not yet read.
    #[inline]
    pub fn bytes_remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Returns the current read position.
    #[inline]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Moves the read position, clamping it to `len()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tcpduct::Buffer;
    ///
    /// let mut buf = Buffer::from(b"abc".to_vec());
    /// buf.set_read_pos(10);
    /// assert_eq!(buf.read_pos(), 3);
    /// assert_eq!(buf.bytes_remaining(), 0);
    /// ```
    #[inline]
    pub fn set_read_pos(&mut self, pos: usize) {
        self.read_pos = pos.min(self.data.len());
    }

    /// Appends bytes to the end of the buffer.
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends a string, optionally followed by a zero byte.
    ///
    /// A delimited string can be read back with [`read_delimited_string`].
    ///
    /// [`read_delimited_string`]: Buffer::read_delimited_string
    pub fn write_string(&mut self, s: &str, with_delimiter: bool) {
        self.data.extend_from_slice(s.as_bytes());
        if with_delimiter {
            self.data.push(0);
        }
    }

    /// Returns up to `max_bytes` unread bytes and advances past them.
    ///
    /// # Examples
    ///
    /// ```
    /// use tcpduct::Buffer;
    ///
    /// let mut buf = Buffer::from(b"hello".to_vec());
    /// assert_eq!(buf.read(3), b"hel");
    /// assert_eq!(buf.read(10), b"lo");
    /// assert!(buf.read(1).is_empty());
    /// ```
    pub fn read(&mut self, max_bytes: usize) -> &[u8] {
        let count = max_bytes.min(self.bytes_remaining());
        let start = self.read_pos;
        self.read_pos += count;
        &self.data[start..self.read_pos]
    }

    /// Copies unread bytes into `out` and returns how many were copied.
    ///
    /// If fewer than `out.len()` bytes remain, the tail of `out` is left
    /// untouched.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let bytes = self.read(out.len());
        let count = bytes.len();
        out[..count].copy_from_slice(bytes);
        count
    }

    /// Reads up to `max_bytes` into a string.
    ///
    /// Invalid UTF-8 sequences are replaced, the cursor still advances by the
    /// number of raw bytes consumed.
    pub fn read_string(&mut self, max_bytes: usize) -> String {
        String::from_utf8_lossy(self.read(max_bytes)).into_owned()
    }

    /// Reads a zero-terminated string.
    ///
    /// Returns everything before the next zero byte and consumes the zero too.
    /// Without a zero byte the whole remainder is returned and the cursor ends
    /// at the end of the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use tcpduct::Buffer;
    ///
    /// let mut buf = Buffer::from(b"abc\0def".to_vec());
    /// assert_eq!(buf.read_delimited_string(), "abc");
    /// assert_eq!(buf.read_delimited_string(), "def");
    /// assert_eq!(buf.bytes_remaining(), 0);
    /// ```
    pub fn read_delimited_string(&mut self) -> String {
        let len = self
            .unread()
            .iter()
            .position(|&b| b == 0)
            .unwrap_or_else(|| self.bytes_remaining());
        let result = self.read_string(len);

        // Skip the separator unless we just read the whole remainder
        if self.read_pos < self.data.len() {
            self.read_pos += 1;
        }
        result
    }

    /// Returns the unread part of the buffer without consuming it.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// Returns every byte in the buffer, including already-read ones.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the `Buffer` and returns the underlying byte vector.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Buffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, read_pos: 0 }
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}
