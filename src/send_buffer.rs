//! Outbound staging with a committed region
//!
//! Bytes written to a [`SendBuffer`] are staged until [`commit`] marks them
//! eligible for transmission. The send path only ever transmits the committed
//! region and pops bytes from the front once the kernel confirmed them, so
//! partially written data never reorders.
//!
//! [`commit`]: SendBuffer::commit

/// Staged outbound bytes. The first `committed` bytes may be transmitted.
#[derive(Debug, Clone, Default)]
pub struct SendBuffer {
    data: Vec<u8>,
    committed: usize,
}

impl SendBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends uncommitted bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Makes every staged byte part of the committed region.
    pub fn commit(&mut self) {
        self.committed = self.data.len();
    }

    /// Total staged bytes, committed or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn committed_len(&self) -> usize {
        self.committed
    }

    /// The region eligible for the next send.
    pub fn committed(&self) -> &[u8] {
        &self.data[..self.committed]
    }

    /// Removes `count` confirmed bytes from the front of the committed region.
    ///
    /// Counts beyond the committed region are clamped.
    pub fn pop(&mut self, count: usize) {
        let count = count.min(self.committed);
        self.data.drain(..count);
        self.committed -= count;
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.committed = 0;
    }
}
