//! The duplex byte-stream contract
//!
//! [`Socket`] is what a host sees of a connection: staged outbound bytes, a
//! receive buffer it reads delivered bytes from, endpoint metadata, and a
//! failure report. [`TcpSocket`](crate::TcpSocket) is the TCP implementation.

use parking_lot::MutexGuard;

use crate::buffer::Buffer;

pub trait Socket: Send + Sync {
    /// Bytes staged for sending and not yet confirmed by the kernel
    fn send_buffer_size(&self) -> usize;

    /// Bytes in the consumer-visible receive buffer
    fn receive_buffer_size(&self) -> usize;

    /// Cap the staged outbound bytes, 0 disables the limit
    fn set_send_buffer_limit(&self, limit: usize);

    /// Lock and borrow the consumer-visible receive buffer
    ///
    /// The guard only excludes other users of the buffer. Deliveries into it
    /// are skipped while it is held, so the same thread may keep driving the
    /// socket; [`read`](Socket::read) and
    /// [`receive_buffer_size`](Socket::receive_buffer_size) lock it too and
    /// must not be called with the guard alive.
    fn receive_buffer(&self) -> MutexGuard<'_, Buffer>;

    /// Stage bytes for sending
    fn write(&self, bytes: &[u8]);

    /// Take up to `max_bytes` unread bytes from the receive buffer
    fn read(&self, max_bytes: usize) -> Vec<u8> {
        self.receive_buffer().read(max_bytes).to_vec()
    }

    fn remote_ip(&self) -> Option<String>;
    fn remote_port(&self) -> Option<u16>;
    fn local_port(&self) -> Option<u16>;

    /// Whether the socket has failed for good
    fn has_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Description of the failure, if any
    fn error_message(&self) -> Option<String>;
}
