//! Per-connection configuration.

use crate::net::Family;

/// Default cap on a single bounded receive (64 MiB)
pub const DEFAULT_MAX_RECEIVE: usize = 64 * 1024 * 1024;

/// Default TCP_NODELAY setting applied on connect
pub const DEFAULT_NODELAY: bool = true;

/// Settings applied to a [`TcpSocket`](crate::TcpSocket) for its whole life.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    /// Address families name resolution may return
    pub family: Family,

    /// TCP_NODELAY applied when the connection is established
    pub nodelay: bool,

    /// Largest amount a single bounded receive may request
    pub max_receive: usize,

    /// Maximum staged outbound bytes, 0 means unlimited
    pub send_buffer_limit: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            family: Family::Any,
            nodelay: DEFAULT_NODELAY,
            max_receive: DEFAULT_MAX_RECEIVE,
            send_buffer_limit: 0,
        }
    }
}

impl SocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(mut self, family: Family) -> Self {
        self.family = family;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn max_receive(mut self, max: usize) -> Self {
        self.max_receive = max;
        self
    }

    pub fn send_buffer_limit(mut self, limit: usize) -> Self {
        self.send_buffer_limit = limit;
        self
    }
}
