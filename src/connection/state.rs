//! Connection states and the lock-guarded core
//!
//! A connection starts in `Connecting`, moves once to `Connected` or `Error`,
//! and from `Connected` at most once more to `Error`. `Error` is absorbing:
//! [`Core::fail`] is the only way in and nothing leads out.

use std::io;

use tracing::{debug, warn};

use super::connected::Connected;
use super::connecting::Connecting;
use crate::net::tcp::is_disconnect;
use crate::net::EndpointInfo;
use crate::send_buffer::SendBuffer;

/// Externally visible lifecycle stage of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Connecting,
    Connected,
    Error,
}

#[derive(Debug)]
pub(crate) enum ConnectionState {
    Connecting(Connecting),
    Connected(Connected),
    /// Terminal, carries the failure description
    Error(String),
}

impl ConnectionState {
    pub(crate) fn status(&self) -> Status {
        match self {
            ConnectionState::Connecting(_) => Status::Connecting,
            ConnectionState::Connected(_) => Status::Connected,
            ConnectionState::Error(_) => Status::Error,
        }
    }
}

/// Everything guarded by the per-connection lock.
///
/// The consumer-visible receive buffer is not part of it; see
/// [`Shared`](super::Shared).
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) id: u64,
    pub(crate) state: ConnectionState,
    pub(crate) send_buffer: SendBuffer,
    /// 0 means unlimited
    pub(crate) send_buffer_limit: usize,
    pub(crate) endpoint: Option<EndpointInfo>,
}

impl Core {
    pub(crate) fn new(id: u64, connecting: Connecting, send_buffer_limit: usize) -> Self {
        Core {
            id,
            state: ConnectionState::Connecting(connecting),
            send_buffer: SendBuffer::new(),
            send_buffer_limit,
            endpoint: None,
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.state.status()
    }

    pub(crate) fn error_message(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Whether staging `additional` more bytes keeps the send buffer in bounds
    pub(crate) fn send_fits(&self, additional: usize) -> bool {
        self.send_buffer_limit == 0
            || self.send_buffer.len().saturating_add(additional) <= self.send_buffer_limit
    }

    /// Enter `Error`. Once there, later failures are dropped.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        if matches!(self.state, ConnectionState::Error(_)) {
            return;
        }
        let message = message.into();
        warn!(socket = self.id, error = %message, from = ?self.status(), "connection failed");
        self.state = ConnectionState::Error(message);
    }

    /// Enter `Error` from a socket-level failure.
    pub(crate) fn fail_io(&mut self, err: &io::Error) {
        if matches!(self.state, ConnectionState::Error(_)) {
            return;
        }
        if is_disconnect(err) {
            debug!(socket = self.id, error = %err, "peer disconnected");
        } else {
            warn!(socket = self.id, error = %err, from = ?self.status(), "connection failed");
        }
        self.state = ConnectionState::Error(err.to_string());
    }
}
