//! Duplex I/O on an established stream
//!
//! At most one send and one receive are in flight per connection. Sends
//! always transmit from the front of the committed region, so bytes reach the
//! peer in commit order. Receives first top up the staging area from bytes
//! the kernel already holds and only fall back to an asynchronous read for the
//! shortfall. Completions only ever touch the staging area; bytes reach the
//! consumer-visible buffer on the caller's thread.

use std::io;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::trace;

use super::state::{ConnectionState, Core};
use super::Shared;
use crate::net::tcp;

#[derive(Debug)]
pub(crate) struct Connected {
    pub(crate) stream: Arc<TcpStream>,
    pub(crate) abort_requested: bool,
    pub(crate) send_in_progress: bool,
    pub(crate) receive_in_progress: bool,
    /// Read from the socket, not yet delivered to the receive buffer
    pub(crate) staging: Vec<u8>,
}

impl Connected {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Connected {
            stream: Arc::new(stream),
            abort_requested: false,
            send_in_progress: false,
            receive_in_progress: false,
            staging: Vec::new(),
        }
    }

    pub(crate) fn set_nodelay(&self, nodelay: bool) -> bool {
        self.stream.set_nodelay(nodelay).is_ok()
    }
}

impl Shared {
    /// Submit the committed region unless a send is already in flight.
    ///
    /// Returns whether a new send was issued.
    pub(crate) fn start_send(self: &Arc<Self>, core: &mut Core) -> bool {
        let Core {
            state, send_buffer, ..
        } = &mut *core;
        let ConnectionState::Connected(connected) = state else {
            return false;
        };
        if connected.send_in_progress
            || connected.abort_requested
            || send_buffer.committed_len() == 0
        {
            return false;
        }

        connected.send_in_progress = true;
        let data = send_buffer.committed().to_vec();
        let stream = Arc::clone(&connected.stream);
        let shared = Arc::clone(self);
        trace!(socket = self.id, bytes = data.len(), "send started");
        self.runtime.spawn(async move {
            let result = tcp::send_some(&stream, &data).await;
            shared.handle_send(result);
        });
        true
    }

    fn handle_send(self: &Arc<Self>, result: io::Result<usize>) {
        let mut core = self.core.lock();
        let core = &mut *core;
        let ConnectionState::Connected(connected) = &mut core.state else {
            return;
        };
        connected.send_in_progress = false;
        if connected.abort_requested {
            return;
        }

        match result {
            Ok(sent) => {
                core.send_buffer.pop(sent);
                trace!(
                    socket = self.id,
                    sent,
                    pending = core.send_buffer.committed_len(),
                    "send completed"
                );
                if core.send_buffer.committed_len() > 0 {
                    self.start_send(core);
                }
            }
            Err(e) => core.fail_io(&e),
        }
    }

    /// Deliver exactly `amount` bytes to the receive buffer if possible.
    ///
    /// Returns `false` while a receive is in flight, while the receive buffer
    /// is borrowed, or when the bytes are not there yet; in the latter case an
    /// asynchronous read for the shortfall is started and the caller retries
    /// later.
    pub(crate) fn receive(self: &Arc<Self>, core: &mut Core, amount: usize) -> bool {
        if core.status() != super::Status::Connected {
            return false;
        }
        if amount > self.config.max_receive {
            core.fail(format!(
                "receive of {amount} bytes exceeds the {} byte limit",
                self.config.max_receive
            ));
            return false;
        }

        let ConnectionState::Connected(connected) = &mut core.state else {
            return false;
        };
        if connected.receive_in_progress {
            return false;
        }

        if connected.staging.len() < amount {
            let wanted = amount - connected.staging.len();
            if let Err(e) = tcp::read_available(&connected.stream, wanted, &mut connected.staging) {
                core.fail_io(&e);
                return false;
            }
        }

        if connected.staging.len() >= amount {
            // lock order is core then buffer; a borrowed buffer defers delivery
            let Some(mut buffer) = self.receive_buffer.try_lock() else {
                trace!(socket = self.id, amount, "receive buffer busy");
                return false;
            };
            buffer.write(&connected.staging[..amount]);
            connected.staging.drain(..amount);
            trace!(socket = self.id, amount, "receive satisfied");
            return true;
        }

        let shortfall = amount - connected.staging.len();
        self.start_receive(connected, shortfall);
        false
    }

    /// Move every byte available right now into the receive buffer.
    ///
    /// While the buffer is borrowed the bytes stay staged for a later call.
    pub(crate) fn receive_all(self: &Arc<Self>, core: &mut Core) {
        let ConnectionState::Connected(connected) = &mut core.state else {
            return;
        };
        if connected.receive_in_progress {
            return;
        }

        if let Err(e) = tcp::read_available(&connected.stream, usize::MAX, &mut connected.staging) {
            core.fail_io(&e);
            return;
        }
        let Some(mut buffer) = self.receive_buffer.try_lock() else {
            trace!(socket = self.id, staged = connected.staging.len(), "receive buffer busy");
            return;
        };
        buffer.write(&connected.staging);
        trace!(socket = self.id, bytes = connected.staging.len(), "drained");
        connected.staging.clear();
    }

    fn start_receive(self: &Arc<Self>, connected: &mut Connected, amount: usize) {
        if connected.receive_in_progress || connected.abort_requested {
            return;
        }
        connected.receive_in_progress = true;
        let stream = Arc::clone(&connected.stream);
        let shared = Arc::clone(self);
        trace!(socket = self.id, amount, "receive started");
        self.runtime.spawn(async move {
            let result = tcp::read_exact(&stream, amount).await;
            shared.handle_receive(result);
        });
    }

    fn handle_receive(self: &Arc<Self>, result: io::Result<Vec<u8>>) {
        let mut core = self.core.lock();
        let core = &mut *core;
        let ConnectionState::Connected(connected) = &mut core.state else {
            return;
        };
        connected.receive_in_progress = false;
        if connected.abort_requested {
            return;
        }

        match result {
            Ok(bytes) => {
                trace!(socket = self.id, bytes = bytes.len(), "receive completed");
                connected.staging.extend_from_slice(&bytes);
            }
            Err(e) => core.fail_io(&e),
        }
    }

    /// Whether the peer closed the stream.
    ///
    /// Only answers from the socket when nothing is staged and no receive is
    /// in flight. A broken connection counts as ended.
    pub(crate) fn is_eof(&self, core: &mut Core) -> bool {
        let ConnectionState::Connected(connected) = &core.state else {
            return core.status() == super::Status::Error;
        };
        if !connected.staging.is_empty() || connected.receive_in_progress {
            return false;
        }

        match tcp::peek_eof(&connected.stream) {
            Ok(eof) => eof,
            Err(e) => {
                core.fail_io(&e);
                true
            }
        }
    }
}
