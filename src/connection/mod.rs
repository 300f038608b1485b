//! Connection lifecycle
//!
//! A [`TcpSocket`] owns one connection from name resolution to a terminal
//! state. Every asynchronous operation captures a reference-counted handle to
//! the shared core, so completions stay valid while the caller's handle is
//! dropped, and every completion takes the per-connection lock before it
//! touches state.
//!
//! The consumer-visible receive buffer has a lock of its own. Completions
//! never take it, and the caller-side paths that fill it only try it while
//! holding the core lock, so a borrowed buffer can neither deadlock its
//! socket nor hold up the reactor.

mod connected;
mod connecting;
mod state;

pub use state::Status;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::debug;

use self::connecting::Connecting;
use self::state::{ConnectionState, Core};
use crate::buffer::Buffer;
use crate::config::SocketConfig;
use crate::net::{Dial, EndpointInfo, Resolve};
use crate::socket::Socket;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between a [`TcpSocket`] and its in-flight operations.
#[derive(Debug)]
pub(crate) struct Shared {
    id: u64,
    core: Mutex<Core>,
    receive_buffer: Mutex<Buffer>,
    runtime: Handle,
    resolver: Arc<dyn Resolve>,
    dialer: Arc<dyn Dial>,
    config: SocketConfig,
}

/// A TCP connection driven by a reactor.
///
/// Created through [`TcpConnector::connect`](crate::TcpConnector::connect).
/// Dropping it aborts the connection; operations already in flight finish on
/// the reactor without further effect.
#[derive(Debug)]
pub struct TcpSocket {
    shared: Arc<Shared>,
}

impl TcpSocket {
    pub(crate) fn start(
        runtime: Handle,
        resolver: Arc<dyn Resolve>,
        dialer: Arc<dyn Dial>,
        config: SocketConfig,
        host: &str,
        port: u16,
    ) -> Self {
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let connecting = Connecting::new(host, port, config.nodelay);
        let shared = Arc::new(Shared {
            id,
            core: Mutex::new(Core::new(id, connecting, config.send_buffer_limit)),
            receive_buffer: Mutex::new(Buffer::new()),
            runtime,
            resolver,
            dialer,
            config,
        });

        debug!(socket = id, host, port, family = %shared.config.family, "connecting");
        shared.start_resolve(host, port);
        TcpSocket { shared }
    }

    /// Process-unique identifier, also used as the `socket` field in logs
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn status(&self) -> Status {
        self.shared.core.lock().status()
    }

    pub fn is_connecting(&self) -> bool {
        self.status() == Status::Connecting
    }

    pub fn is_connected(&self) -> bool {
        self.status() == Status::Connected
    }

    /// Commit every staged byte and start sending if connected.
    ///
    /// While connecting, committed bytes wait for the connection. In the
    /// error state the staged bytes are dropped.
    pub fn send(&self) {
        let mut core = self.shared.core.lock();
        if core.status() == Status::Error {
            core.send_buffer.clear();
            return;
        }
        core.send_buffer.commit();
        self.shared.start_send(&mut core);
    }

    /// Move exactly `amount` bytes into the receive buffer.
    ///
    /// Returns `true` once they were delivered. On `false` the bytes are not
    /// there yet, a previous request is still outstanding, or the receive
    /// buffer is borrowed; call again later with the same amount.
    pub fn receive(&self, amount: usize) -> bool {
        let mut core = self.shared.core.lock();
        self.shared.receive(&mut core, amount)
    }

    /// Move every byte available right now into the receive buffer.
    pub fn receive_all(&self) {
        let mut core = self.shared.core.lock();
        self.shared.receive_all(&mut core);
    }

    /// Whether the peer closed its side.
    ///
    /// `false` while connecting or while unconsumed data may still arrive,
    /// `true` in the error state.
    pub fn is_eof(&self) -> bool {
        let mut core = self.shared.core.lock();
        self.shared.is_eof(&mut core)
    }

    /// Set TCP_NODELAY.
    ///
    /// While connecting the value is remembered and applied on connect.
    pub fn set_nodelay(&self, nodelay: bool) -> bool {
        let mut core = self.shared.core.lock();
        match &mut core.state {
            ConnectionState::Connecting(connecting) => {
                connecting.nodelay = nodelay;
                true
            }
            ConnectionState::Connected(connected) => connected.set_nodelay(nodelay),
            ConnectionState::Error(_) => false,
        }
    }

    /// Stop acting on completions. Idempotent.
    ///
    /// Cancels a pending lookup. Sends and receives already in flight run to
    /// completion but their results are ignored, and no new ones start.
    pub fn abort(&self) {
        let mut core = self.shared.core.lock();
        match &mut core.state {
            ConnectionState::Connecting(connecting) if !connecting.abort_requested => {
                connecting.abort();
            }
            ConnectionState::Connected(connected) if !connected.abort_requested => {
                connected.abort_requested = true;
            }
            _ => return,
        }
        debug!(socket = self.shared.id, "aborted");
    }

    /// Both endpoints, once connected
    pub fn endpoint(&self) -> Option<EndpointInfo> {
        self.shared.core.lock().endpoint
    }

    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }
}

impl Socket for TcpSocket {
    fn send_buffer_size(&self) -> usize {
        self.shared.core.lock().send_buffer.len()
    }

    fn receive_buffer_size(&self) -> usize {
        self.shared.receive_buffer.lock().bytes_remaining()
    }

    fn set_send_buffer_limit(&self, limit: usize) {
        self.shared.core.lock().send_buffer_limit = limit;
    }

    fn receive_buffer(&self) -> MutexGuard<'_, Buffer> {
        self.shared.receive_buffer.lock()
    }

    fn write(&self, bytes: &[u8]) {
        let mut core = self.shared.core.lock();
        if core.status() == Status::Error {
            return;
        }
        if !core.send_fits(bytes.len()) {
            core.fail("send buffer limit exceeded");
            return;
        }
        core.send_buffer.write(bytes);
    }

    fn remote_ip(&self) -> Option<String> {
        self.endpoint().map(|e| e.remote_ip())
    }

    fn remote_port(&self) -> Option<u16> {
        self.endpoint().map(|e| e.remote_port())
    }

    fn local_port(&self) -> Option<u16> {
        self.endpoint().map(|e| e.local_port())
    }

    fn error_message(&self) -> Option<String> {
        self.shared.core.lock().error_message().map(str::to_string)
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.abort();
    }
}
