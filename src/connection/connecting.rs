//! Resolution and connect attempts with endpoint fallback
//!
//! A failed attempt is absorbed as long as another candidate remains; only
//! when the last candidate fails does the connection enter `Error`, carrying
//! that last failure.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::connected::Connected;
use super::state::{ConnectionState, Core};
use super::Shared;
use crate::net::resolver::{self, Candidates};
use crate::net::{EndpointInfo, Result};

#[derive(Debug)]
pub(crate) struct Connecting {
    pub(crate) host: String,
    pub(crate) port: u16,
    /// Applied on entry to `Connected`
    pub(crate) nodelay: bool,
    pub(crate) abort_requested: bool,
    /// Pending lookup, `None` once it completed or for literal hosts
    pub(crate) lookup: Option<AbortHandle>,
    pub(crate) candidates: Option<Candidates>,
    /// Connect attempts issued so far
    pub(crate) attempts: usize,
}

impl Connecting {
    pub(crate) fn new(host: &str, port: u16, nodelay: bool) -> Self {
        Connecting {
            host: host.to_string(),
            port,
            nodelay,
            abort_requested: false,
            lookup: None,
            candidates: None,
            attempts: 0,
        }
    }

    pub(crate) fn abort(&mut self) {
        if let Some(lookup) = self.lookup.take() {
            lookup.abort();
        }
        self.abort_requested = true;
    }
}

impl Shared {
    /// Begin name resolution.
    ///
    /// Must run without the core lock held: a literal host completes, and
    /// locks, before `resolve` returns.
    pub(crate) fn start_resolve(self: &Arc<Self>, host: &str, port: u16) {
        let shared = Arc::clone(self);
        let lookup = resolver::resolve(
            &self.runtime,
            Arc::clone(&self.resolver),
            host,
            port,
            self.config.family,
            move |result| shared.handle_resolve(result),
        );

        let Some(lookup) = lookup else { return };
        let mut core = self.core.lock();
        match &mut core.state {
            ConnectionState::Connecting(connecting) if connecting.abort_requested => lookup.abort(),
            ConnectionState::Connecting(connecting) if connecting.candidates.is_none() => {
                connecting.lookup = Some(lookup);
            }
            _ => {}
        }
    }

    fn handle_resolve(self: &Arc<Self>, result: Result<Candidates>) {
        let mut core = self.core.lock();
        let core = &mut *core;
        let ConnectionState::Connecting(connecting) = &mut core.state else {
            return;
        };
        if connecting.abort_requested {
            return;
        }
        connecting.lookup = None;

        match result {
            Ok(candidates) => {
                debug!(
                    socket = self.id,
                    host = %connecting.host,
                    port = connecting.port,
                    candidates = ?candidates.as_slice(),
                    "resolved"
                );
                connecting.candidates = Some(candidates);
                self.start_attempt(core);
            }
            Err(e) => core.fail(e.to_string()),
        }
    }

    /// Connect to the next candidate. The previous attempt's stream, if any,
    /// was dropped with its failed result.
    fn start_attempt(self: &Arc<Self>, core: &mut Core) {
        let ConnectionState::Connecting(connecting) = &mut core.state else {
            return;
        };
        let Some(addr) = connecting.candidates.as_mut().and_then(|c| c.next()) else {
            core.fail("no endpoints left to try");
            return;
        };
        connecting.attempts += 1;
        debug!(socket = self.id, %addr, attempt = connecting.attempts, "connect attempt");

        let shared = Arc::clone(self);
        let dialer = Arc::clone(&self.dialer);
        self.runtime.spawn(async move {
            let result = dialer.dial(addr).await;
            shared.handle_connect(addr, result);
        });
    }

    fn handle_connect(self: &Arc<Self>, addr: SocketAddr, result: io::Result<TcpStream>) {
        let mut core = self.core.lock();
        let core = &mut *core;
        let ConnectionState::Connecting(connecting) = &mut core.state else {
            return;
        };
        if connecting.abort_requested {
            return;
        }

        match result {
            Ok(stream) => {
                let nodelay = connecting.nodelay;
                self.enter_connected(core, stream, nodelay);
            }
            Err(e) => {
                let more = connecting
                    .candidates
                    .as_ref()
                    .is_some_and(Candidates::has_next);
                if more {
                    debug!(socket = self.id, %addr, error = %e, "candidate failed, trying next");
                    self.start_attempt(core);
                } else {
                    core.fail_io(&e);
                }
            }
        }
    }

    fn enter_connected(self: &Arc<Self>, core: &mut Core, stream: TcpStream, nodelay: bool) {
        let endpoint = match EndpointInfo::from_stream(&stream) {
            Ok(endpoint) => endpoint,
            Err(e) => return core.fail_io(&e),
        };
        if let Err(e) = stream.set_nodelay(nodelay) {
            return core.fail_io(&e);
        }

        info!(
            socket = self.id,
            remote = %endpoint.remote,
            local = %endpoint.local,
            nodelay,
            "connected"
        );
        core.endpoint = Some(endpoint);
        core.state = ConnectionState::Connected(Connected::new(stream));
        self.start_send(core);
    }
}
