//! Endpoint resolution and candidate ordering
//!
//! [`resolve`] turns a host/port pair into [`Candidates`]. Literal addresses
//! (`127.0.0.1`, `::1`, `[::1]`) complete immediately on the calling thread.
//! Anything else is looked up on the reactor through a [`Resolve`]
//! implementation, always with the numeric port as the service.
//!
//! [`Candidates`] reorders whatever the lookup returned so that every IPv4
//! endpoint is tried before any IPv6 endpoint.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::addr::{v4_first, Family};
use super::{Error, Result};

/// Asynchronous name lookup.
///
/// Implementations own the family restriction: every returned endpoint must
/// satisfy [`Family::admits`], and an implementation that can tell which
/// families have a configured local address should drop the others.
/// [`resolve`] only reorders what comes back.
#[async_trait]
pub trait Resolve: Send + Sync + fmt::Debug {
    /// Look up `host`, returning endpoints carrying `port` and admitted by `family`.
    async fn lookup(&self, host: &str, port: u16, family: Family) -> io::Result<Vec<SocketAddr>>;
}

/// Lookup through the platform resolver.
///
/// Queries every family and filters afterwards. Local address configuration
/// is not consulted, so an IPv6 endpoint can come back on a host without
/// IPv6 connectivity; the connection then falls back to the next candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str, port: u16, family: Family) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await?
            .filter(|addr| family.admits(addr))
            .collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {family} addresses found for {host}"),
            ));
        }
        Ok(addrs)
    }
}

/// Ordered connect candidates with a consumption cursor.
#[derive(Debug, Clone)]
pub struct Candidates {
    endpoints: Vec<SocketAddr>,
    index: usize,
}

impl Candidates {
    /// Wrap raw lookup results in IPv4-first order
    pub fn new(raw: impl IntoIterator<Item = SocketAddr>) -> Self {
        Candidates {
            endpoints: v4_first(raw),
            index: 0,
        }
    }

    /// A single literal endpoint
    pub fn single(addr: SocketAddr) -> Self {
        Candidates {
            endpoints: vec![addr],
            index: 0,
        }
    }

    /// Whether another candidate remains
    pub fn has_next(&self) -> bool {
        self.index < self.endpoints.len()
    }

    /// Number of candidates not yet taken
    pub fn remaining(&self) -> usize {
        self.endpoints.len() - self.index
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Every candidate in attempt order
    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.endpoints
    }
}

impl Iterator for Candidates {
    type Item = SocketAddr;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.endpoints.get(self.index).copied()?;
        self.index += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

/// Parse `host` as a literal IP, accepting a bracketed IPv6 form.
pub fn parse_literal(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(host);
    unbracketed.parse().ok()
}

/// Resolve `host:port` and hand the outcome to `on_complete` exactly once.
///
/// A literal host completes before this function returns and yields `None`.
/// Otherwise the lookup runs on `runtime` and the returned handle cancels it;
/// a cancelled lookup never invokes `on_complete`.
pub fn resolve<F>(
    runtime: &Handle,
    resolver: Arc<dyn Resolve>,
    host: &str,
    port: u16,
    family: Family,
    on_complete: F,
) -> Option<AbortHandle>
where
    F: FnOnce(Result<Candidates>) + Send + 'static,
{
    if let Some(ip) = parse_literal(host) {
        on_complete(Ok(Candidates::single(SocketAddr::new(ip, port))));
        return None;
    }

    let host = host.to_string();
    let task = runtime.spawn(async move {
        let result = match resolver.lookup(&host, port, family).await {
            Ok(addrs) if addrs.is_empty() => Err(Error::NoCandidates(host)),
            Ok(addrs) => Ok(Candidates::new(addrs)),
            Err(source) => Err(Error::ResolutionFailed { host, source }),
        };
        on_complete(result);
    });
    Some(task.abort_handle())
}
