//! TCP socket utilities
//!
//! Dialing, the non-blocking helpers used by the duplex path, and the
//! [`TcpConnector`] builder that starts a [`TcpSocket`].

use std::fmt;
use std::io::{self, Read};
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use async_trait::async_trait;
use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use super::addr::Family;
use super::resolver::{Resolve, SystemResolver};
use crate::config::SocketConfig;
use crate::connection::TcpSocket;

/// Opens a stream to one candidate endpoint.
#[async_trait]
pub trait Dial: Send + Sync + fmt::Debug {
    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream>;
}

/// Plain asynchronous TCP connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dial for TcpDialer {
    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Number of bytes the kernel holds ready to read (FIONREAD).
pub fn available(stream: &TcpStream) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    let ret = unsafe {
        libc::ioctl(
            stream.as_raw_fd(),
            libc::FIONREAD,
            &mut count as *mut libc::c_int,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Append up to `max` already-available bytes to `out` without waiting.
///
/// Reads at most what [`available`] reports, so the call never parks the
/// caller. Returns the number of bytes appended.
pub fn read_available(stream: &TcpStream, max: usize, out: &mut Vec<u8>) -> io::Result<usize> {
    let wanted = max.min(available(stream)?);
    if wanted == 0 {
        return Ok(0);
    }

    let start = out.len();
    out.resize(start + wanted, 0);
    let sock = SockRef::from(stream);
    let mut reader: &socket2::Socket = &sock;
    let mut filled = 0;

    while filled < wanted {
        match reader.read(&mut out[start + filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                out.truncate(start + filled);
                return Err(e);
            }
        }
    }

    out.truncate(start + filled);
    Ok(filled)
}

/// Peek one byte without consuming it or waiting for it.
///
/// - `Ok(true)`: the peer closed its side
/// - `Ok(false)`: data is pending, or nothing is known yet
/// - `Err(e)`: the connection is broken
pub fn peek_eof(stream: &TcpStream) -> io::Result<bool> {
    let sock = SockRef::from(stream);
    let mut byte = [MaybeUninit::<u8>::uninit(); 1];
    match sock.peek(&mut byte) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// One asynchronous send of as much of `data` as the kernel accepts.
pub async fn send_some(stream: &TcpStream, data: &[u8]) -> io::Result<usize> {
    loop {
        stream.writable().await?;
        match stream.try_write(data) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Asynchronously read exactly `amount` bytes.
///
/// End of stream before `amount` bytes is an `UnexpectedEof` error.
pub async fn read_exact(stream: &TcpStream, amount: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; amount];
    let mut filled = 0;

    while filled < amount {
        stream.readable().await?;
        match stream.try_read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(buf)
}

/// Check if an I/O error is an ordinary disconnect rather than a fault
///
/// Peers going away is expected on a long-lived connection; callers use this
/// to pick a log level, never to decide whether the error is terminal.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    ) || matches!(
        err.raw_os_error(),
        Some(libc::ECONNRESET)
            | Some(libc::ENOTCONN)
            | Some(libc::EPIPE)
            | Some(libc::ENETRESET)
            | Some(libc::ECONNABORTED)
    )
}

/// TCP connection builder
///
/// # Examples
///
/// ```no_run
/// use tcpduct::{Family, Reactor, Socket, TcpConnector};
///
/// let reactor = Reactor::start().unwrap();
/// let socket = TcpConnector::new()
///     .family(Family::V4)
///     .nodelay(false)
///     .connect(&reactor.handle(), "example.com", 80);
/// assert!(socket.is_connecting() || socket.error_message().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: SocketConfig,
    resolver: Arc<dyn Resolve>,
    dialer: Arc<dyn Dial>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnector {
    /// Create a new TCP connector with default settings
    pub fn new() -> Self {
        TcpConnector {
            config: SocketConfig::default(),
            resolver: Arc::new(SystemResolver),
            dialer: Arc::new(TcpDialer),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Restrict name resolution to one address family
    pub fn family(mut self, family: Family) -> Self {
        self.config = self.config.family(family);
        self
    }

    /// Set TCP_NODELAY once connected
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config = self.config.nodelay(nodelay);
        self
    }

    /// Cap a single bounded receive
    pub fn max_receive(mut self, max: usize) -> Self {
        self.config = self.config.max_receive(max);
        self
    }

    /// Cap the staged outbound bytes, 0 disables the limit
    pub fn send_buffer_limit(mut self, limit: usize) -> Self {
        self.config = self.config.send_buffer_limit(limit);
        self
    }

    /// Use a custom name resolver
    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a custom dialer
    pub fn dialer(mut self, dialer: Arc<dyn Dial>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Start connecting to `host:port`; completions run on `runtime`
    pub fn connect(&self, runtime: &Handle, host: &str, port: u16) -> TcpSocket {
        TcpSocket::start(
            runtime.clone(),
            Arc::clone(&self.resolver),
            Arc::clone(&self.dialer),
            self.config.clone(),
            host,
            port,
        )
    }
}
