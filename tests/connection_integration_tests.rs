//! Integration tests for the connection lifecycle
//!
//! Peers are plain std listeners on the loopback interface. Name resolution
//! and dialing go through scripted implementations where a test needs to
//! control or observe them.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tcpduct::net::{Dial, Resolve, TcpDialer};
use tcpduct::{Family, Reactor, Socket, Status, TcpConnector};
use tokio::net::TcpStream;
use tokio::sync::Notify;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn reactor() -> Reactor {
    init_tracing();
    Reactor::start().expect("Failed to start reactor")
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");
    (listener, addr)
}

/// A loopback address nothing listens on
fn dead_addr() -> SocketAddr {
    let (_listener, addr) = listener();
    addr
}

/// Resolver returning a fixed endpoint list for any host
#[derive(Debug)]
struct FixedResolver(Vec<SocketAddr>);

#[async_trait]
impl Resolve for FixedResolver {
    async fn lookup(&self, _host: &str, _port: u16, _family: Family) -> io::Result<Vec<SocketAddr>> {
        Ok(self.0.clone())
    }
}

/// Resolver that fails every lookup
#[derive(Debug)]
struct FailingResolver;

#[async_trait]
impl Resolve for FailingResolver {
    async fn lookup(&self, host: &str, _port: u16, _family: Family) -> io::Result<Vec<SocketAddr>> {
        Err(io::Error::new(io::ErrorKind::NotFound, format!("{host} is unknown")))
    }
}

/// Resolver that holds every lookup until released
#[derive(Debug)]
struct GatedResolver {
    gate: Notify,
    addrs: Vec<SocketAddr>,
}

#[async_trait]
impl Resolve for GatedResolver {
    async fn lookup(&self, _host: &str, _port: u16, _family: Family) -> io::Result<Vec<SocketAddr>> {
        self.gate.notified().await;
        Ok(self.addrs.clone())
    }
}

/// Resolver whose lookup finishes, then blocks its worker until released,
/// so the result is handed back without passing another await point
#[derive(Debug)]
struct HeldResolver {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
    addrs: Vec<SocketAddr>,
}

#[async_trait]
impl Resolve for HeldResolver {
    async fn lookup(&self, _host: &str, _port: u16, _family: Family) -> io::Result<Vec<SocketAddr>> {
        let addrs = self.addrs.clone();
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(addrs)
    }
}

/// Dialer that waits for a release before connecting
#[derive(Debug, Default)]
struct GatedDialer {
    gate: Notify,
    attempts: Mutex<Vec<SocketAddr>>,
}

#[async_trait]
impl Dial for GatedDialer {
    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        self.attempts.lock().unwrap().push(addr);
        self.gate.notified().await;
        TcpDialer.dial(addr).await
    }
}

/// Dialer that records every attempted endpoint in order
#[derive(Debug, Default)]
struct RecordingDialer {
    attempts: Mutex<Vec<SocketAddr>>,
}

impl RecordingDialer {
    fn attempts(&self) -> Vec<SocketAddr> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dial for RecordingDialer {
    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        self.attempts.lock().unwrap().push(addr);
        TcpDialer.dial(addr).await
    }
}

#[test]
fn test_literal_connect_and_metadata() {
    let reactor = reactor();
    let (listener, addr) = listener();

    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    assert_eq!(socket.remote_port(), None);

    let (_peer, client_addr) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    assert_eq!(socket.remote_ip().as_deref(), Some("127.0.0.1"));
    assert_eq!(socket.remote_port(), Some(addr.port()));
    assert_eq!(socket.local_port(), Some(client_addr.port()));
    assert!(!socket.has_error());
}

#[test]
fn test_fallback_reaches_live_candidate() {
    let reactor = reactor();
    let (listener, live) = listener();
    let dead = [dead_addr(), dead_addr()];
    let dialer = Arc::new(RecordingDialer::default());

    let socket = TcpConnector::new()
        .resolver(Arc::new(FixedResolver(vec![dead[0], dead[1], live])))
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "service.test", live.port());

    let _peer = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());
    assert_eq!(dialer.attempts(), vec![dead[0], dead[1], live]);
    assert_eq!(socket.remote_port(), Some(live.port()));
}

#[test]
fn test_all_candidates_refused() {
    let reactor = reactor();
    let dead = [dead_addr(), dead_addr()];
    let dialer = Arc::new(RecordingDialer::default());

    let socket = TcpConnector::new()
        .resolver(Arc::new(FixedResolver(dead.to_vec())))
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "service.test", dead[0].port());

    wait_until(|| socket.status() == Status::Error);
    assert_eq!(dialer.attempts(), dead.to_vec());
    assert!(!socket.error_message().unwrap_or_default().is_empty());
}

#[test]
fn test_ipv4_candidates_tried_first() {
    let reactor = reactor();
    let (listener, live) = listener();
    let v6: SocketAddr = "[::1]:9".parse().unwrap();
    let dialer = Arc::new(RecordingDialer::default());

    let socket = TcpConnector::new()
        .resolver(Arc::new(FixedResolver(vec![v6, live])))
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "dual.test", live.port());

    let _peer = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());
    assert_eq!(dialer.attempts(), vec![live]);
}

#[test]
fn test_resolution_failure() {
    let reactor = reactor();
    let socket = TcpConnector::new()
        .resolver(Arc::new(FailingResolver))
        .connect(&reactor.handle(), "nowhere.test", 80);

    wait_until(|| socket.status() == Status::Error);
    let message = socket.error_message().unwrap_or_default();
    assert!(message.contains("nowhere.test"), "unexpected message: {message}");
}

#[test]
fn test_abort_before_resolution_never_connects() {
    let reactor = reactor();
    let (listener, live) = listener();
    listener.set_nonblocking(true).unwrap();
    let resolver = Arc::new(GatedResolver {
        gate: Notify::new(),
        addrs: vec![live],
    });
    let dialer = Arc::new(RecordingDialer::default());

    let socket = TcpConnector::new()
        .resolver(resolver.clone())
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "gated.test", live.port());
    assert!(socket.is_connecting());

    socket.abort();
    socket.abort();
    resolver.gate.notify_one();
    std::thread::sleep(Duration::from_millis(100));

    assert!(socket.is_connecting());
    assert!(dialer.attempts().is_empty());
    let err = listener.accept().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
}

#[test]
fn test_abort_after_lookup_finished() {
    init_tracing();
    let reactor = Reactor::with_threads(2).expect("Failed to start reactor");
    let (listener, live) = listener();
    listener.set_nonblocking(true).unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let resolver = Arc::new(HeldResolver {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
        addrs: vec![live],
    });
    let dialer = Arc::new(RecordingDialer::default());

    let socket = TcpConnector::new()
        .resolver(resolver)
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "held.test", live.port());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("lookup never started");

    socket.abort();
    release_tx.send(()).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    assert!(socket.is_connecting());
    assert!(dialer.attempts().is_empty());
    assert_eq!(listener.accept().unwrap_err().kind(), io::ErrorKind::WouldBlock);
}

#[test]
fn test_abort_while_dial_pending() {
    let reactor = reactor();
    let (listener, live) = listener();
    let dialer = Arc::new(GatedDialer::default());

    let socket = TcpConnector::new()
        .resolver(Arc::new(FixedResolver(vec![live])))
        .dialer(dialer.clone())
        .connect(&reactor.handle(), "gated.test", live.port());
    wait_until(|| !dialer.attempts.lock().unwrap().is_empty());

    socket.abort();
    dialer.gate.notify_one();
    let _peer = listener.accept().expect("Failed to accept connection");
    std::thread::sleep(Duration::from_millis(100));

    assert!(socket.is_connecting());
    assert_eq!(socket.remote_port(), None);
    socket.write(b"x");
    socket.send();
    assert_eq!(socket.send_buffer_size(), 1);
}

#[test]
fn test_borrowed_buffer_blocks_nothing() {
    let reactor = reactor();
    let (listener_a, addr_a) = listener();
    let socket = Arc::new(TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr_a.port()));
    let (mut peer, _) = listener_a.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());
    assert!(!socket.receive(4));

    let buffer = socket.receive_buffer();

    // the pending receive completes while the buffer is borrowed
    peer.write_all(b"data").unwrap();

    let (tx, rx) = mpsc::channel();
    let other = Arc::clone(&socket);
    std::thread::spawn(move || {
        let connected = other.is_connected();
        other.write(b"ping");
        other.send();
        let eof = other.is_eof();
        let _ = tx.send((connected, eof, other.receive(4)));
    });
    let (connected, eof, delivered) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("socket calls blocked on the borrowed buffer");
    assert!(connected);
    assert!(!eof);
    assert!(!delivered);

    // an unrelated connection still gets served by the reactor
    let (listener_b, addr_b) = listener();
    listener_b.set_nonblocking(true).unwrap();
    let other_socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr_b.port());
    wait_until(|| other_socket.is_connected());
    let _peer_b = loop {
        match listener_b.accept() {
            Ok((stream, _)) => break stream,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("accept failed: {e}"),
        }
    };

    assert!(buffer.is_empty());
    drop(buffer);

    wait_until(|| socket.receive(4));
    assert_eq!(socket.read(16), b"data");
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).expect("Failed to read from client");
    assert_eq!(&buf, b"ping");
}

#[test]
fn test_send_while_connecting_is_deferred() {
    let reactor = reactor();
    let (listener, live) = listener();
    let resolver = Arc::new(GatedResolver {
        gate: Notify::new(),
        addrs: vec![live],
    });

    let socket = TcpConnector::new()
        .resolver(resolver.clone())
        .connect(&reactor.handle(), "gated.test", live.port());
    socket.write(b"early");
    socket.send();
    assert_eq!(socket.send_buffer_size(), 5);

    resolver.gate.notify_one();
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    let mut buf = [0u8; 5];
    peer.read_exact(&mut buf).expect("Failed to read from client");
    assert_eq!(&buf, b"early");
    wait_until(|| socket.send_buffer_size() == 0);
}

#[test]
fn test_send_arrives_in_order() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    socket.write(b"Hello ");
    socket.send();
    socket.write(b"from ");
    socket.write(b"client");
    socket.send();

    let mut buf = [0u8; 17];
    peer.read_exact(&mut buf).expect("Failed to read from client");
    assert_eq!(&buf, b"Hello from client");
    wait_until(|| socket.send_buffer_size() == 0);
}

#[test]
fn test_bounded_receive_across_two_writes() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    peer.write_all(b"0123").unwrap();
    assert!(!socket.receive(10));
    assert_eq!(socket.receive_buffer_size(), 0);

    peer.write_all(b"456789").unwrap();
    wait_until(|| socket.receive(10));
    assert_eq!(socket.receive_buffer_size(), 10);
    assert_eq!(socket.read(64), b"0123456789");
}

#[test]
fn test_receive_all_then_eof() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());
    assert!(!socket.is_eof());

    peer.write_all(b"tail").unwrap();
    drop(peer);

    wait_until(|| {
        socket.receive_all();
        socket.receive_buffer_size() == 4
    });
    assert_eq!(socket.receive_buffer().read_string(16), "tail");
    wait_until(|| socket.is_eof());
    assert!(socket.is_connected());
}

#[test]
fn test_peer_close_during_receive_is_an_error() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    peer.write_all(b"ab").unwrap();
    assert!(!socket.receive(5));
    drop(peer);

    wait_until(|| socket.status() == Status::Error);
    assert!(socket.is_eof());
    assert!(!socket.receive(5));
}

#[test]
fn test_oversized_receive_is_an_error() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new()
        .max_receive(8)
        .connect(&reactor.handle(), "127.0.0.1", addr.port());
    let _peer = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    assert!(!socket.receive(9));
    assert_eq!(socket.status(), Status::Error);
}

#[test]
fn test_send_buffer_limit() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new()
        .send_buffer_limit(4)
        .connect(&reactor.handle(), "127.0.0.1", addr.port());
    let _peer = listener.accept().expect("Failed to accept connection");

    socket.write(b"abc");
    assert!(!socket.has_error());
    socket.write(b"de");
    assert_eq!(socket.status(), Status::Error);
    assert_eq!(socket.error_message().as_deref(), Some("send buffer limit exceeded"));

    socket.send();
    assert_eq!(socket.send_buffer_size(), 0);
}

#[test]
fn test_set_send_buffer_limit_at_runtime() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let _peer = listener.accept().expect("Failed to accept connection");

    socket.write(&[0u8; 64]);
    socket.set_send_buffer_limit(65);
    socket.write(b"x");
    assert!(!socket.has_error());
    socket.write(b"y");
    assert!(socket.has_error());
}

#[test]
fn test_set_nodelay() {
    let reactor = reactor();
    let (listener, live) = listener();
    let resolver = Arc::new(GatedResolver {
        gate: Notify::new(),
        addrs: vec![live],
    });
    let socket = TcpConnector::new()
        .nodelay(false)
        .resolver(resolver.clone())
        .connect(&reactor.handle(), "gated.test", live.port());

    assert!(socket.set_nodelay(true));
    resolver.gate.notify_one();
    let _peer = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());
    assert!(socket.set_nodelay(false));
}

#[test]
fn test_drop_with_receive_in_flight() {
    let reactor = reactor();
    let (listener, addr) = listener();
    let socket = TcpConnector::new().connect(&reactor.handle(), "127.0.0.1", addr.port());
    let (mut peer, _) = listener.accept().expect("Failed to accept connection");
    wait_until(|| socket.is_connected());

    assert!(!socket.receive(4));
    drop(socket);

    peer.write_all(b"late").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    reactor.shutdown();
}
