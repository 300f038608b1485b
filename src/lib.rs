//! tcpduct - duplex TCP connection lifecycle
//!
//! A [`TcpSocket`] resolves a host, tries every resolved endpoint in
//! IPv4-first order until one accepts, and then runs a buffered duplex byte
//! path over the established stream. Terminal failures surface as an explicit
//! error state rather than as panics or return values.
//!
//! ```no_run
//! use tcpduct::{Reactor, Socket, TcpConnector};
//!
//! let reactor = Reactor::start().unwrap();
//! let socket = TcpConnector::new()
//!     .nodelay(true)
//!     .connect(&reactor.handle(), "localhost", 8080);
//! socket.write(b"hello");
//! socket.send();
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod net;
pub mod reactor;
pub mod send_buffer;
pub mod socket;

pub use buffer::Buffer;
pub use config::SocketConfig;
pub use connection::{Status, TcpSocket};
pub use net::{Error, Family, Result, TcpConnector};
pub use reactor::Reactor;
pub use send_buffer::SendBuffer;
pub use socket::Socket;
