//! Network plumbing for tcpduct
//!
//! Address-family handling, endpoint resolution with IPv4-first candidate
//! ordering, and the TCP helpers the connection state machine is built on.

pub mod addr;
pub mod resolver;
pub mod tcp;

pub use addr::{EndpointInfo, Family};
pub use resolver::{Candidates, Resolve, SystemResolver};
pub use tcp::{Dial, TcpConnector, TcpDialer};

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Address resolution failed for {host}: {source}")]
    ResolutionFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No endpoints resolved for {0}")]
    NoCandidates(String),

    #[error("Reactor failed to start: {0}")]
    ReactorStart(std::io::Error),

    #[error("Unsupported address family: {0}")]
    UnsupportedFamily(String),
}
