//! Shared completion reactor
//!
//! Every asynchronous completion (lookup, connect, send, receive) runs on the
//! runtime owned by a [`Reactor`]. Start one before creating connections and
//! shut it down when the process is done with networking.

use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::net::{Error, Result};

const DEFAULT_WORKER_THREADS: usize = 1;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Owner of the completion runtime.
#[derive(Debug)]
pub struct Reactor {
    handle: Handle,
    /// Taken by `shutdown` or on drop
    runtime: Option<Runtime>,
}

impl Reactor {
    /// Start a reactor with a single completion thread
    pub fn start() -> Result<Self> {
        Self::with_threads(DEFAULT_WORKER_THREADS)
    }

    /// Start a reactor with `threads` completion threads (at least one)
    pub fn with_threads(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("tcpduct-reactor")
            .enable_io()
            .build()
            .map_err(Error::ReactorStart)?;
        debug!(threads = threads.max(1), "reactor started");
        Ok(Reactor {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Context on which completions are scheduled
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop the reactor, giving in-flight completions a short grace period
    pub fn shutdown(mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            debug!("reactor stopped");
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
