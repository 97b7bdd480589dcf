//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{Connection, MessageHandler};
use crate::error::Result;

/// How often the accept loop checks for shutdown
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Idle connections are dropped after this long (milliseconds)
const IDLE_TIMEOUT_MS: u64 = 30_000;

/// TCP server for one node
pub struct Server {
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind to `addr`; port 0 picks a free port
    pub fn bind(addr: SocketAddr, handler: Arc<dyn MessageHandler>) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            handler,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops `run` when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "server listening");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Accepted sockets may inherit non-blocking mode
                    stream.set_nonblocking(false)?;
                    let handler = Arc::clone(&self.handler);
                    thread::spawn(move || match Connection::new(stream, handler) {
                        Ok(mut connection) => {
                            if let Err(e) = connection
                                .set_timeouts(IDLE_TIMEOUT_MS, IDLE_TIMEOUT_MS)
                                .and_then(|_| connection.handle())
                            {
                                tracing::debug!(%peer, error = %e, "connection closed with error");
                            }
                        }
                        Err(e) => tracing::warn!(%peer, error = %e, "failed to set up connection"),
                    });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}
