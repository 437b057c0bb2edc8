use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::Stream;

/// Default TCP listen port of the daemon.
pub const DEFAULT_PORT: u16 = 8000;

/// TCP stream-socket transport.
///
/// Binds a listening socket and hands out connected [`Stream`]s. The daemon
/// accepts exactly one connection per process lifetime; that policy lives
/// in the session layer, not here.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (e.g. `0.0.0.0:8000`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(%local_addr, "listening for incoming client connection");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok(Stream::from_tcp(stream))
    }

    /// Connect to a listening daemon (blocking).
    pub fn connect(addr: &str) -> Result<Stream> {
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected to daemon");
        Ok(Stream::from_tcp(stream))
    }

    /// The address this transport is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
