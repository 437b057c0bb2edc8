//! Duplex byte-stream transports for Test Gear.
//!
//! Provides a unified connected [`Stream`] over:
//! - TCP sockets (the daemon's default, port 8000)
//! - Unix domain sockets (local control and tests)
//!
//! This is the lowest layer. The wire codec and the session layer only ever
//! see `Read + Write`; nothing above this crate knows which socket family is
//! in use.

pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::Stream;
pub use tcp::{TcpTransport, DEFAULT_PORT};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
