//! Convenience wiring between transports and sessions.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use testgear_transport::{Stream, TcpTransport};
use testgear_wire::{MessageReader, MessageWriter, WireConfig};
use tracing::info;

use crate::client::Client;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Where a daemon listens or a client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`.
    Tcp(String),
    /// Path of a Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    pub fn connect(&self, config: WireConfig) -> Result<Client<Stream, Stream>> {
        match self {
            Endpoint::Tcp(addr) => connect_tcp(addr, config),
            Endpoint::Unix(path) => connect_unix(path.clone(), config),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Connect a client over TCP.
pub fn connect_tcp(addr: &str, config: WireConfig) -> Result<Client<Stream, Stream>> {
    let stream = TcpTransport::connect(addr)?;
    Client::from_stream(stream, config)
}

/// Connect a client over a Unix domain socket.
#[cfg(unix)]
pub fn connect_unix(path: impl Into<PathBuf>, config: WireConfig) -> Result<Client<Stream, Stream>> {
    let stream = testgear_transport::UnixDomainSocket::connect(path.into())?;
    Client::from_stream(stream, config)
}

#[cfg(not(unix))]
pub fn connect_unix(path: impl Into<PathBuf>, config: WireConfig) -> Result<Client<Stream, Stream>> {
    let _ = config;
    Err(testgear_transport::TransportError::Unsupported(format!(
        "unix domain sockets are unavailable on this platform ({})",
        path.into().display()
    ))
    .into())
}

/// Serve one accepted connection until it closes or `running` is cleared.
pub fn serve_stream(
    dispatcher: &mut Dispatcher,
    stream: Stream,
    config: WireConfig,
    running: &AtomicBool,
) -> Result<()> {
    info!(
        peer = %stream.peer_description(),
        transport = stream.transport_name(),
        "serving connection"
    );
    let reader_stream = stream.try_clone()?;
    let mut reader = MessageReader::with_config_stream(reader_stream, config.clone())?;
    let mut writer = MessageWriter::with_config_stream(stream, config)?;
    dispatcher.serve_while(&mut reader, &mut writer, running)
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;

    use testgear_plugin::{BuiltinLoader, ProviderRegistry};
    use testgear_transport::UnixDomainSocket;

    use super::*;

    #[test]
    fn unix_endpoint_round_trip() {
        let dir = std::env::temp_dir().join(format!("testgear-session-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("daemon.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let server = thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut dispatcher = Dispatcher::new(ProviderRegistry::new(BuiltinLoader::new()));
            serve_stream(
                &mut dispatcher,
                stream,
                WireConfig::default(),
                &AtomicBool::new(true),
            )
            .unwrap();
            dispatcher.handled()
        });

        let endpoint = Endpoint::Unix(sock_path.clone());
        assert!(endpoint.to_string().starts_with("unix://"));
        let mut client = endpoint.connect(WireConfig::default()).unwrap();
        client.load("dummy").unwrap();
        assert_eq!(client.get_short("dummy.short0").unwrap(), 0);
        drop(client);

        assert_eq!(server.join().unwrap(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tcp_endpoint_round_trip() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let server = thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut dispatcher = Dispatcher::new(ProviderRegistry::new(BuiltinLoader::new()));
            serve_stream(
                &mut dispatcher,
                stream,
                WireConfig::default(),
                &AtomicBool::new(true),
            )
            .unwrap();
        });

        let mut client = connect_tcp(&addr, WireConfig::default()).unwrap();
        assert!(client.list_plugins().unwrap().is_empty());
        drop(client);
        server.join().unwrap();
    }
}
