use std::fmt::Write as _;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::trace;

use crate::error::Result;

/// A connected duplex byte stream implementing `Read + Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// Both the daemon and the client hold one of these per connection.
pub struct Stream {
    inner: StreamInner,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = match &mut self.inner {
            StreamInner::Tcp(stream) => stream.read(buf)?,
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf)?,
        };
        if read > 0 && tracing::enabled!(tracing::Level::TRACE) {
            trace!(len = read, bytes = %hex_dump(&buf[..read]), "received data");
        }
        Ok(read)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = match &mut self.inner {
            StreamInner::Tcp(stream) => stream.write(buf)?,
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf)?,
        };
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(len = written, bytes = %hex_dump(&buf[..written]), "sent data");
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl Stream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying socket. `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying socket. `None` blocks forever.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split one connection into independent reader and writer halves.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            StreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Shut down both directions. Blocked reads on any clone return end-of-stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(Into::into),
        }
    }

    /// Human-readable description of the remote end.
    pub fn peer_description(&self) -> String {
        match &self.inner {
            StreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown tcp peer".to_string()),
            #[cfg(unix)]
            StreamInner::Unix(_) => match self.peer_credentials() {
                Some((uid, _gid, pid)) => format!("unix peer (uid {uid}, pid {pid})"),
                None => "unix peer".to_string(),
            },
        }
    }

    /// Get the credentials of a connected Unix peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable
    /// or if this is a TCP stream.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            StreamInner::Unix(stream) => stream.as_raw_fd(),
            StreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of a connected Unix peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// Render bytes as space-separated `0x..` pairs, ten per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(if i % 10 == 0 { '\n' } else { ' ' });
        }
        let _ = write!(out, "0x{byte:02x}");
    }
    out
}
