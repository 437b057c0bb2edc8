use std::fmt;
use std::io;

use testgear_plugin::PluginError;
use testgear_session::SessionError;
use testgear_transport::TransportError;
use testgear_wire::WireError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Unsupported(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        WireError::ConnectionClosed | WireError::UnexpectedEof { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        WireError::NameTooLong { .. }
        | WireError::ValueTooLong { .. }
        | WireError::MissingName(_)
        | WireError::MissingValue(_)
        | WireError::ValueKindMismatch { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Wire(err) => wire_error(context, err),
        SessionError::Remote(_) | SessionError::Disconnected(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        SessionError::UnexpectedResponse(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn plugin_error(context: &str, err: PluginError) -> CliError {
    match err {
        PluginError::KindMismatch { .. } | PluginError::ReadOnly(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PluginError::NotFound { .. } | PluginError::AlreadyLoaded(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_plain_failures() {
        let err = session_error(
            "get failed",
            SessionError::Remote("Variable dummy.nope of int type not found".into()),
        );
        assert_eq!(err.code, FAILURE);
        assert_eq!(
            err.to_string(),
            "get failed: Variable dummy.nope of int type not found"
        );
    }

    #[test]
    fn refused_connections_map_to_transport_error() {
        let err = session_error(
            "connect failed",
            SessionError::Transport(TransportError::Connect {
                addr: "127.0.0.1:1".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn oversized_names_are_usage_errors() {
        let err = wire_error("encode failed", WireError::NameTooLong { len: 300, max: 255 });
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn read_timeouts_map_to_timeout() {
        let err = wire_error(
            "receive failed",
            WireError::Io(io::Error::from(io::ErrorKind::WouldBlock)),
        );
        assert_eq!(err.code, TIMEOUT);
    }
}
