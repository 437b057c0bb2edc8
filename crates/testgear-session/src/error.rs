use testgear_wire::WireError;

/// Errors that can occur while serving or issuing requests.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] testgear_transport::TransportError),

    /// Codec or framing error.
    #[error("wire error: {0}")]
    Wire(WireError),

    /// The daemon answered with `RSP_ERROR`.
    #[error("{0}")]
    Remote(String),

    /// An `RSP_OK` whose data does not fit the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The stream ended before a complete message was exchanged.
    #[error("{0}")]
    Disconnected(String),
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ConnectionClosed => {
                SessionError::Disconnected("connection closed by peer".to_string())
            }
            err @ WireError::UnexpectedEof { .. } => SessionError::Disconnected(err.to_string()),
            other => SessionError::Wire(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
