use bgblink_protocol::ProtocolError;

/// Errors that can end a connection or prevent one from starting.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer reset the socket or closed it in the middle of a frame.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    /// Writing a queued frame to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Dialing the remote endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Binding the listening socket or accepting from it failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A received frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
