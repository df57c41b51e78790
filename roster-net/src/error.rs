//! Error type for the network layer.

/// Errors surfaced by connections, RPC turns, and replica application.
#[derive(Debug)]
pub enum NetError {
    Io(std::io::Error),
    Ws(Box<tungstenite::Error>),
    Json(serde_json::Error),
    /// The connection (or a queue bound to it) is gone.
    ConnectionLost,
    /// The broker answered `Success=false`; payload is its message string.
    Rejected(String),
    /// The local replica could not apply an event even after implicit
    /// creation. The mirror is no longer trustworthy.
    ReplicaInconsistent(String),
}

impl From<std::io::Error> for NetError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Ws(Box::new(e))
    }
}

impl From<serde_json::Error> for NetError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl std::fmt::Display for NetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Ws(e) => write!(f, "WebSocket error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Rejected(msg) => write!(f, "rejected: {}", msg),
            Self::ReplicaInconsistent(msg) => write!(f, "replica inconsistent: {}", msg),
        }
    }
}

impl std::error::Error for NetError {}
