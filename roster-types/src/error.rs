//! Error type for directory operations.
//!
//! The `Display` strings double as the protocol-level failure messages
//! carried in `Data.message`, so they are part of the wire contract.

/// Error type for directory mutations and lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The requested name collides with an existing user, group, or endpoint.
    NameInUse,
    UserNotFound(String),
    GroupNotFound(String),
    EndpointNotFound(String),
    /// Deep lookup found no group or endpoint with the requested name.
    NodeNotFound(String),
    /// Adding this membership edge would make a group its own ancestor.
    CycleForbidden,
    /// The endpoint exists but belongs to a different user.
    NotOwner,
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameInUse => write!(f, "Name in use"),
            Self::UserNotFound(_) => write!(f, "User does not exist"),
            Self::GroupNotFound(name) => write!(f, "Group not found: {}", name),
            Self::EndpointNotFound(name) => write!(f, "Endpoint not found: {}", name),
            Self::NodeNotFound(name) => write!(f, "Node not found: {}", name),
            Self::CycleForbidden => write!(f, "Group may not become its own ancestor"),
            Self::NotOwner => write!(f, "User does not own this hostname"),
        }
    }
}

impl std::error::Error for DirectoryError {}
