//! Endpoint entity: a named machine claimed by a user.

/// A named machine owned by a user.
///
/// `connected` tracks whether a live session currently claims this endpoint
/// (broker side) or the last online/offline event seen (replica side).
/// `static_online` is an advisory flag for machines that are reachable but
/// never dial in themselves.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    owner: String,
    connected: bool,
    static_online: bool,
}

impl Endpoint {
    pub fn new(name: &str, owner: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            connected: false,
            static_online: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn static_online(&self) -> bool {
        self.static_online
    }

    pub fn set_static_online(&mut self, static_online: bool) {
        self.static_online = static_online;
    }

    /// Whether the endpoint should be presented as reachable.
    pub fn online(&self) -> bool {
        self.connected || self.static_online
    }
}
