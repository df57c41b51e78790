//! Read-only snapshot of the directory for status reporting.
//!
//! This is the contract the broker's status page consumes: a serializable
//! view with no verifiers, tokens, or channel handles in it.

use serde::Serialize;

use crate::directory::Directory;

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub owner: String,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub name: String,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub owner: String,
    pub groups: Vec<String>,
    pub endpoints: Vec<String>,
}

/// Point-in-time view of the whole directory.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub users: Vec<UserStatus>,
    pub groups: Vec<GroupStatus>,
}

impl StatusView {
    /// Snapshot a directory. Personal groups are folded into their user's
    /// entry; only pure groups are listed as groups.
    pub fn capture(dir: &Directory) -> Self {
        let users = dir
            .users()
            .map(|user| UserStatus {
                name: user.name().to_string(),
                endpoints: dir
                    .endpoints()
                    .filter(|e| e.owner() == user.name())
                    .map(|e| EndpointStatus {
                        name: e.name().to_string(),
                        owner: e.owner().to_string(),
                        online: e.online(),
                    })
                    .collect(),
            })
            .collect();
        let groups = dir
            .pure_groups()
            .map(|g| GroupStatus {
                name: g.name().to_string(),
                owner: g.owner().to_string(),
                groups: g.groups().map(str::to_string).collect(),
                endpoints: g.endpoints().map(str::to_string).collect(),
            })
            .collect();
        Self { users, groups }
    }
}
