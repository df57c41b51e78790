//! Group entity: a named container of groups and endpoints.

use std::collections::BTreeSet;

/// A named container of member groups and member endpoints, owned by a user.
///
/// Members are stored as forward name sets; "which groups contain X" is
/// answered by scanning (see `Directory`). Personal groups share this shape
/// and differ only in being named after their owning user.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    owner: String,
    groups: BTreeSet<String>,
    endpoints: BTreeSet<String>,
}

impl Group {
    pub fn new(name: &str, owner: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            groups: BTreeSet::new(),
            endpoints: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Add a member group. Duplicate adds are no-ops; returns whether the
    /// membership actually changed.
    pub fn add_group(&mut self, name: &str) -> bool {
        self.groups.insert(name.to_string())
    }

    /// Remove a member group. Removing a non-member is a no-op.
    pub fn remove_group(&mut self, name: &str) -> bool {
        self.groups.remove(name)
    }

    pub fn add_endpoint(&mut self, name: &str) -> bool {
        self.endpoints.insert(name.to_string())
    }

    pub fn remove_endpoint(&mut self, name: &str) -> bool {
        self.endpoints.remove(name)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }

    pub fn has_endpoint(&self, name: &str) -> bool {
        self.endpoints.contains(name)
    }

    /// Member group names, in stable order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Member endpoint names, in stable order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_add_is_noop() {
        let mut g = Group::new("ops", "alice");
        assert!(g.add_endpoint("box1"));
        assert!(!g.add_endpoint("box1"));
        assert_eq!(g.endpoints().count(), 1);
    }

    #[test]
    fn remove_non_member_is_noop() {
        let mut g = Group::new("ops", "alice");
        assert!(!g.remove_group("nothere"));
        assert!(!g.remove_endpoint("nothere"));
    }
}
