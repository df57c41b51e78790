//! The directory aggregate: users, endpoints, groups and their invariants.
//!
//! Entities live in name-keyed maps (arena-plus-index-by-name); membership
//! is stored as forward name sets only, so there are no reference cycles to
//! manage. Names are unique across all three kinds, personal groups
//! included, and every mutation checks that before inserting.

mod endpoint;
mod group;
mod user;

pub use endpoint::Endpoint;
pub use group::Group;
pub use user::User;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::DirectoryError;

/// A node found by deep lookup: either a group or an endpoint.
#[derive(Debug)]
pub enum DeepNode<'a> {
    Group(&'a Group),
    Endpoint(&'a Endpoint),
}

impl DeepNode<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Group(g) => g.name(),
            Self::Endpoint(e) => e.name(),
        }
    }
}

/// The in-memory directory of users, endpoints, and groups.
///
/// Used authoritatively by the broker and as a passive replica by
/// instances. Mutators validate, then mutate; event emission is layered on
/// top by the broker state (roster-net).
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: BTreeMap<String, User>,
    /// All groups, personal groups included.
    groups: BTreeMap<String, Group>,
    endpoints: BTreeMap<String, Endpoint>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is taken by any user, group, or endpoint.
    pub fn name_used(&self, name: &str) -> bool {
        self.users.contains_key(name)
            || self.groups.contains_key(name)
            || self.endpoints.contains_key(name)
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Create a user and its personal group.
    pub fn new_user(&mut self, name: &str) -> Result<(), DirectoryError> {
        if self.name_used(name) {
            return Err(DirectoryError::NameInUse);
        }
        self.users.insert(name.to_string(), User::new(name));
        self.groups.insert(name.to_string(), Group::new(name, name));
        Ok(())
    }

    pub fn user(&self, name: &str) -> Result<&User, DirectoryError> {
        self.users
            .get(name)
            .ok_or_else(|| DirectoryError::UserNotFound(name.to_string()))
    }

    pub fn user_mut(&mut self, name: &str) -> Result<&mut User, DirectoryError> {
        self.users
            .get_mut(name)
            .ok_or_else(|| DirectoryError::UserNotFound(name.to_string()))
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Remove a user, its personal group, and anything it still owns.
    ///
    /// The broker cascades owned endpoints and groups one by one first (so
    /// each removal gets its own event); the sweep here makes the operation
    /// safe to apply on replicas regardless.
    pub fn remove_user(&mut self, name: &str) -> Result<(), DirectoryError> {
        if !self.users.contains_key(name) {
            return Err(DirectoryError::UserNotFound(name.to_string()));
        }
        for endpoint in self.owned_endpoints(name) {
            let _ = self.remove_endpoint(&endpoint);
        }
        for group in self.owned_groups(name) {
            let _ = self.remove_group(&group);
        }
        // The personal group leaves every group that contained it.
        for group in self.groups.values_mut() {
            group.remove_group(name);
        }
        self.groups.remove(name);
        self.users.remove(name);
        Ok(())
    }

    /// Names of endpoints owned by `user`, in stable order.
    pub fn owned_endpoints(&self, user: &str) -> Vec<String> {
        self.endpoints
            .values()
            .filter(|e| e.owner() == user)
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Names of non-personal groups owned by `user`, in stable order.
    pub fn owned_groups(&self, user: &str) -> Vec<String> {
        self.groups
            .values()
            .filter(|g| g.owner() == user && g.name() != user)
            .map(|g| g.name().to_string())
            .collect()
    }

    // ── Endpoints ───────────────────────────────────────────────────

    /// Create an endpoint and add it to its owner's personal group.
    pub fn new_endpoint(&mut self, name: &str, owner: &str) -> Result<(), DirectoryError> {
        if self.name_used(name) {
            return Err(DirectoryError::NameInUse);
        }
        if !self.users.contains_key(owner) {
            return Err(DirectoryError::UserNotFound(owner.to_string()));
        }
        self.endpoints
            .insert(name.to_string(), Endpoint::new(name, owner));
        if let Some(personal) = self.groups.get_mut(owner) {
            personal.add_endpoint(name);
        }
        Ok(())
    }

    pub fn endpoint(&self, name: &str) -> Result<&Endpoint, DirectoryError> {
        self.endpoints
            .get(name)
            .ok_or_else(|| DirectoryError::EndpointNotFound(name.to_string()))
    }

    pub fn endpoint_mut(&mut self, name: &str) -> Result<&mut Endpoint, DirectoryError> {
        self.endpoints
            .get_mut(name)
            .ok_or_else(|| DirectoryError::EndpointNotFound(name.to_string()))
    }

    /// Every endpoint in the directory, in stable order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Remove an endpoint after detaching it from every group.
    pub fn remove_endpoint(&mut self, name: &str) -> Result<(), DirectoryError> {
        if !self.endpoints.contains_key(name) {
            return Err(DirectoryError::EndpointNotFound(name.to_string()));
        }
        for group in self.groups.values_mut() {
            group.remove_endpoint(name);
        }
        self.endpoints.remove(name);
        Ok(())
    }

    // ── Groups ──────────────────────────────────────────────────────

    /// Create a group and add it to its owner's personal group.
    pub fn new_group(&mut self, name: &str, owner: &str) -> Result<(), DirectoryError> {
        if self.name_used(name) {
            return Err(DirectoryError::NameInUse);
        }
        if !self.users.contains_key(owner) {
            return Err(DirectoryError::UserNotFound(owner.to_string()));
        }
        self.groups.insert(name.to_string(), Group::new(name, owner));
        if let Some(personal) = self.groups.get_mut(owner) {
            personal.add_group(name);
        }
        Ok(())
    }

    pub fn group(&self, name: &str) -> Result<&Group, DirectoryError> {
        self.groups
            .get(name)
            .ok_or_else(|| DirectoryError::GroupNotFound(name.to_string()))
    }

    pub fn group_mut(&mut self, name: &str) -> Result<&mut Group, DirectoryError> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| DirectoryError::GroupNotFound(name.to_string()))
    }

    /// Every group, personal groups included.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Groups that are not a user's personal group.
    pub fn pure_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups
            .values()
            .filter(|g| !self.users.contains_key(g.name()))
    }

    /// True if `name` names a personal group.
    pub fn is_personal(&self, name: &str) -> bool {
        self.users.contains_key(name) && self.groups.contains_key(name)
    }

    /// Remove a group after detaching it from every containing group.
    pub fn remove_group(&mut self, name: &str) -> Result<(), DirectoryError> {
        if !self.groups.contains_key(name) {
            return Err(DirectoryError::GroupNotFound(name.to_string()));
        }
        for group in self.groups.values_mut() {
            group.remove_group(name);
        }
        self.groups.remove(name);
        Ok(())
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Make `child` a member of `parent`. Returns whether the membership
    /// actually changed; rejects edges that would create a cycle.
    pub fn group_add_group(&mut self, parent: &str, child: &str) -> Result<bool, DirectoryError> {
        self.group(child)?;
        self.group(parent)?;
        if parent == child || self.has_descendant(child, parent) {
            return Err(DirectoryError::CycleForbidden);
        }
        Ok(self
            .groups
            .get_mut(parent)
            .ok_or_else(|| DirectoryError::GroupNotFound(parent.to_string()))?
            .add_group(child))
    }

    /// Remove `child` from `parent`'s members. Non-members are a no-op.
    pub fn group_remove_group(&mut self, parent: &str, child: &str) -> Result<bool, DirectoryError> {
        self.group(child)?;
        Ok(self
            .groups
            .get_mut(parent)
            .ok_or_else(|| DirectoryError::GroupNotFound(parent.to_string()))?
            .remove_group(child))
    }

    pub fn group_add_endpoint(
        &mut self,
        group: &str,
        endpoint: &str,
    ) -> Result<bool, DirectoryError> {
        self.endpoint(endpoint)?;
        Ok(self
            .groups
            .get_mut(group)
            .ok_or_else(|| DirectoryError::GroupNotFound(group.to_string()))?
            .add_endpoint(endpoint))
    }

    pub fn group_remove_endpoint(
        &mut self,
        group: &str,
        endpoint: &str,
    ) -> Result<bool, DirectoryError> {
        self.endpoint(endpoint)?;
        Ok(self
            .groups
            .get_mut(group)
            .ok_or_else(|| DirectoryError::GroupNotFound(group.to_string()))?
            .remove_endpoint(endpoint))
    }

    /// True if `target` is reachable from `group` through member-group
    /// edges. Breadth-first over forward sets; tolerates diamonds.
    pub fn has_descendant(&self, group: &str, target: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([group.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(g) = self.groups.get(&current) else {
                continue;
            };
            for member in g.groups() {
                if member == target {
                    return true;
                }
                queue.push_back(member.to_string());
            }
        }
        false
    }

    /// Groups whose member set contains the group `name`. Derived from
    /// forward membership, so it is consistent with it by construction.
    pub fn groups_containing_group(&self, name: &str) -> Vec<&str> {
        self.groups
            .values()
            .filter(|g| g.has_group(name))
            .map(Group::name)
            .collect()
    }

    /// Groups whose member set contains the endpoint `name`.
    pub fn groups_containing_endpoint(&self, name: &str) -> Vec<&str> {
        self.groups
            .values()
            .filter(|g| g.has_endpoint(name))
            .map(Group::name)
            .collect()
    }

    /// Find the unique node named `name` in the subtree rooted at `group`
    /// (the root itself excluded). Fails if there is no match; more than
    /// one match means the name-uniqueness invariant is broken, which is
    /// unrecoverable.
    pub fn deep_find(&self, group: &str, name: &str) -> Result<DeepNode<'_>, DirectoryError> {
        self.group(group)?;
        // A diamond can reach the same node twice, so matches are recorded
        // by kind rather than counted per visit.
        let mut group_match = false;
        let mut endpoint_match = false;
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([group.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(g) = self.groups.get(&current) else {
                continue;
            };
            for member in g.groups() {
                if member == name {
                    group_match = true;
                }
                queue.push_back(member.to_string());
            }
            if g.has_endpoint(name) {
                endpoint_match = true;
            }
        }
        match (group_match, endpoint_match) {
            (false, false) => Err(DirectoryError::NodeNotFound(name.to_string())),
            (true, false) => Ok(DeepNode::Group(&self.groups[name])),
            (false, true) => Ok(DeepNode::Endpoint(&self.endpoints[name])),
            (true, true) => panic!("directory name uniqueness violated for {:?}", name),
        }
    }

    /// Human-readable dump of the directory, for logs.
    pub fn describe(&self) -> String {
        let mut out = String::from("==== DIRECTORY\nUsers:\n");
        for user in self.users() {
            out.push_str(&format!("\t{}\n", user.name()));
            for endpoint in self.endpoints.values().filter(|e| e.owner() == user.name()) {
                out.push_str(&format!(
                    "\t... endpoint: {} (online? {})\n",
                    endpoint.name(),
                    endpoint.online()
                ));
            }
        }
        out.push_str("Groups:\n");
        for group in self.pure_groups() {
            out.push_str(&format!("\t{}\n", group.name()));
            for member in group.groups() {
                if self.is_personal(member) {
                    out.push_str(&format!("\t... member user: {}\n", member));
                } else {
                    out.push_str(&format!("\t... member group: {}\n", member));
                }
            }
            for member in group.endpoints() {
                out.push_str(&format!("\t... member endpoint: {}\n", member));
            }
        }
        out.push_str("====");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Directory {
        let mut dir = Directory::new();
        dir.new_user("alice").unwrap();
        dir.new_user("bob").unwrap();
        dir
    }

    #[test]
    fn names_unique_across_kinds() {
        let mut dir = seeded();
        assert_eq!(dir.new_user("alice"), Err(DirectoryError::NameInUse));
        assert_eq!(dir.new_group("alice", "bob"), Err(DirectoryError::NameInUse));
        assert_eq!(
            dir.new_endpoint("alice", "bob"),
            Err(DirectoryError::NameInUse)
        );
        dir.new_group("ops", "alice").unwrap();
        assert_eq!(dir.new_endpoint("ops", "bob"), Err(DirectoryError::NameInUse));
        assert_eq!(dir.new_user("ops"), Err(DirectoryError::NameInUse));
    }

    #[test]
    fn create_succeeds_iff_name_unused() {
        let mut dir = seeded();
        assert!(!dir.name_used("box1"));
        dir.new_endpoint("box1", "alice").unwrap();
        assert!(dir.name_used("box1"));
    }

    #[test]
    fn personal_group_is_created_and_hidden() {
        let dir = seeded();
        assert!(dir.group("alice").is_ok());
        assert_eq!(dir.group("alice").unwrap().owner(), "alice");
        assert!(dir.pure_groups().all(|g| g.name() != "alice"));
    }

    #[test]
    fn new_endpoint_joins_personal_group() {
        let mut dir = seeded();
        dir.new_endpoint("box1", "alice").unwrap();
        assert!(dir.group("alice").unwrap().has_endpoint("box1"));
        assert_eq!(
            dir.endpoints().map(Endpoint::name).collect::<Vec<_>>(),
            vec!["box1"]
        );
    }

    #[test]
    fn new_group_requires_owner() {
        let mut dir = seeded();
        assert!(matches!(
            dir.new_group("ops", "carol"),
            Err(DirectoryError::UserNotFound(_))
        ));
    }

    #[test]
    fn remove_user_cascades() {
        let mut dir = seeded();
        dir.new_endpoint("box1", "alice").unwrap();
        dir.new_group("ops", "alice").unwrap();
        dir.new_group("all", "bob").unwrap();
        dir.group_add_group("all", "alice").unwrap();
        dir.group_add_endpoint("all", "box1").unwrap();

        dir.remove_user("alice").unwrap();

        assert!(dir.user("alice").is_err());
        assert!(dir.endpoint("box1").is_err());
        assert!(dir.group("ops").is_err());
        assert!(dir.group("alice").is_err());
        let all = dir.group("all").unwrap();
        assert!(!all.has_group("alice"));
        assert!(!all.has_endpoint("box1"));
    }

    #[test]
    fn remove_group_detaches_from_parents() {
        let mut dir = seeded();
        dir.new_group("ops", "alice").unwrap();
        dir.new_group("all", "alice").unwrap();
        dir.group_add_group("all", "ops").unwrap();
        dir.remove_group("ops").unwrap();
        assert!(!dir.group("all").unwrap().has_group("ops"));
    }

    #[test]
    fn cycle_rejected_direct_and_transitive() {
        let mut dir = seeded();
        dir.new_group("a", "alice").unwrap();
        dir.new_group("b", "alice").unwrap();
        dir.new_group("c", "alice").unwrap();
        dir.group_add_group("a", "b").unwrap();
        dir.group_add_group("b", "c").unwrap();

        assert_eq!(
            dir.group_add_group("a", "a"),
            Err(DirectoryError::CycleForbidden)
        );
        assert_eq!(
            dir.group_add_group("b", "a"),
            Err(DirectoryError::CycleForbidden)
        );
        assert_eq!(
            dir.group_add_group("c", "a"),
            Err(DirectoryError::CycleForbidden)
        );
        // A diamond is fine: a→b, a→c, b→c already holds c.
        assert!(dir.group_add_group("a", "c").unwrap());
    }

    #[test]
    fn duplicate_join_reports_unchanged() {
        let mut dir = seeded();
        dir.new_group("ops", "alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();
        assert!(dir.group_add_endpoint("ops", "box1").unwrap());
        assert!(!dir.group_add_endpoint("ops", "box1").unwrap());
        assert!(dir.group_remove_endpoint("ops", "box1").unwrap());
        assert!(!dir.group_remove_endpoint("ops", "box1").unwrap());
    }

    #[test]
    fn deep_find_resolves_across_levels() {
        let mut dir = seeded();
        dir.new_group("a", "alice").unwrap();
        dir.new_group("b", "alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();
        dir.group_add_group("a", "b").unwrap();
        dir.group_add_endpoint("b", "box1").unwrap();

        match dir.deep_find("a", "box1").unwrap() {
            DeepNode::Endpoint(e) => assert_eq!(e.owner(), "alice"),
            other => panic!("expected endpoint, got {:?}", other),
        }
        match dir.deep_find("a", "b").unwrap() {
            DeepNode::Group(g) => assert_eq!(g.name(), "b"),
            other => panic!("expected group, got {:?}", other),
        }
        assert!(matches!(
            dir.deep_find("a", "nothere"),
            Err(DirectoryError::NodeNotFound(_))
        ));
    }

    #[test]
    fn containing_groups_match_forward_membership() {
        let mut dir = seeded();
        dir.new_group("a", "alice").unwrap();
        dir.new_group("b", "alice").unwrap();
        dir.new_endpoint("box1", "alice").unwrap();
        dir.group_add_group("a", "b").unwrap();
        dir.group_add_endpoint("a", "box1").unwrap();
        dir.group_add_endpoint("b", "box1").unwrap();

        assert_eq!(dir.groups_containing_group("b"), vec!["a", "alice"]);
        let mut parents = dir.groups_containing_endpoint("box1");
        parents.sort_unstable();
        assert_eq!(parents, vec!["a", "alice", "b"]);
    }
}
