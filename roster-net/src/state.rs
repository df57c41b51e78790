//! Authoritative broker state: the directory plus live emitter bindings.
//!
//! Every mutation follows validate → mutate → broadcast. Broadcasts go to
//! every connected endpoint's outbox and are best-effort: a full outbox
//! drops the event for that recipient instead of blocking the mutator.
//!
//! `BrokerState` lives behind one mutex (`SharedState`); holding the lock
//! across mutate+broadcast — and across the login snapshot — is what gives
//! replicas their ordering guarantees.

use std::collections::HashMap;
use std::sync::mpsc::TrySendError;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use roster_types::{Directory, DirectoryError, StatusView};

use crate::emitter::{Emitter, EmitterHandle};
use crate::error::NetError;
use crate::protocol::{Message, MessageType};

pub type SharedState = Arc<Mutex<BrokerState>>;

/// The live claim one session holds on an endpoint.
struct Binding {
    session: u64,
    handle: EmitterHandle,
}

/// The broker's authoritative directory and connection registry.
pub struct BrokerState {
    directory: Directory,
    /// Endpoint name → the session currently identified as it.
    bindings: HashMap<String, Binding>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self {
            directory: Directory::new(),
            bindings: HashMap::new(),
        }
    }

    /// Wrap a fresh state for sharing across session threads.
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Read access to the directory. All mutation goes through the
    /// event-emitting operations below.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Read-only snapshot for status reporting.
    pub fn status(&self) -> StatusView {
        StatusView::capture(&self.directory)
    }

    // ── Administrative operations ───────────────────────────────────

    pub fn new_user(&mut self, name: &str) -> Result<(), DirectoryError> {
        self.directory.new_user(name)?;
        info!("directory: new user {}", name);
        self.broadcast(notify_new_user(name));
        Ok(())
    }

    /// Set a user's password. Not replicated: verifiers never leave the
    /// broker.
    pub fn set_password(&mut self, user: &str, password: &str) -> Result<(), DirectoryError> {
        self.directory.user_mut(user)?.set_password(password);
        Ok(())
    }

    pub fn new_group(&mut self, name: &str, owner: &str) -> Result<(), DirectoryError> {
        self.directory.new_group(name, owner)?;
        info!("directory: new group {} (owner {})", name, owner);
        self.broadcast(notify_new_group(name, owner));
        Ok(())
    }

    pub fn new_endpoint(&mut self, name: &str, owner: &str) -> Result<(), DirectoryError> {
        self.directory.new_endpoint(name, owner)?;
        info!("directory: new endpoint {} (owner {})", name, owner);
        self.broadcast(notify_new_endpoint(name, owner));
        Ok(())
    }

    pub fn remove_endpoint(&mut self, name: &str) -> Result<(), DirectoryError> {
        self.directory.remove_endpoint(name)?;
        self.bindings.remove(name);
        info!("directory: removed endpoint {}", name);
        self.broadcast(notify_remove_endpoint(name));
        Ok(())
    }

    pub fn remove_group(&mut self, name: &str) -> Result<(), DirectoryError> {
        self.directory.remove_group(name)?;
        info!("directory: removed group {}", name);
        self.broadcast(notify_remove_group(name));
        Ok(())
    }

    /// Remove a user: owned endpoints first, then owned groups, then the
    /// user itself, each with its own event.
    pub fn remove_user(&mut self, name: &str) -> Result<(), DirectoryError> {
        self.directory.user(name)?;
        for endpoint in self.directory.owned_endpoints(name) {
            self.remove_endpoint(&endpoint)?;
        }
        for group in self.directory.owned_groups(name) {
            self.remove_group(&group)?;
        }
        self.directory.remove_user(name)?;
        info!("directory: removed user {}", name);
        self.broadcast(notify_remove_user(name));
        Ok(())
    }

    pub fn group_add_group(&mut self, parent: &str, child: &str) -> Result<(), DirectoryError> {
        if self.directory.group_add_group(parent, child)? {
            self.broadcast(notify_group_group_join(parent, child));
        }
        Ok(())
    }

    pub fn group_remove_group(&mut self, parent: &str, child: &str) -> Result<(), DirectoryError> {
        if self.directory.group_remove_group(parent, child)? {
            self.broadcast(notify_group_group_leave(parent, child));
        }
        Ok(())
    }

    pub fn group_add_endpoint(&mut self, group: &str, endpoint: &str) -> Result<(), DirectoryError> {
        if self.directory.group_add_endpoint(group, endpoint)? {
            self.broadcast(notify_group_endpoint_join(group, endpoint));
        }
        Ok(())
    }

    pub fn group_remove_endpoint(
        &mut self,
        group: &str,
        endpoint: &str,
    ) -> Result<(), DirectoryError> {
        if self.directory.group_remove_endpoint(group, endpoint)? {
            self.broadcast(notify_group_endpoint_leave(group, endpoint));
        }
        Ok(())
    }

    /// Mark an endpoint that never dials in as reachable (or not). The
    /// flag itself stays broker-local; replicas see it as online/offline.
    pub fn set_static_online(&mut self, name: &str, online: bool) -> Result<(), DirectoryError> {
        let endpoint = self.directory.endpoint_mut(name)?;
        if endpoint.static_online() == online {
            return Ok(());
        }
        let was_online = endpoint.online();
        endpoint.set_static_online(online);
        let now_online = endpoint.online();
        // A connected endpoint losing the flag is still reachable; only
        // actual reachability changes are announced.
        if now_online && !was_online {
            self.broadcast(notify_endpoint_online(name));
        } else if !now_online && was_online {
            self.broadcast(notify_endpoint_offline(name));
        }
        Ok(())
    }

    // ── Tokens ──────────────────────────────────────────────────────

    /// Find the user holding an auth token, if any.
    pub fn find_token_user(&self, token: &str) -> Option<String> {
        self.directory
            .users()
            .find(|u| u.check_token(token))
            .map(|u| u.name().to_string())
    }

    pub fn new_token(&mut self, user: &str) -> Result<String, DirectoryError> {
        Ok(self.directory.user_mut(user)?.new_token())
    }

    pub fn delete_token(&mut self, user: &str, token: &str) -> Result<(), DirectoryError> {
        self.directory.user_mut(user)?.remove_token(token);
        Ok(())
    }

    // ── Endpoint identification ─────────────────────────────────────

    /// Bind `session` to `hostname` on behalf of `user`.
    ///
    /// An existing endpoint owned by the user is stolen: the previous
    /// holder's binding is closed (with an offline event) before the new
    /// one goes up. A hostname owned by someone else is rejected. An
    /// unused hostname creates the endpoint, with its new-endpoint event
    /// broadcast ahead of the online event.
    pub fn identify(
        &mut self,
        session: u64,
        user: &str,
        hostname: &str,
        handle: EmitterHandle,
    ) -> Result<(), DirectoryError> {
        let exists = match self.directory.endpoint(hostname) {
            Ok(endpoint) if endpoint.owner() != user => return Err(DirectoryError::NotOwner),
            Ok(_) => true,
            Err(_) => false,
        };
        if exists {
            // Steal: the previous holder's binding closes first.
            self.release_binding(hostname);
        } else {
            self.new_endpoint(hostname, user)?;
        }
        self.directory.endpoint_mut(hostname)?.set_connected(true);
        self.bindings
            .insert(hostname.to_string(), Binding { session, handle });
        info!("endpoint {} identified (user {})", hostname, user);
        self.broadcast(notify_endpoint_online(hostname));
        Ok(())
    }

    /// Release `session`'s claim on `hostname`, if it still holds one.
    /// No-ops when the endpoint was re-claimed by another session in the
    /// meantime, so cleanup after a takeover emits nothing.
    pub fn disconnect_endpoint(&mut self, hostname: &str, session: u64) {
        match self.bindings.get(hostname) {
            Some(binding) if binding.session == session => {}
            _ => return,
        }
        self.release_binding(hostname);
    }

    /// Tear down whatever binding `hostname` has, emitting the offline
    /// event. Quiet when there is none.
    fn release_binding(&mut self, hostname: &str) {
        if self.bindings.remove(hostname).is_none() {
            return;
        }
        if let Ok(endpoint) = self.directory.endpoint_mut(hostname) {
            endpoint.set_connected(false);
        }
        info!("endpoint {} disconnected", hostname);
        self.broadcast(notify_endpoint_offline(hostname));
    }

    /// True if `session` currently holds the binding for `hostname`.
    pub fn holds_binding(&self, hostname: &str, session: u64) -> bool {
        matches!(self.bindings.get(hostname), Some(b) if b.session == session)
    }

    // ── Replication ─────────────────────────────────────────────────

    /// Fan an event out to every connected endpoint's outbox.
    pub fn broadcast(&self, msg: Message) {
        for (name, binding) in &self.bindings {
            match binding.handle.send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("outbox full for endpoint {}, dropping event", name);
                }
                Err(TrySendError::Disconnected(_)) => {
                    // The session died; its own cleanup prunes the binding.
                    debug!("outbox closed for endpoint {}", name);
                }
            }
        }
    }

    /// Replay the directory to one peer as an ordered event sequence:
    /// users, endpoints, then all pure groups, then their memberships.
    /// Every referenced name exists replica-side before anything refers
    /// to it. Callers hold the state lock, so nothing interleaves.
    pub fn push_state(&self, emitter: &Emitter) -> Result<(), NetError> {
        for user in self.directory.users() {
            emitter.send(notify_new_user(user.name()))?;
        }
        for endpoint in self.directory.endpoints() {
            emitter.send(notify_new_endpoint(endpoint.name(), endpoint.owner()))?;
        }
        // Declare every pure group before replaying any membership, so a
        // group-group edge never references an unseen group.
        for group in self.directory.pure_groups() {
            emitter.send(notify_new_group(group.name(), group.owner()))?;
        }
        for group in self.directory.pure_groups() {
            for member in group.groups() {
                emitter.send(notify_group_group_join(group.name(), member))?;
            }
            for member in group.endpoints() {
                emitter.send(notify_group_endpoint_join(group.name(), member))?;
            }
        }
        Ok(())
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Event notifiers ─────────────────────────────────────────────────

fn notify_new_user(name: &str) -> Message {
    Message::event(MessageType::EventNewUser).with("name", name)
}

fn notify_new_group(name: &str, owner: &str) -> Message {
    Message::event(MessageType::EventNewGroup)
        .with("name", name)
        .with("owner", owner)
}

fn notify_new_endpoint(name: &str, owner: &str) -> Message {
    Message::event(MessageType::EventNewEndpoint)
        .with("name", name)
        .with("owner", owner)
}

fn notify_remove_endpoint(name: &str) -> Message {
    Message::event(MessageType::EventRemoveEndpoint).with("name", name)
}

fn notify_remove_group(name: &str) -> Message {
    Message::event(MessageType::EventRemoveGroup).with("name", name)
}

fn notify_remove_user(name: &str) -> Message {
    Message::event(MessageType::EventRemoveUser).with("name", name)
}

fn notify_endpoint_online(name: &str) -> Message {
    Message::event(MessageType::EventEndpointOnline).with("name", name)
}

fn notify_endpoint_offline(name: &str) -> Message {
    Message::event(MessageType::EventEndpointOffline).with("name", name)
}

fn notify_group_group_join(group: &str, target: &str) -> Message {
    Message::event(MessageType::EventGroupGroupJoin)
        .with("group", group)
        .with("target", target)
}

fn notify_group_group_leave(group: &str, target: &str) -> Message {
    Message::event(MessageType::EventGroupGroupLeave)
        .with("group", group)
        .with("target", target)
}

fn notify_group_endpoint_join(group: &str, endpoint: &str) -> Message {
    Message::event(MessageType::EventGroupEndpointJoin)
        .with("group", group)
        .with("endpoint", endpoint)
}

fn notify_group_endpoint_leave(group: &str, endpoint: &str) -> Message {
    Message::event(MessageType::EventGroupEndpointLeave)
        .with("group", group)
        .with("endpoint", endpoint)
}
