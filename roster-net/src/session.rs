//! Broker-side session state machine for one peer connection.
//!
//! A session moves guest → authenticated user → identified endpoint.
//! Replies reuse the request envelope: `reply` is flipped on, `success`
//! set, and failure reasons land in `data.message`. Token management is
//! gated on full (password) login; token-authenticated sessions can
//! identify but not mint or revoke tokens.

use log::{info, warn};

use crate::emitter::Emitter;
use crate::error::NetError;
use crate::protocol::{Message, MessageType};
use crate::state::SharedState;

pub struct Session {
    id: u64,
    state: SharedState,
    emitter: Emitter,
    /// Authenticated user, if any.
    user: Option<String>,
    /// True only when authenticated by password, not by token.
    full_login: bool,
    /// Endpoint this session is identified as, if any.
    endpoint: Option<String>,
}

impl Session {
    pub fn new(id: u64, state: SharedState, emitter: Emitter) -> Self {
        Self {
            id,
            state,
            emitter,
            user: None,
            full_login: false,
            endpoint: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn full_login(&self) -> bool {
        self.full_login
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn current_user(&self) -> String {
        self.user.clone().unwrap_or_default()
    }

    /// Dispatch one request from the peer. A send error means the
    /// connection is broken and the caller must tear the session down.
    pub fn handle_request(&mut self, mut msg: Message) -> Result<(), NetError> {
        msg.reply = true;

        if self.user.is_none()
            && !matches!(msg.kind, MessageType::Login | MessageType::Auth)
        {
            msg.set("message", "Method not allowed");
            return self.emitter.send(msg);
        }

        // Re-authenticating as someone else while an endpoint is bound
        // would break the binding's ownership; deauth comes first.
        if self.user.is_some() && matches!(msg.kind, MessageType::Login | MessageType::Auth) {
            msg.set("message", "Already authenticated");
            return self.emitter.send(msg);
        }

        match msg.kind {
            MessageType::Login => self.handle_login(msg),
            MessageType::Auth => self.handle_auth(msg),
            MessageType::Logoff => {
                self.full_login = false;
                msg.success = true;
                self.emitter.send(msg)
            }
            MessageType::Deauth => {
                self.full_login = false;
                self.user = None;
                if let Some(endpoint) = self.endpoint.take() {
                    self.state
                        .lock()
                        .unwrap()
                        .disconnect_endpoint(&endpoint, self.id);
                }
                msg.success = true;
                self.emitter.send(msg)
            }
            MessageType::Identify => self.handle_identify(msg),
            MessageType::NewAuthToken => self.handle_new_token(msg),
            MessageType::DeleteAuthToken => self.handle_delete_token(msg),
            _ => {
                warn!("session {}: unhandled message {:?}", self.id, msg.kind);
                Ok(())
            }
        }
    }

    fn handle_login(&mut self, mut msg: Message) -> Result<(), NetError> {
        let username = msg.get("username").to_string();
        let password = msg.get("password").to_string();
        info!("session {}: login attempt for {}", self.id, username);

        let failure = {
            let state = self.state.lock().unwrap();
            match state.directory().user(&username) {
                Err(_) => Some("User does not exist"),
                Ok(user) if !user.check_password(&password) => Some("Invalid password"),
                Ok(_) => None,
            }
        };

        match failure {
            Some(reason) => {
                msg.set("message", reason);
                self.emitter.send(msg)
            }
            None => {
                self.user = Some(username.clone());
                self.full_login = true;
                info!("session {}: user {} logged in", self.id, username);
                msg.success = true;
                self.emitter.send(msg)?;
                // Lock held across the snapshot so no concurrent event can
                // outrun it into this peer's outbox.
                self.state.lock().unwrap().push_state(&self.emitter)
            }
        }
    }

    fn handle_auth(&mut self, mut msg: Message) -> Result<(), NetError> {
        let token = msg.get("token").to_string();
        let holder = self.state.lock().unwrap().find_token_user(&token);
        match holder {
            None => {
                msg.set("message", "Invalid token");
                self.emitter.send(msg)
            }
            Some(username) => {
                self.user = Some(username.clone());
                self.full_login = false;
                info!("session {}: user {} authenticated by token", self.id, username);
                msg.success = true;
                self.emitter.send(msg)?;
                self.state.lock().unwrap().push_state(&self.emitter)
            }
        }
    }

    fn handle_identify(&mut self, mut msg: Message) -> Result<(), NetError> {
        let hostname = msg.get("hostname").to_string();
        let user = self.current_user();

        let result = {
            let mut state = self.state.lock().unwrap();
            let result = state.identify(self.id, &user, &hostname, self.emitter.handle());
            if result.is_ok() {
                // A session re-identifying under a new hostname releases
                // its old claim; the old binding check keeps this from
                // firing after a takeover by someone else.
                if let Some(prev) = self.endpoint.take() {
                    if prev != hostname {
                        state.disconnect_endpoint(&prev, self.id);
                    }
                }
            }
            result
        };

        match result {
            Ok(()) => {
                self.endpoint = Some(hostname);
                msg.success = true;
            }
            Err(e) => {
                msg.set("message", &e.to_string());
            }
        }
        self.emitter.send(msg)
    }

    fn handle_new_token(&mut self, mut msg: Message) -> Result<(), NetError> {
        if !self.full_login {
            msg.set("message", "Method requires full login");
            return self.emitter.send(msg);
        }
        let user = self.current_user();
        match self.state.lock().unwrap().new_token(&user) {
            Ok(token) => {
                msg.set("token", &token);
                msg.success = true;
            }
            Err(e) => {
                msg.set("message", &e.to_string());
            }
        }
        self.emitter.send(msg)
    }

    fn handle_delete_token(&mut self, mut msg: Message) -> Result<(), NetError> {
        if !self.full_login {
            msg.set("message", "Method requires full login");
            return self.emitter.send(msg);
        }
        let user = self.current_user();
        let token = msg.get("token").to_string();
        match self.state.lock().unwrap().delete_token(&user, &token) {
            Ok(()) => msg.success = true,
            Err(e) => msg.set("message", &e.to_string()),
        }
        self.emitter.send(msg)
    }

    /// Tear-down path: release the endpoint claim (broadcasting offline)
    /// and forget the authentication. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            info!(
                "session {}: endpoint {} disconnected ({})",
                self.id,
                endpoint,
                self.user.as_deref().unwrap_or("?")
            );
            self.state
                .lock()
                .unwrap()
                .disconnect_endpoint(&endpoint, self.id);
        }
        self.user = None;
        self.full_login = false;
    }
}
