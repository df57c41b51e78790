//! User entity: name, password verifier, active auth tokens.

use std::collections::BTreeSet;

use crate::auth::{mint_token, PasswordVerifier};

/// A directory user. Owns endpoints and groups; its personal group (same
/// name) aggregates them.
#[derive(Debug, Clone)]
pub struct User {
    name: String,
    verifier: Option<PasswordVerifier>,
    tokens: BTreeSet<String>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verifier: None,
            tokens: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the password verifier. A user with no verifier set rejects
    /// every login attempt.
    pub fn set_password(&mut self, password: &str) {
        self.verifier = Some(PasswordVerifier::derive(password));
    }

    pub fn check_password(&self, password: &str) -> bool {
        match &self.verifier {
            Some(v) => v.verify(password),
            None => false,
        }
    }

    /// Mint a fresh token for this user and register it as active.
    pub fn new_token(&mut self) -> String {
        let token = mint_token();
        self.tokens.insert(token.clone());
        token
    }

    pub fn check_token(&self, token: &str) -> bool {
        !token.is_empty() && self.tokens.contains(token)
    }

    /// Revoke a token. Revoking an unknown token is a no-op.
    pub fn remove_token(&mut self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_password_rejects_everything() {
        let u = User::new("alice");
        assert!(!u.check_password(""));
        assert!(!u.check_password("anything"));
    }

    #[test]
    fn token_lifecycle() {
        let mut u = User::new("alice");
        let t = u.new_token();
        assert!(u.check_token(&t));
        u.remove_token(&t);
        assert!(!u.check_token(&t));
        // Revoking again is a no-op.
        u.remove_token(&t);
    }

    #[test]
    fn empty_token_never_matches() {
        let u = User::new("alice");
        assert!(!u.check_token(""));
    }
}
