//! Password verification and auth-token minting.
//!
//! Passwords are never stored or compared in plaintext: `PasswordVerifier`
//! holds an Argon2 PHC hash and verification is constant-time inside the
//! argon2 crate. Tokens are opaque hex strings drawn from the OS RNG.

use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier as _};
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a freshly minted auth token.
const TOKEN_BYTES: usize = 32;

/// An opaque, salted password verifier.
///
/// Holds the PHC-format Argon2 hash of a password. The plaintext is dropped
/// as soon as the hash is derived.
#[derive(Debug, Clone)]
pub struct PasswordVerifier(String);

impl PasswordVerifier {
    /// Derive a verifier from a plaintext password with a fresh random salt.
    pub fn derive(password: &str) -> Self {
        let salt = SaltString::generate(&mut SaltRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("argon2 default parameters are valid");
        Self(hash.to_string())
    }

    /// Check a plaintext password against this verifier.
    pub fn verify(&self, password: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Mint a fresh opaque auth token from the OS RNG.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
