//! Interfaces for cryptographic operations.

use crate::crypto::CryptoError;

/// Port for password hashing operations.
pub trait PasswordHasher: Send + Sync {
    /// Hash a password using a secure algorithm.
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    /// Verify a password against a stored hash.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Port for single-use token generation.
pub trait TokenIssuer: Send + Sync {
    /// Generate an unguessable token string.
    fn generate(&self) -> String;
}
