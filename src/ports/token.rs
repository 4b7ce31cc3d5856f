//! Session token port.

use crate::token::{Claims, TokenError};

/// Port for issuing and checking signed session tokens.
pub trait SessionTokens: Send + Sync {
    /// Issue a session token whose subject is `user_id`.
    fn issue(&self, user_id: &str) -> Result<String, TokenError>;

    /// Check signature, issuer and expiry, then return the claims.
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;
}
