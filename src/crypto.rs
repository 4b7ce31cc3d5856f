//! Cryptogragic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;
use crate::ports::{PasswordHasher, TokenIssuer};

/// Random bytes behind every reset and activation token.
pub const TOKEN_LENGTH: usize = 32;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password manager.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }
}

impl PasswordHasher for PasswordManager {
    /// Hash password using Argon2id.
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// Parameters are read from the PHC string, so hashes made with other
    /// settings still verify.
    fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                self.argon2()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

/// Reset and activation tokens drawn from the OS random generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenIssuer;

impl TokenIssuer for OsTokenIssuer {
    fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 256,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_argon2() {
        let manager = light();
        let hash = manager.hash("Sup3rS3cret").unwrap();

        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(manager.verify("Sup3rS3cret", &hash));
        assert!(!manager.verify("sup3rs3cret", &hash));
        assert_ne!(hash, manager.hash("Sup3rS3cret").unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(!light().verify("Sup3rS3cret", "not a phc string"));
    }

    #[test]
    fn test_invalid_params() {
        let config = ArgonConfig {
            memory_cost: 1,
            ..Default::default()
        };
        assert!(PasswordManager::new(Some(config)).is_err());
    }

    #[test]
    fn test_tokens() {
        let issuer = OsTokenIssuer;
        let token = issuer.generate();

        assert_eq!(token.len(), TOKEN_LENGTH * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, issuer.generate());
    }
}
