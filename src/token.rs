//! Manage json web tokens.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::ports::SessionTokens;

const DEFAULT_AUDIENCE: &str = "treino.app";
/// Sessions last 30 days unless configured otherwise.
pub const DEFAULT_LIFESPAN_DAYS: u64 = 30;
const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("missing public key to verify tokens")]
    MissingKey,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    public_key: Option<DecodingKey>,
    private_key: EncodingKey,
    name: String,
    audience: String,
    lifespan: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with an EC P-384 key pair.
    pub fn new(
        name: &str,
        public_key_pem: &str,
        private_key_pem: &str,
    ) -> Result<Self, TokenError> {
        let public_key = if public_key_pem.is_empty() {
            None
        } else {
            Some(DecodingKey::from_ec_pem(public_key_pem.as_bytes())?)
        };
        let private_key = EncodingKey::from_ec_pem(private_key_pem.as_bytes())?;

        Ok(Self {
            algorithm: Algorithm::ES384,
            public_key,
            private_key,
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            lifespan: DEFAULT_LIFESPAN_DAYS * SECONDS_PER_DAY,
        })
    }

    /// Create a new [`TokenManager`] signing with a shared HS256 secret.
    pub fn with_secret(name: &str, secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            public_key: Some(DecodingKey::from_secret(secret.as_bytes())),
            private_key: EncodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            lifespan: DEFAULT_LIFESPAN_DAYS * SECONDS_PER_DAY,
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(mut self, audience: &str) -> Self {
        self.audience = audience.to_owned();
        self
    }

    /// Set how many days a session lasts.
    pub fn lifespan_days(mut self, days: u64) -> Self {
        self.lifespan = days.saturating_mul(SECONDS_PER_DAY);
        self
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(&self, user_id: &str) -> Result<String, TokenError> {
        let time = get_current_timestamp();
        let header = Header::new(self.algorithm);
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time.saturating_add(self.lifespan),
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_owned(),
        };

        Ok(encode(&header, &claims, &self.private_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let Some(public_key) = &self.public_key else {
            return Err(TokenError::MissingKey);
        };

        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        Ok(decode::<Claims>(token, public_key, &validation)?.claims)
    }
}

impl SessionTokens for TokenManager {
    fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        self.create(user_id)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "https://api.treino.app/";

    #[test]
    fn test_issue_and_verify() {
        let manager = TokenManager::with_secret(NAME, "a-very-long-test-secret");
        let token = manager.issue("5d0c8b1e").unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.sub, "5d0c8b1e");
        assert_eq!(claims.iss, NAME);
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
        assert_eq!(
            claims.exp - claims.iat,
            DEFAULT_LIFESPAN_DAYS * SECONDS_PER_DAY
        );
    }

    #[test]
    fn test_huge_lifespan_saturates() {
        let manager = TokenManager::with_secret(NAME, "a-very-long-test-secret")
            .lifespan_days(u64::MAX);
        let token = manager.issue("5d0c8b1e").unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.exp, u64::MAX);
    }

    #[test]
    fn test_forged_tokens() {
        let manager = TokenManager::with_secret(NAME, "a-very-long-test-secret");
        let other = TokenManager::with_secret(NAME, "someone-else-secret");

        assert!(manager.verify(&other.issue("5d0c8b1e").unwrap()).is_err());
        assert!(manager.verify("not.a.jwt").is_err());

        let foreign = TokenManager::with_secret("https://evil.example/", "a-very-long-test-secret");
        assert!(manager.verify(&foreign.issue("5d0c8b1e").unwrap()).is_err());
    }

    #[test]
    fn test_expired_token() {
        let secret = "a-very-long-test-secret";
        let manager = TokenManager::with_secret(NAME, secret);
        let now = get_current_timestamp();
        let claims = Claims {
            aud: DEFAULT_AUDIENCE.into(),
            exp: now - 3600,
            iat: now - 7200,
            iss: NAME.into(),
            sub: "5d0c8b1e".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn test_missing_public_key() {
        let manager = TokenManager {
            public_key: None,
            ..TokenManager::with_secret(NAME, "a-very-long-test-secret")
        };
        assert!(matches!(
            manager.verify("a.b.c"),
            Err(TokenError::MissingKey)
        ));
    }
}
