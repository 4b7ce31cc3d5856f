//! Claim-based authorization gate.

use std::collections::BTreeSet;

use super::{AccountError, AccountSecurity, Result};
use crate::user::{Role, User};

/// Operators able to lock and unlock accounts.
pub const MANAGE_PERMISSIONS: &str = "ManagePermissions";

/// Claims granted directly plus the ones inherited from the user's roles.
///
/// Roles the user does not hold are ignored.
pub fn effective_claims(user: &User, roles: &[Role]) -> BTreeSet<String> {
    let inherited = roles
        .iter()
        .filter(|role| user.roles.contains(&role.name))
        .flat_map(|role| role.claims.iter().cloned());

    user.claims.iter().cloned().chain(inherited).collect()
}

impl AccountSecurity {
    /// Resolve the bearer of a session token and check it holds
    /// `required_claim`.
    pub async fn authorize(
        &self,
        bearer: Option<&str>,
        required_claim: Option<&str>,
    ) -> Result<User> {
        let Some(token) = bearer.filter(|token| !token.is_empty()) else {
            return Err(AccountError::MissingAuthToken);
        };

        let claims = self.sessions.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "session token rejected");
            AccountError::TokenForged
        })?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if let Some(claim) = required_claim {
            let roles = self.roles.find_by_names(&user.roles).await?;
            if !effective_claims(&user, &roles).contains(claim) {
                tracing::warn!(user_id = %user.id, %claim, "missing claim for route");
                return Err(AccountError::UnauthorizedRoute {
                    claim: claim.to_owned(),
                });
            }
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::account::Settings;
    use crate::crypto::OsTokenIssuer;
    use crate::ports::{
        Result as StoreResult, SessionTokens, UserStore,
    };
    use crate::testing::{Fixture, RecordingDispatcher, fast_hasher, session_tokens};
    use crate::user::{MemoryStore, NewUser, UserBuilder, UserUpdate, default_roles};

    /// Fails the test on any store access.
    struct UntouchableStore;

    #[async_trait]
    impl UserStore for UntouchableStore {
        async fn find_by_email(&self, _: &str) -> StoreResult<Option<User>> {
            panic!("store must not be read")
        }
        async fn find_by_id(&self, _: &str) -> StoreResult<Option<User>> {
            panic!("store must not be read")
        }
        async fn find_by_reset_token(&self, _: &str) -> StoreResult<Option<User>> {
            panic!("store must not be read")
        }
        async fn find_by_activation_token(&self, _: &str) -> StoreResult<Option<User>> {
            panic!("store must not be read")
        }
        async fn insert(&self, _: NewUser) -> StoreResult<User> {
            panic!("store must not be written")
        }
        async fn update(&self, _: &str, _: UserUpdate) -> StoreResult<User> {
            panic!("store must not be written")
        }
        async fn record_access_failure(
            &self,
            _: &str,
            _: DateTime<Utc>,
        ) -> StoreResult<User> {
            panic!("store must not be written")
        }
    }

    #[test]
    fn test_effective_claims() {
        let user = UserBuilder::new()
            .email("edu@treino.app")
            .password("Sup3rS3cret")
            .role("Teacher")
            .claim("ManagePayments")
            .build(Utc::now())
            .user;

        let claims = effective_claims(&user, &default_roles());

        assert!(claims.contains("ManagePayments"));
        assert!(claims.contains("ManageStudents"));
        assert!(!claims.contains(MANAGE_PERMISSIONS));
        assert_eq!(claims.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_token_skips_store() {
        let account = AccountSecurity::new(
            Arc::new(UntouchableStore),
            Arc::new(MemoryStore::new(fast_hasher())),
            fast_hasher(),
            Arc::new(OsTokenIssuer),
            Arc::new(RecordingDispatcher::default()),
            Arc::new(session_tokens()),
            Settings::default(),
        );

        assert!(matches!(
            account.authorize(None, Some(MANAGE_PERMISSIONS)).await,
            Err(AccountError::MissingAuthToken)
        ));
        assert!(matches!(
            account.authorize(Some(""), None).await,
            Err(AccountError::MissingAuthToken)
        ));
        assert!(matches!(
            account.authorize(Some("forged.jwt.value"), None).await,
            Err(AccountError::TokenForged)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let fixture = Fixture::new();
        let token = fixture.sessions.issue("ghost").unwrap();

        assert!(matches!(
            fixture.account.authorize(Some(token.as_str()), None).await,
            Err(AccountError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_role_and_direct_claims_authorize() {
        let fixture = Fixture::new();
        let student = fixture.user("edu@treino.app", "Sup3rS3cret").await;
        let admin = fixture
            .user_with("adm@treino.app", "Sup3rS3cret", |b| b.role("Administrator"))
            .await;
        let delegate = fixture
            .user_with("del@treino.app", "Sup3rS3cret", |b| b.claim(MANAGE_PERMISSIONS))
            .await;

        for user in [&admin, &delegate] {
            let token = fixture.sessions.issue(&user.id).unwrap();
            let resolved = fixture
                .account
                .authorize(Some(token.as_str()), Some(MANAGE_PERMISSIONS))
                .await
                .unwrap();
            assert_eq!(resolved.id, user.id);
        }

        let token = fixture.sessions.issue(&student.id).unwrap();
        assert!(matches!(
            fixture
                .account
                .authorize(Some(token.as_str()), Some(MANAGE_PERMISSIONS))
                .await,
            Err(AccountError::UnauthorizedRoute { claim }) if claim == MANAGE_PERMISSIONS
        ));
        assert!(fixture.account.authorize(Some(token.as_str()), None).await.is_ok());
    }
}
