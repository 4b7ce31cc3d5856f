//! In-memory store, used when no database is configured and in tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::{
    PasswordHasher, Result, RoleStore, StoreError, UserStore,
};
use crate::user::{LockoutReason, NewUser, Role, User, UserUpdate};

const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Users and roles kept behind a lock.
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    roles: RwLock<HashMap<String, Role>>,
    hasher: Arc<dyn PasswordHasher>,
}

impl MemoryStore {
    /// Create an empty [`MemoryStore`].
    pub fn new(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            hasher,
        }
    }

    /// Add role definitions.
    pub fn with_roles(self, roles: impl IntoIterator<Item = Role>) -> Self {
        if let Ok(mut map) = self.roles.write() {
            map.extend(roles.into_iter().map(|role| (role.name.clone(), role)));
        }
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, User>>> {
        self.users
            .read()
            .map_err(|_| StoreError::Unavailable("user map is poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, User>>> {
        self.users
            .write()
            .map_err(|_| StoreError::Unavailable("user map is poisoned".into()))
    }

    fn find(&self, predicate: impl Fn(&User) -> bool) -> Result<Option<User>> {
        Ok(self.read()?.values().find(|user| predicate(user)).cloned())
    }

    fn hash(&self, password: &str) -> Result<String> {
        self.hasher
            .hash(password)
            .map_err(|err| StoreError::Internal(Box::new(err)))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find(|user| user.email == email)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>> {
        self.find(|user| user.reset_password_token.as_deref() == Some(token))
    }

    async fn find_by_activation_token(
        &self,
        token: &str,
    ) -> Result<Option<User>> {
        self.find(|user| {
            user.email_confirmation_token.as_deref() == Some(token)
        })
    }

    async fn insert(&self, new_user: NewUser) -> Result<User> {
        let NewUser { mut user, password } = new_user;
        user.password = self.hash(&password)?;

        let mut users = self.write()?;
        if users.values().any(|stored| stored.email == user.email) {
            return Err(StoreError::Conflict(EMAIL_CONSTRAINT.into()));
        }
        users.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn update(&self, id: &str, mut update: UserUpdate) -> Result<User> {
        if let Some(password) = update.password.take() {
            update.password = Some(self.hash(&password)?);
        }

        let mut users = self.write()?;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.apply(update);

        Ok(user.clone())
    }

    async fn record_access_failure(
        &self,
        id: &str,
        lockout_until: DateTime<Utc>,
    ) -> Result<User> {
        let mut users = self.write()?;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;

        let count = user.access_failed_count.saturating_add(1);
        user.access_failed_count = count.min(user.access_failed_limit);
        if count >= user.access_failed_limit {
            user.lockout_until = lockout_until;
            user.lockout_reason = Some(LockoutReason::AccessFailed);
        }

        Ok(user.clone())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Role>> {
        let roles = self.roles.read().map_err(|_| {
            StoreError::Unavailable("role map is poisoned".into())
        })?;

        Ok(names.iter().filter_map(|name| roles.get(name).cloned()).collect())
    }
}
