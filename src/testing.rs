//! Fixtures shared by unit tests. MUST NEVER be used in production.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::account::{AccountSecurity, Settings};
use crate::config::Argon2;
use crate::crypto::{OsTokenIssuer, PasswordManager};
use crate::mail::MailError;
use crate::ports::{Notification, NotificationDispatcher, UserStore};
use crate::token::TokenManager;
use crate::user::{
    MemoryStore, Phone, PhoneKind, Present, Profile, Sex, State, User,
    UserBuilder, default_roles,
};

pub const ISSUER: &str = "https://api.treino.app";
pub const SECRET: &str = "treino-test-secret-do-not-use";

/// Argon2id with the smallest parameters allowed.
pub fn fast_hasher() -> Arc<PasswordManager> {
    let config = Argon2 {
        memory_cost: 256,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    };
    Arc::new(PasswordManager::new(Some(config)).expect("valid argon2 params"))
}

/// Registration data of every fixture user.
pub fn profile() -> Profile {
    Profile {
        birth_date: NaiveDate::from_ymd_opt(1995, 7, 14).expect("valid date"),
        sex: Sex::Female,
        phones: vec![Phone {
            kind: PhoneKind::Mobile,
            number: "+55 48 99876-5432".into(),
            confirmed: false,
        }],
        city: "Florianópolis".into(),
        state: State::Sc,
    }
}

/// HS256 sessions signed with [`SECRET`].
pub fn session_tokens() -> TokenManager {
    TokenManager::with_secret(ISSUER, SECRET)
}

/// Dispatcher keeping every notification in memory.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    /// Make every following send fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("poisoned").clone()
    }

    /// Wait for detached sends to land.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            if self.sent().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        notification: &Notification,
        _sandbox: bool,
    ) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Timeout);
        }
        self.sent.lock().expect("poisoned").push(notification.clone());
        Ok(())
    }
}

/// A wired [`AccountSecurity`] with handles on its collaborators.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingDispatcher>,
    pub sessions: Arc<TokenManager>,
    pub hasher: Arc<PasswordManager>,
    pub account: Arc<AccountSecurity>,
}

impl Fixture {
    pub fn new() -> Self {
        let hasher = fast_hasher();
        let store =
            Arc::new(MemoryStore::new(hasher.clone()).with_roles(default_roles()));
        let mailer = Arc::new(RecordingDispatcher::default());
        let sessions = Arc::new(session_tokens());

        let account = Arc::new(AccountSecurity::new(
            store.clone(),
            store.clone(),
            hasher.clone(),
            Arc::new(OsTokenIssuer),
            mailer.clone(),
            sessions.clone(),
            Settings::default(),
        ));

        Self {
            store,
            mailer,
            sessions,
            hasher,
            account,
        }
    }

    /// Register a user the way the API does.
    pub async fn user(&self, email: &str, password: &str) -> User {
        self.account
            .register("Test User", email, password, profile(), Utc::now())
            .await
            .expect("cannot register user")
    }

    /// Insert a user built with extra roles or claims.
    pub async fn user_with(
        &self,
        email: &str,
        password: &str,
        customize: impl FnOnce(
            UserBuilder<Present<String>, Present<String>>,
        ) -> UserBuilder<Present<String>, Present<String>>,
    ) -> User {
        let builder = UserBuilder::new()
            .name("Test User")
            .email(email)
            .password(password);
        self.store
            .insert(customize(builder).build(Utc::now()))
            .await
            .expect("cannot insert user")
    }

    /// Current stored state of a user.
    pub async fn stored(&self, id: &str) -> User {
        self.store
            .find_by_id(id)
            .await
            .expect("store failed")
            .expect("user vanished")
    }
}
