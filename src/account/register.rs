use chrono::{DateTime, Utc};

use super::{AccountSecurity, Result};
use crate::user::{Profile, User, UserBuilder};

impl AccountSecurity {
    /// Create an account with the default role. It starts unlocked and
    /// unconfirmed.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        profile: Profile,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let new_user = UserBuilder::new()
            .name(name)
            .email(email)
            .password(password)
            .access_failed_limit(self.settings.access_failed_limit)
            .role(&self.settings.default_role)
            .profile(profile)
            .build(now);

        let user = self.users.insert(new_user).await?;
        tracing::info!(user_id = %user.id, "user registered");

        Ok(user)
    }
}
