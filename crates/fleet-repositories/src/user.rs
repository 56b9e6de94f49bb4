use chrono::{Duration, Utc};
use fleet_domain::{User, UserId, UserRole, UserStatus};
use fleet_store::{ensure_table, ConnectionManager, Filter, FilterOp, RepositoryCore, RepositoryError};

/// §8.5 defaults: five failed attempts locks the account for 15 minutes.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_SECONDS: i64 = 900;

pub struct UserRepository {
    core: RepositoryCore<User>,
}

impl UserRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "users").await
    }

    pub async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        User::validate_email(&user.email)?;
        self.core.create(user).await
    }

    /// Creates a user after checking username/email uniqueness, the
    /// invariant raw [`Self::create`] leaves to the caller.
    pub async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        if self.get_by_username(&user.username).await?.is_some() {
            return Err(RepositoryError::Constraint(format!("username '{}' already exists", user.username)));
        }
        if self.get_by_email(&user.email).await?.is_some() {
            return Err(RepositoryError::Constraint(format!("email '{}' already exists", user.email)));
        }
        self.create(user).await
    }

    pub async fn get(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn update(&self, user: &mut User) -> Result<(), RepositoryError> {
        User::validate_email(&user.email)?;
        self.core.update(user).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let filter = Filter::new().op("username", FilterOp::Eq(serde_json::json!(username)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let filter = Filter::new().op("email", FilterOp::Eq(serde_json::json!(email)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Option<User>, RepositoryError> {
        let filter = Filter::new().op("api_key", FilterOp::Eq(serde_json::json!(api_key)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>, RepositoryError> {
        self.core.list(&Filter::new().eq("role", role)).await
    }

    pub async fn list_active(&self) -> Result<Vec<User>, RepositoryError> {
        self.core.list(&Filter::new().eq("status", UserStatus::Active)).await
    }

    pub async fn update_password(&self, id: &UserId, new_password: &str) -> Result<User, RepositoryError> {
        let mut user = self.core.get_required(id).await?;
        user.set_password(new_password);
        self.core.update(&mut user).await?;
        Ok(user)
    }

    pub async fn lock_user(&self, id: &UserId, duration: Duration) -> Result<User, RepositoryError> {
        let mut user = self.core.get_required(id).await?;
        user.lock(Utc::now() + duration);
        self.core.update(&mut user).await?;
        Ok(user)
    }

    pub async fn unlock_user(&self, id: &UserId) -> Result<User, RepositoryError> {
        let mut user = self.core.get_required(id).await?;
        user.unlock();
        self.core.update(&mut user).await?;
        Ok(user)
    }

    /// §8.5 account lockout: on success, resets the failed-attempt counter
    /// and records the login; on failure, increments the counter and locks
    /// the account for `lockout_duration` once `max_attempts` is crossed.
    /// Returns `Ok(None)` for wrong credentials or an already-locked
    /// account, `Ok(Some(user))` on success.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        max_attempts: u32,
        lockout_duration: Duration,
    ) -> Result<Option<User>, RepositoryError> {
        let Some(mut user) = self.get_by_username(username).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if user.is_locked(now) {
            return Ok(None);
        }

        if user.check_password(password) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            if user.status == UserStatus::Locked {
                user.status = UserStatus::Active;
            }
            user.last_login = Some(now);
            self.core.update(&mut user).await?;
            Ok(Some(user))
        } else {
            user.failed_login_attempts += 1;
            if user.failed_login_attempts >= max_attempts {
                user.lock(now + lockout_duration);
            }
            self.core.update(&mut user).await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use fleet_domain::UserId;
    use serde_json::Value;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> UserRepository {
        let path = dir.path().join("users.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        UserRepository::ensure_schema(&manager).await.unwrap();
        UserRepository::new(manager)
    }

    fn new_user(username: &str, email: &str, password: &str) -> User {
        let now = Utc::now();
        let mut user = User {
            id: UserId::new(),
            username: username.into(),
            email: email.into(),
            display_name: None,
            first_name: None,
            last_name: None,
            password_hash: String::new(),
            role: UserRole::Operator,
            status: UserStatus::Active,
            last_login: None,
            last_login_ip: None,
            failed_login_attempts: 0,
            locked_until: None,
            mfa_secret: None,
            mfa_enabled: false,
            api_key: None,
            api_key_expires_at: None,
            preferences: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        };
        user.set_password(password);
        user
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_username_and_email() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        repo.create_user(&new_user("alice", "alice@example.com", "hunter2")).await.unwrap();

        let dup_username = new_user("alice", "other@example.com", "hunter2");
        assert!(repo.create_user(&dup_username).await.is_err());

        let dup_email = new_user("bob", "alice@example.com", "hunter2");
        assert!(repo.create_user(&dup_email).await.is_err());
    }

    #[tokio::test]
    async fn account_lockout_s3() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let user = new_user("carol", "carol@example.com", "correct-horse");
        repo.create_user(&user).await.unwrap();

        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            let result = repo
                .authenticate("carol", "wrong-password", DEFAULT_MAX_ATTEMPTS, Duration::seconds(DEFAULT_LOCKOUT_SECONDS))
                .await
                .unwrap();
            assert!(result.is_none());
        }

        let locked = repo.get(&user.id).await.unwrap().unwrap();
        assert_eq!(locked.status, UserStatus::Locked);
        assert!(locked.is_locked(Utc::now()));

        let still_locked = repo
            .authenticate("carol", "correct-horse", DEFAULT_MAX_ATTEMPTS, Duration::seconds(DEFAULT_LOCKOUT_SECONDS))
            .await
            .unwrap();
        assert!(still_locked.is_none());

        repo.unlock_user(&user.id).await.unwrap();
        let unlocked = repo
            .authenticate("carol", "correct-horse", DEFAULT_MAX_ATTEMPTS, Duration::seconds(DEFAULT_LOCKOUT_SECONDS))
            .await
            .unwrap();
        assert!(unlocked.is_some());
        assert_eq!(unlocked.unwrap().failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn update_password_changes_what_authenticate_accepts() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let user = new_user("dave", "dave@example.com", "old-password");
        repo.create_user(&user).await.unwrap();

        repo.update_password(&user.id, "new-password").await.unwrap();

        assert!(repo
            .authenticate("dave", "old-password", DEFAULT_MAX_ATTEMPTS, Duration::seconds(DEFAULT_LOCKOUT_SECONDS))
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .authenticate("dave", "new-password", DEFAULT_MAX_ATTEMPTS, Duration::seconds(DEFAULT_LOCKOUT_SECONDS))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn list_active_excludes_locked_users() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let active = new_user("erin", "erin@example.com", "pw");
        repo.create_user(&active).await.unwrap();
        repo.lock_user(&active.id, Duration::seconds(DEFAULT_LOCKOUT_SECONDS)).await.unwrap();

        let other = new_user("frank", "frank@example.com", "pw");
        repo.create_user(&other).await.unwrap();

        let active_users = repo.list_active().await.unwrap();
        assert_eq!(active_users.len(), 1);
        assert_eq!(active_users[0].id, other.id);
    }
}
