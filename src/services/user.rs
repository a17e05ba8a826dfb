//! User service
//!
//! Registration, login sessions, self-service account changes and banning.

use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::{AuthSessionRepository, UserRepository};
use crate::models::{
    check_length, validate_email, validate_flair, require_text, AuthSession, User,
    ValidationError, BAN_REASON_MAX, DESCRIPTION_MAX, NAME_MAX,
};
use crate::services::password::{hash_password, validate_password_strength, verify_password};
use crate::services::policy::{authorize, Action, Decision, Resource};

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("{0}")]
    ValidationError(#[from] ValidationError),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Kind of account chosen at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Standard,
    Professional,
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub account_type: AccountType,
    pub flair: Option<String>,
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateDetailsInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn AuthSessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn AuthSessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Override the login session lifetime
    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    /// Register a new account.
    ///
    /// Professional accounts also get a profile carrying the given flair.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for bad fields, a weak password or mismatched passwords
    /// - `UserExists` if username or email is already taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        require_text("Username", &input.username, NAME_MAX)?;
        require_text("First name", &input.first_name, NAME_MAX)?;
        require_text("Last name", &input.last_name, NAME_MAX)?;
        validate_email(&input.email)?;
        validate_password_strength(&input.password)?;
        if input.password != input.password2 {
            return Err(ValidationError::Password(
                "The two password fields didn't match.".to_string(),
            )
            .into());
        }

        let flair = match input.account_type {
            AccountType::Professional => {
                let flair = input.flair.clone().unwrap_or_default();
                validate_flair(&flair)?;
                Some(flair)
            }
            AccountType::Standard => None,
        };

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            input.username,
            input.first_name,
            input.last_name,
            input.email,
            password_hash,
        );

        let created = match flair {
            Some(flair) => self.user_repo.create_with_profile(&user, &flair).await,
            None => self.user_repo.create(&user).await,
        }
        .context("Failed to register user")?;

        tracing::info!("Registered user '{}' (id {})", created.username, created.id);
        Ok(created)
    }

    /// Check credentials and open a login session.
    ///
    /// Banned users may still log in; deactivated accounts may not.
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, UserServiceError> {
        let user = match self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
        {
            Some(user) => user,
            None => {
                tracing::warn!("Failed login attempt: {}", input.username_or_email);
                return Err(invalid_credentials());
            }
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid || !user.is_active {
            tracing::warn!("Failed login attempt: {}", input.username_or_email);
            return Err(invalid_credentials());
        }

        let session = self.create_session(user.id).await?;
        tracing::info!("Successful login attempt: {}", user.username);
        Ok(session)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown or expired tokens and for deactivated accounts.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Change name and email. The email must not belong to another account.
    pub async fn update_details(
        &self,
        user: &User,
        input: UpdateDetailsInput,
    ) -> Result<User, UserServiceError> {
        if let Some(existing) = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
        {
            if existing.id != user.id {
                return Err(UserServiceError::UserExists(
                    "This email is already in use.".to_string(),
                ));
            }
        }

        let mut updated = user.clone();
        updated.first_name = input.first_name;
        updated.last_name = input.last_name;
        updated.email = input.email;
        updated.validate()?;

        Ok(self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user details")?)
    }

    pub async fn change_password(
        &self,
        user: &User,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        let old_valid = verify_password(&input.old_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !old_valid {
            return Err(ValidationError::Password("The old password is incorrect.".to_string()).into());
        }
        if input.new_password1 == input.old_password {
            return Err(ValidationError::Password(
                "The new password cannot be the same as the old password.".to_string(),
            )
            .into());
        }
        if input.new_password1 != input.new_password2 {
            return Err(
                ValidationError::Password("The new passwords do not match.".to_string()).into(),
            );
        }
        validate_password_strength(&input.new_password1)?;

        let mut updated = user.clone();
        updated.password_hash =
            hash_password(&input.new_password1).context("Failed to hash password")?;
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    /// Deactivate the account and end all of its sessions.
    pub async fn deactivate_account(&self, user: &User, confirm: bool) -> Result<(), UserServiceError> {
        if !confirm {
            return Err(ValidationError::Required("Deactivate profile").into());
        }

        let mut updated = user.clone();
        updated.is_active = false;
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to deactivate account")?;
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to drop sessions")?;

        tracing::info!("User '{}' deactivated their account", user.username);
        Ok(())
    }

    /// Set or clear the profile description
    pub async fn update_description(
        &self,
        user: &User,
        description: Option<String>,
    ) -> Result<User, UserServiceError> {
        let description = description.filter(|d| !d.trim().is_empty());
        if let Some(description) = &description {
            check_length("Description", description, DESCRIPTION_MAX)?;
        }

        let mut updated = user.clone();
        updated.description = description;
        Ok(self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update description")?)
    }

    /// Ban `username` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the target does not exist
    /// - `Forbidden` when the actor is not an admin or the target is an admin
    /// - `ValidationError` when the reason or confirmation is missing, or the
    ///   target is already banned
    pub async fn ban(
        &self,
        actor: &User,
        username: &str,
        reason: &str,
        confirm: bool,
    ) -> Result<User, UserServiceError> {
        let target = self
            .get_by_username(username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(username.to_string()))?;

        if let Decision::Deny(reason) = authorize(actor, Resource::Account(&target), Action::Ban) {
            return Err(UserServiceError::Forbidden(reason.to_string()));
        }

        require_text("Reason", reason, BAN_REASON_MAX)?;
        if !confirm {
            return Err(ValidationError::Required("Confirm ban").into());
        }
        if target.is_banned {
            return Err(ValidationError::InvalidChoice {
                field: "ban",
                value: format!("{} is already banned", target.username),
            }
            .into());
        }

        let mut banned = target;
        banned.is_banned = true;
        banned.reason_banned = Some(reason.to_string());
        let banned = self
            .user_repo
            .update(&banned)
            .await
            .context("Failed to ban user")?;

        tracing::info!(
            "User '{}' banned by '{}': {}",
            banned.username,
            actor.username,
            reason
        );
        Ok(banned)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }

    async fn create_session(&self, user_id: i64) -> Result<AuthSession, UserServiceError> {
        let now = Utc::now();
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{
        ProfessionalRepository, SqlxAuthSessionRepository, SqlxProfessionalRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::UserRole;

    pub(crate) const PASSWORD: &str = "Passw0rd!";

    async fn setup() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxAuthSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    pub(crate) fn register_input(username: &str) -> RegisterInput {
        RegisterInput {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            username: username.into(),
            email: format!("{}@example.com", username),
            password: PASSWORD.into(),
            password2: PASSWORD.into(),
            account_type: AccountType::Standard,
            flair: None,
        }
    }

    async fn make_admin(pool: &DynDatabasePool, service: &UserService, username: &str) -> User {
        let user = service.register(register_input(username)).await.unwrap();
        let mut admin = user.clone();
        admin.role = UserRole::Admin;
        SqlxUserRepository::new(pool.clone()).update(&admin).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_standard_user() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("jane")).await.unwrap();

        assert!(user.id > 0);
        assert_eq!(user.role, UserRole::Member);
        assert_ne!(user.password_hash, PASSWORD);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_professional_creates_profile() {
        let (pool, service) = setup().await;
        let mut input = register_input("counsel");
        input.account_type = AccountType::Professional;
        input.flair = Some("Solicitor".into());

        let user = service.register(input).await.unwrap();
        let profile = SqlxProfessionalRepository::new(pool)
            .get_by_user(user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.flair, "Solicitor");
    }

    #[tokio::test]
    async fn test_register_professional_requires_flair() {
        let (_pool, service) = setup().await;
        let mut input = register_input("counsel");
        input.account_type = AccountType::Professional;

        let result = service.register(input).await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        assert!(service.get_by_username("counsel").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_weak_or_mismatched_password() {
        let (_pool, service) = setup().await;

        let mut weak = register_input("weak");
        weak.password = "password123".into();
        weak.password2 = "password123".into();
        assert!(matches!(
            service.register(weak).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let mut mismatch = register_input("mismatch");
        mismatch.password2 = "Different1!".into();
        assert!(matches!(
            service.register(mismatch).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicates_rejected() {
        let (_pool, service) = setup().await;
        service.register(register_input("dup")).await.unwrap();

        assert!(matches!(
            service.register(register_input("dup")).await,
            Err(UserServiceError::UserExists(_))
        ));

        let mut same_email = register_input("other");
        same_email.email = "dup@example.com".into();
        assert!(matches!(
            service.register(same_email).await,
            Err(UserServiceError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login_with_username_or_email() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("login")).await.unwrap();

        let by_name = service.login(LoginInput::new("login", PASSWORD)).await.unwrap();
        let by_email = service
            .login(LoginInput::new("login@example.com", PASSWORD))
            .await
            .unwrap();

        assert_eq!(by_name.user_id, user.id);
        assert_eq!(by_email.user_id, user.id);
        assert_ne!(by_name.id, by_email.id);
    }

    #[tokio::test]
    async fn test_login_wrong_password_fails() {
        let (_pool, service) = setup().await;
        service.register(register_input("wrong")).await.unwrap();

        assert!(matches!(
            service.login(LoginInput::new("wrong", "Nope!nope")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("ghost", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_logout() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("sess")).await.unwrap();
        let session = service.login(LoginInput::new("sess", PASSWORD)).await.unwrap();

        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let (pool, service) = setup().await;
        let user = service.register(register_input("expired")).await.unwrap();
        let sessions = SqlxAuthSessionRepository::new(pool);
        let past = Utc::now() - Duration::days(1);
        sessions
            .create(&AuthSession {
                id: "stale".into(),
                user_id: user.id,
                expires_at: past,
                created_at: past - Duration::days(1),
            })
            .await
            .unwrap();

        assert!(service.validate_session("stale").await.unwrap().is_none());
        assert!(sessions.get_by_id("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_banned_user_can_still_log_in() {
        let (pool, service) = setup().await;
        let admin = make_admin(&pool, &service, "boss").await;
        service.register(register_input("troll")).await.unwrap();
        service.ban(&admin, "troll", "Spam", true).await.unwrap();

        let session = service.login(LoginInput::new("troll", PASSWORD)).await.unwrap();
        let user = service.validate_session(&session.id).await.unwrap().unwrap();
        assert!(user.is_banned);
    }

    #[tokio::test]
    async fn test_deactivate_blocks_login_and_drops_sessions() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("leaver")).await.unwrap();
        let session = service.login(LoginInput::new("leaver", PASSWORD)).await.unwrap();

        assert!(service.deactivate_account(&user, false).await.is_err());
        service.deactivate_account(&user, true).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(
            service.login(LoginInput::new("leaver", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_details_email_uniqueness() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("first")).await.unwrap();
        service.register(register_input("second")).await.unwrap();

        let taken = UpdateDetailsInput {
            first_name: "New".into(),
            last_name: "Name".into(),
            email: "second@example.com".into(),
        };
        assert!(matches!(
            service.update_details(&user, taken).await,
            Err(UserServiceError::UserExists(_))
        ));

        // keeping one's own email is fine
        let own = UpdateDetailsInput {
            first_name: "New".into(),
            last_name: "Name".into(),
            email: "first@example.com".into(),
        };
        let updated = service.update_details(&user, own).await.unwrap();
        assert_eq!(updated.first_name, "New");
    }

    #[tokio::test]
    async fn test_change_password_rules() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("pw")).await.unwrap();

        let wrong_old = ChangePasswordInput {
            old_password: "Bad#pass1".into(),
            new_password1: "Another#1".into(),
            new_password2: "Another#1".into(),
        };
        assert!(service.change_password(&user, wrong_old).await.is_err());

        let same = ChangePasswordInput {
            old_password: PASSWORD.into(),
            new_password1: PASSWORD.into(),
            new_password2: PASSWORD.into(),
        };
        assert!(service.change_password(&user, same).await.is_err());

        let ok = ChangePasswordInput {
            old_password: PASSWORD.into(),
            new_password1: "Another#1".into(),
            new_password2: "Another#1".into(),
        };
        service.change_password(&user, ok).await.unwrap();
        assert!(service.login(LoginInput::new("pw", "Another#1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_description_bounds() {
        let (_pool, service) = setup().await;
        let user = service.register(register_input("desc")).await.unwrap();

        let updated = service
            .update_description(&user, Some("Tenant rights enthusiast".into()))
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Tenant rights enthusiast"));

        assert!(service
            .update_description(&user, Some("x".repeat(DESCRIPTION_MAX + 1)))
            .await
            .is_err());

        let cleared = service.update_description(&user, Some("  ".into())).await.unwrap();
        assert!(cleared.description.is_none());
    }

    #[tokio::test]
    async fn test_ban_rules() {
        let (pool, service) = setup().await;
        let admin = make_admin(&pool, &service, "admin").await;
        let other_admin = make_admin(&pool, &service, "admin2").await;
        let member = service.register(register_input("member")).await.unwrap();

        // non-admin actor
        assert!(matches!(
            service.ban(&member, "admin", "x", true).await,
            Err(UserServiceError::Forbidden(_))
        ));
        // unknown target
        assert!(matches!(
            service.ban(&admin, "nobody", "x", true).await,
            Err(UserServiceError::NotFound(_))
        ));
        // admin target
        assert!(matches!(
            service.ban(&admin, &other_admin.username, "x", true).await,
            Err(UserServiceError::Forbidden(_))
        ));
        // missing reason / confirmation
        assert!(matches!(
            service.ban(&admin, "member", "", true).await,
            Err(UserServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.ban(&admin, "member", "Abuse", false).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let banned = service.ban(&admin, "member", "Abuse", true).await.unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.reason_banned.as_deref(), Some("Abuse"));

        // already banned
        assert!(matches!(
            service.ban(&admin, "member", "Again", true).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (pool, service) = setup().await;
        let user = service.register(register_input("cleanup")).await.unwrap();
        let past = Utc::now() - Duration::hours(2);
        SqlxAuthSessionRepository::new(pool)
            .create(&AuthSession {
                id: "gone".into(),
                user_id: user.id,
                expires_at: past,
                created_at: past,
            })
            .await
            .unwrap();
        service.login(LoginInput::new("cleanup", PASSWORD)).await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 1);
    }
}
