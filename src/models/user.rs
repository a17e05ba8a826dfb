//! User model
//!
//! Accounts for forum members, moderators and administrators, including the
//! self-deactivation and ban state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::validation::{check_length, require_text, ValidationError};

pub const NAME_MAX: usize = 150;
pub const EMAIL_MAX: usize = 320;
pub const DESCRIPTION_MAX: usize = 256;
pub const BAN_REASON_MAX: usize = 150;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub is_active: bool,
    pub is_banned: bool,
    pub reason_banned: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved member account. The password must already be hashed.
    pub fn new(
        username: String,
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            first_name,
            last_name,
            email,
            password_hash,
            description: None,
            role: UserRole::Member,
            is_active: true,
            is_banned: false,
            reason_banned: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Staff and admins may moderate other users' content.
    pub fn is_moderator(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Staff)
    }

    /// Check the profile fields a user can edit themselves.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("Username", &self.username, NAME_MAX)?;
        require_text("First name", &self.first_name, NAME_MAX)?;
        require_text("Last name", &self.last_name, NAME_MAX)?;
        validate_email(&self.email)?;
        if let Some(description) = &self.description {
            check_length("Description", description, DESCRIPTION_MAX)?;
        }
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    require_text("Email", email, EMAIL_MAX)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Account role.
///
/// Admins hold every permission, staff moderate content, members own only
/// what they created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Staff,
    #[default]
    Member,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Staff => write!(f, "staff"),
            UserRole::Member => write!(f, "member"),
        }
    }
}

impl FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            "member" => Ok(UserRole::Member),
            _ => Err(ValidationError::InvalidChoice {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User::new(
            "jdoe".into(),
            "Jane".into(),
            "Doe".into(),
            "jane@example.com".into(),
            "hash".into(),
        )
    }

    #[test]
    fn test_new_user_defaults() {
        let user = sample();
        assert_eq!(user.role, UserRole::Member);
        assert!(user.is_active);
        assert!(!user.is_banned);
        assert!(!user.is_moderator());
    }

    #[test]
    fn test_role_roundtrip_and_rejects_unknown() {
        for role in [UserRole::Admin, UserRole::Staff, UserRole::Member] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("editor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_moderator_roles() {
        let mut user = sample();
        user.role = UserRole::Staff;
        assert!(user.is_moderator());
        assert!(!user.is_admin());
        user.role = UserRole::Admin;
        assert!(user.is_moderator());
        assert!(user.is_admin());
    }

    #[test]
    fn test_validate_rejects_blank_names() {
        let mut user = sample();
        user.first_name = "   ".into();
        assert_eq!(user.validate(), Err(ValidationError::Required("First name")));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b").is_ok());
        assert_eq!(validate_email("nobody"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("@host"), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "member");
    }
}
