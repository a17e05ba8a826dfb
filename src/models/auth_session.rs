//! Login session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login session backing the `session` cookie
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthSession {
    /// Opaque token (uuid v4)
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
